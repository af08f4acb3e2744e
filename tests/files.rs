#[path = "common/mod.rs"]
mod common;

use common::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use pshharvest::{
    append_record, clear_dir, clear_file, count_lines, create_subdir, cut_datasets, files_in_dir, merge_files, read_records,
    remove_file, sort_file, sort_file_by_key, write_records, AuthorRecord, KeyExtractor, SortKey,
};
use std::cmp::Ordering;
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::Write;

#[test]
fn records_survive_a_write_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("authors.jsonl");
    let authors = vec![author(3, "carol", 1_400_000_000, 10, -2), author(1, "Alice", 1_300_000_000, 0, 5)];
    write_records(&path, &authors).unwrap();

    let back: Vec<AuthorRecord> = read_records(&path).unwrap();
    assert_eq!(back, authors);
}

#[test]
fn append_record_extends_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    append_record(&path, &json!({"n": 1})).unwrap();
    append_record(&path, &json!({"n": 2})).unwrap();
    assert_eq!(read_jsonl_values(&path), vec![json!({"n": 1}), json!({"n": 2})]);
}

/// Malformed lines are skipped, the rest are still returned.
#[test]
fn read_records_skips_bad_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.jsonl");
    write_text(&path, &[r#"{"id":"a"}"#, "{not json", "", r#"{"id":"b"}"#]);

    let got: Vec<Value> = read_records(&path).unwrap();
    assert_eq!(got, vec![json!({"id":"a"}), json!({"id":"b"})]);
}

/// Merging appends every line of the source after the destination's lines, in order.
#[test]
fn merge_preserves_both_inputs_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dest.jsonl");
    let src = dir.path().join("src.jsonl");
    write_text(&dest, &["a", "b"]);
    write_text(&src, &["c", "d", "e"]);

    assert!(merge_files(&dest, &src));
    assert_eq!(read_lines(&dest), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(read_lines(&src), vec!["c", "d", "e"]);
}

/// A destination whose last line has no newline still gets the source on lines of its own.
#[test]
fn merge_terminates_an_unterminated_destination() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dest.jsonl");
    let src = dir.path().join("src.jsonl");
    fs::write(&dest, "{\"a\":1}\n{\"b\":2}").unwrap();
    fs::write(&src, "{\"c\":3}\n").unwrap();

    assert!(merge_files(&dest, &src));
    assert_eq!(fs::read_to_string(&dest).unwrap(), "{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
    assert_eq!(count_lines(&dest).unwrap(), 3);

    // Merging into an empty or missing destination adds no blank line.
    let fresh = dir.path().join("fresh.jsonl");
    assert!(merge_files(&fresh, &src));
    assert_eq!(fs::read_to_string(&fresh).unwrap(), "{\"c\":3}\n");
}

#[test]
fn merge_with_missing_source_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dest.jsonl");
    write_text(&dest, &["a"]);

    assert!(!merge_files(&dest, &dir.path().join("absent.jsonl")));
    assert_eq!(read_lines(&dest), vec!["a"]);
}

#[test]
fn count_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.jsonl");
    write_text(&path, &["1", "2", "3"]);
    assert_eq!(count_lines(&path).unwrap(), 3);

    clear_file(&path).unwrap();
    assert_eq!(count_lines(&path).unwrap(), 0);
}

/// Compressed backups are read transparently.
#[test]
fn count_lines_of_gzip_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.jsonl.gz");
    let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    for i in 0..4 {
        writeln!(enc, "{}", json!({"id": i})).unwrap();
    }
    enc.finish().unwrap();

    assert_eq!(count_lines(&path).unwrap(), 4);
}

#[test]
fn sort_lines_lexicographically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("names.txt");
    write_text(&path, &["zed", "amy", "mo"]);

    sort_file(&path).unwrap();
    assert_eq!(read_lines(&path), vec!["amy", "mo", "zed"]);
}

/// Records without the key keep their relative order at the end of the file.
#[test]
fn sort_by_created_utc_puts_unkeyed_last() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("posts.jsonl");
    write_jsonl(
        &path,
        &[
            json!({"id":"c","created_utc":300}),
            json!({"id":"x"}),
            json!({"id":"a","created_utc":"1970-01-01T00:01:40"}),
            json!({"id":"b","created_utc":200}),
        ],
    );

    sort_file_by_key(&path, &KeyExtractor::created_utc()).unwrap();
    let ids: Vec<String> = read_jsonl_values(&path).iter().map(|v| v["id"].as_str().unwrap().to_string()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "x"]);
}

#[test]
fn directory_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let sub = create_subdir(dir.path(), "work").unwrap();
    write_text(&sub.join("b.jsonl"), &["1"]);
    write_text(&sub.join("a.jsonl"), &["1"]);
    fs::create_dir_all(sub.join("inner")).unwrap();

    let files = files_in_dir(&sub).unwrap();
    assert_eq!(files, vec![sub.join("a.jsonl"), sub.join("b.jsonl")]);

    assert!(remove_file(&sub.join("a.jsonl")));
    assert!(!sub.join("a.jsonl").exists());
    assert!(remove_file(&sub.join("a.jsonl")), "a file that is already gone counts as removed");
    assert_eq!(clear_dir(&sub).unwrap(), 1);
    assert!(files_in_dir(&sub).unwrap().is_empty());
    assert!(sub.join("inner").is_dir());
}

/// Training files keep `size_training` lines, the others `size_training * (1 - split)`.
#[test]
fn cut_datasets_writes_shortened_copies() {
    let dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = (0..10).map(|i| format!("{{\"n\":{i}}}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_text(&dir.path().join("depression").join("training.jsonl"), &refs);
    write_text(&dir.path().join("depression").join("test.jsonl"), &refs);

    let mut written = cut_datasets(dir.path(), 4, 0.5).unwrap();
    written.sort();
    assert_eq!(written.len(), 2);

    let sub = dir.path().join("depression");
    assert_eq!(read_lines(&sub.join("training_s.jsonl")), refs[..4].to_vec());
    assert_eq!(read_lines(&sub.join("test_s.jsonl")), refs[..2].to_vec());

    assert!(cut_datasets(dir.path(), 4, 1.5).is_err());
}

/// Named, pointer and closure extractors; records without a key compare last.
#[test]
fn key_extractors() {
    let a = json!({"author": "Zed", "id": "b", "acc_id": "12", "meta": {"rank": 2}});
    let b = json!({"author": "amy", "id": "a", "acc_id": 7});

    let by_author = KeyExtractor::from_name("author").unwrap();
    assert_eq!(by_author.key_from_line(r#"{"author":"Zed"}"#), Some(SortKey::Text("zed".into())));
    assert_eq!(by_author.compare(&b, &a), Ordering::Less);

    let by_acc = KeyExtractor::from_name("acc_id").unwrap();
    assert_eq!(by_acc.key_from_value(&a), Some(SortKey::Int(12)));
    assert_eq!(by_acc.compare(&a, &b), Ordering::Greater);

    let rank = KeyExtractor::from_name("/meta/rank").unwrap();
    assert_eq!(rank.compare(&a, &b), Ordering::Less);
    assert!(KeyExtractor::from_name("nonsense").is_none());

    let id_len = KeyExtractor::by_value(|v| v.get("id").and_then(|s| s.as_str()).map(|s| SortKey::Int(s.len() as i64)));
    assert_eq!(id_len.key_from_value(&b), Some(SortKey::Int(1)));
}
