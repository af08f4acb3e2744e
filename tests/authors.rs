#[path = "common/mod.rs"]
mod common;

use common::*;
use pshharvest::{
    extract_authors_info, link_comments_and_submissions, list_excluded_subreddits, load_author_dump, obtain_authors,
    obtain_usernames, read_records, read_usernames, write_usernames, AuthorRecord, MemoryAuthorDirectory,
};
use serde_json::json;

#[test]
fn usernames_skip_placeholder_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let posts = dir.path().join("posts.jsonl");
    write_jsonl(
        &posts,
        &[
            post("1", "alice", "depression", 1, "t"),
            post("2", "[deleted]", "depression", 2, "t"),
            post("3", "alice", "depression", 3, "t"),
            post("4", "Bob", "depression", 4, "t"),
            json!({"id": "5", "title": "authorless"}),
        ],
    );

    let mut got: Vec<String> = obtain_usernames(&posts).unwrap().into_iter().collect();
    got.sort();
    assert_eq!(got, vec!["Bob", "alice"]);
}

/// Reference authors who also posted in the case backup are dropped, ignoring case;
/// bots go when asked.
#[test]
fn reference_authors_exclude_case_authors() {
    let dir = tempfile::tempdir().unwrap();
    let case = dir.path().join("case.jsonl");
    let reference = dir.path().join("ref.jsonl");
    write_jsonl(
        &case,
        &[post("1", "alice", "depression", 1, "t"), post("2", "AutoModerator", "depression", 2, "t")],
    );
    write_jsonl(
        &reference,
        &[
            post("3", "ALICE", "news", 3, "t"),
            post("4", "carol", "news", 4, "t"),
            post("5", "automoderator", "news", 5, "t"),
            post("6", "bob", "news", 6, "t"),
        ],
    );

    let (c, r) = obtain_authors(&case, &reference, true).unwrap();
    assert_eq!(c, vec!["alice"]);
    assert_eq!(r, vec!["bob", "carol"]);

    let (c, r) = obtain_authors(&case, &reference, false).unwrap();
    assert_eq!(c, vec!["AutoModerator", "alice"]);
    assert_eq!(r, vec!["bob", "carol"]);
}

#[test]
fn usernames_list_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("authors.txt");
    let names = vec!["alice".to_string(), "bob".to_string()];
    write_usernames(&path, &names).unwrap();
    assert_eq!(read_usernames(&path).unwrap(), names);
}

/// A header row and malformed rows are skipped; numeric fields may be quoted or fractional.
#[test]
fn csv_dump_is_parsed_leniently() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("accounts.csv");
    write_text(
        &dump,
        &[
            "acc_id,username,created,updated,comment_karma,link_karma",
            "12,alice,1300000000,1500000000,10,20",
            "7,bob,\"1200000000.0\",1500000000,-3,0",
            "oops,carol,1,1,1,1",
            "9,short",
        ],
    );

    let authors = load_author_dump(&dump).unwrap();
    assert_eq!(authors.len(), 2);
    assert_eq!(authors[0], AuthorRecord {
        acc_id: 12,
        username: "alice".into(),
        created: 1_300_000_000,
        updated: 1_500_000_000,
        comment_karma: 10,
        link_karma: 20,
    });
    assert_eq!(authors[1].created, 1_200_000_000);
    assert_eq!(authors[1].comment_karma, -3);
}

/// Found authors are written sorted by account id; unknown usernames are left out.
#[test]
fn authors_info_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let directory = MemoryAuthorDirectory::new(vec![
        author(30, "carol", 3, 0, 0),
        author(10, "Alice", 1, 0, 0),
        author(20, "bob", 2, 0, 0),
    ]);
    let out = dir.path().join("info.jsonl");
    let names = vec!["carol".to_string(), "alice".to_string(), "nobody".to_string()];

    let found = extract_authors_info(&names, &directory, &out).unwrap();
    let ids: Vec<i64> = found.iter().map(|a| a.acc_id).collect();
    assert_eq!(ids, vec![10, 30]);
    let back: Vec<AuthorRecord> = read_records(&out).unwrap();
    assert_eq!(back, found);
}

#[test]
fn excluded_subreddits_are_normalized_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("excluded.txt");
    write_text(&list, &["r/Depression", "SuicideWatch"]);

    let subs = list_excluded_subreddits(&list, &["depression".to_string(), "r/Anxiety".to_string()]);
    assert_eq!(subs, vec!["depression", "suicidewatch", "anxiety"]);

    let subs = list_excluded_subreddits(&dir.path().join("missing.txt"), &["x".to_string()]);
    assert_eq!(subs, vec!["x"]);
}

/// Comments are attached to their submission; with `remove_op` the submitter's own replies go.
#[test]
fn comments_are_linked_to_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let subs = dir.path().join("subs.jsonl");
    let comments = dir.path().join("comments.jsonl");
    let out = dir.path().join("linked.jsonl");
    write_jsonl(&subs, &[json!({"id":"s1","author":"op","num_comments":3}), json!({"id":"s2","author":"x"})]);
    write_jsonl(
        &comments,
        &[
            json!({"id":"c1","author":"a","link_id":"t3_s1"}),
            json!({"id":"c2","author":"op","link_id":"t3_s1"}),
            json!({"id":"c3","author":"b","link_id":"s1"}),
        ],
    );

    assert_eq!(link_comments_and_submissions(&subs, &comments, &out, true).unwrap(), 2);
    let linked = read_jsonl_values(&out);
    let ids: Vec<&str> = linked[0]["comments"].as_array().unwrap().iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["c1", "c3"]);
    assert_eq!(linked[1]["comments"], json!([]));
}
