#[path = "common/mod.rs"]
mod common;

use common::*;
use pshharvest::{
    count_keywords, extract_features_file, pre_process, pronoun_proportions, tokenize, KeywordSets, PostFeatures,
    PronounProportions,
};
use serde_json::json;

#[test]
fn pre_process_normalizes_and_stems() {
    assert_eq!(pre_process("Running\nDOGS!!  are\r\nrunning..."), "run dog are run");
    assert_eq!(pre_process(""), " ");
    assert_eq!(pre_process("   "), " ");
}

#[test]
fn tokenize_splits_on_non_word_characters() {
    assert_eq!(tokenize("I can't, you know?"), vec!["i", "can", "t", "you", "know"]);
}

/// Proportions are rounded to two decimals and are all zero without pronouns.
#[test]
fn pronoun_proportions_by_person() {
    let words = ["i", "me", "you", "he", "said", "she", "my"];
    let p = pronoun_proportions(&words);
    assert_eq!(p, PronounProportions { pp1: 0.5, pp2: 0.17, pp3: 0.33 });

    assert_eq!(pronoun_proportions(&["nothing", "here"]), PronounProportions::default());
    let empty: [&str; 0] = [];
    assert_eq!(pronoun_proportions(&empty), PronounProportions::default());
}

#[test]
fn keyword_counting_is_case_insensitive_on_keywords() {
    let words = tokenize("Sad and lonely, so sad");
    assert_eq!(count_keywords(&words, &["SAD", "lonely"]), 3);
    assert_eq!(count_keywords(&words, &Vec::<String>::new()), 0);
}

#[test]
fn post_features_combine_title_and_body() {
    let keywords = KeywordSets { topic: vec!["sad".into()], swearing: vec!["damn".into()] };
    let p = json!({
        "id": "p1",
        "title": "I am sad",
        "selftext": "damn, you are sad too",
        "created_utc": 1_136_116_800
    });

    let f = PostFeatures::from_post(&p, &keywords).unwrap();
    assert_eq!(f.id, "p1");
    assert_eq!((f.pp1, f.pp2, f.pp3), (0.5, 0.5, 0.0));
    assert_eq!(f.count_topic_keywords, 2);
    assert_eq!(f.count_swearing, 1);
    // 2006-01-01T12:00:00Z
    assert_eq!((f.hour, f.month), (Some(12), Some(1)));

    assert!(PostFeatures::from_post(&json!({"title": "no id"}), &keywords).is_none());
}

#[test]
fn features_file_has_one_line_per_post() {
    let dir = tempfile::tempdir().unwrap();
    let posts = dir.path().join("posts.jsonl");
    let out = dir.path().join("features.jsonl");
    write_jsonl(&posts, &[post("a", "u", "s", 1_136_116_800, "me"), json!({"title": "no id"}), post("b", "u", "s", 1, "him")]);
    let topic = dir.path().join("topic.txt");
    write_text(&topic, &["Me"]);

    let keywords = KeywordSets::from_files(Some(&topic), None).unwrap();
    assert_eq!(extract_features_file(&posts, &out, &keywords).unwrap(), 2);

    let rows = read_jsonl_values(&out);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["count_topic_keywords"], json!(1));
    assert_eq!(rows[1]["pp3"], json!(1.0));
    assert_eq!(rows[1]["hour"], json!(0));
}
