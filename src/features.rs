//! Per-post text features: pronoun proportions, keyword counts and posting time.

use crate::date::hour_and_month;
use crate::json_utils::created_utc;
use crate::ndjson::{NdjsonReader, NdjsonWriter};
use anyhow::{Context, Result};
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const FIRST_PERSON: &[&str] = &["i", "me", "my", "mine", "myself"];
const SECOND_PERSON: &[&str] = &["you", "your", "yours", "yourself"];
const THIRD_PERSON: &[&str] = &["he", "him", "his", "himself", "she", "her", "hers", "herself"];

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("static regex"))
}

/// Lowercase, strip line breaks, replace runs of non-word characters with a
/// space, then stem every token. Empty input yields a single space.
pub fn pre_process(text: &str) -> String {
    if text.trim().is_empty() {
        return " ".to_string();
    }
    let text = text.replace('\n', " ").replace('\r', "").to_lowercase();
    let cleaned = non_word().replace_all(&text, " ");
    let stemmer = Stemmer::create(Algorithm::English);
    cleaned
        .split_whitespace()
        .map(|w| stemmer.stem(w).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercased word tokens, no stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    non_word().split(&lower).filter(|w| !w.is_empty()).map(str::to_string).collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PronounProportions {
    pub pp1: f64,
    pub pp2: f64,
    pub pp3: f64,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Share of first, second and third person pronouns among all pronouns in `words`.
pub fn pronoun_proportions<S: AsRef<str>>(words: &[S]) -> PronounProportions {
    let (mut p1, mut p2, mut p3) = (0u32, 0u32, 0u32);
    for w in words {
        let w = w.as_ref();
        if FIRST_PERSON.contains(&w) {
            p1 += 1;
        } else if SECOND_PERSON.contains(&w) {
            p2 += 1;
        } else if THIRD_PERSON.contains(&w) {
            p3 += 1;
        }
    }
    let total = p1 + p2 + p3;
    if total == 0 {
        return PronounProportions::default();
    }
    let t = f64::from(total);
    PronounProportions { pp1: round2(f64::from(p1) / t), pp2: round2(f64::from(p2) / t), pp3: round2(f64::from(p3) / t) }
}

/// Occurrences of any of `keywords` (compared lowercase) in `words`.
pub fn count_keywords<S: AsRef<str>, K: AsRef<str>>(words: &[S], keywords: &[K]) -> usize {
    let keys: Vec<String> = keywords.iter().map(|k| k.as_ref().to_lowercase()).collect();
    words.iter().filter(|w| keys.iter().any(|k| k == w.as_ref())).count()
}

/// Keyword lists counted per post.
#[derive(Clone, Debug, Default)]
pub struct KeywordSets {
    pub topic: Vec<String>,
    pub swearing: Vec<String>,
}

impl KeywordSets {
    /// One keyword per line; blank lines ignored.
    pub fn from_files(topic: Option<&Path>, swearing: Option<&Path>) -> Result<Self> {
        let load = |p: Option<&Path>| -> Result<Vec<String>> {
            match p {
                Some(p) => Ok(crate::authors::read_usernames(p)?.into_iter().map(|w| w.to_lowercase()).collect()),
                None => Ok(Vec::new()),
            }
        };
        Ok(Self { topic: load(topic)?, swearing: load(swearing)? })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostFeatures {
    pub id: String,
    pub pp1: f64,
    pub pp2: f64,
    pub pp3: f64,
    pub count_topic_keywords: usize,
    pub count_swearing: usize,
    pub hour: Option<u8>,
    pub month: Option<u8>,
}

impl PostFeatures {
    /// Features over `title` and `selftext`. `None` when the post has no id.
    pub fn from_post(post: &Value, keywords: &KeywordSets) -> Option<Self> {
        let id = post.get("id").and_then(|v| v.as_str())?.to_string();
        let mut text = String::new();
        for field in ["title", "selftext"] {
            if let Some(s) = post.get(field).and_then(|v| v.as_str()) {
                text.push_str(s);
                text.push(' ');
            }
        }
        let words = tokenize(&text);
        let pp = pronoun_proportions(&words);
        let (hour, month) = match created_utc(post).and_then(hour_and_month) {
            Some((h, m)) => (Some(h), Some(m)),
            None => (None, None),
        };
        Some(Self {
            id,
            pp1: pp.pp1,
            pp2: pp.pp2,
            pp3: pp.pp3,
            count_topic_keywords: count_keywords(&words, &keywords.topic),
            count_swearing: count_keywords(&words, &keywords.swearing),
            hour,
            month,
        })
    }
}

/// Compute features for every post in `posts` and write them to `out` as JSONL.
pub fn extract_features_file(posts: &Path, out: &Path, keywords: &KeywordSets) -> Result<u64> {
    let mut rdr = NdjsonReader::open(posts, 256 * 1024).with_context(|| format!("open {}", posts.display()))?;
    let mut w = NdjsonWriter::create(out, 256 * 1024).with_context(|| format!("create {}", out.display()))?;
    let mut n = 0u64;
    rdr.for_each_line(|line| {
        let v: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(path=%posts.display(), error=%e, "malformed post, skipping");
                return Ok(true);
            }
        };
        match PostFeatures::from_post(&v, keywords) {
            Some(f) => {
                w.write_record(&f)?;
                n += 1;
            }
            None => tracing::warn!("post without id skipped"),
        }
        Ok(true)
    })?;
    w.finish()?;
    tracing::info!(posts=n, out=%out.display(), "features written");
    Ok(n)
}
