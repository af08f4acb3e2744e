//! Author records and username lists derived from post backups.

use crate::json_utils::lenient_i64;
use crate::ndjson::{read_records, write_records, NdjsonReader, NdjsonWriter};
use crate::util::{default_bot_authors, is_pseudo_user, open_with_backoff};
use ahash::{AHashMap, AHashSet};
use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Usernames per directory lookup request.
pub const MAX_LOOKUP_CHUNK: usize = 50_000;

/// Account metadata from the bulk accounts dump.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRecord {
    #[serde(deserialize_with = "de_i64_lenient")]
    pub acc_id: i64,
    pub username: String,
    /// Account creation, epoch seconds.
    #[serde(deserialize_with = "de_epoch_lenient")]
    pub created: i64,
    /// When the dump row was retrieved, epoch seconds.
    #[serde(default, deserialize_with = "de_epoch_lenient")]
    pub updated: i64,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    pub comment_karma: i64,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    pub link_karma: i64,
}

fn de_i64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(d)?;
    lenient_i64(&v).ok_or_else(|| serde::de::Error::custom(format!("expected integer, got {v}")))
}

fn de_epoch_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(d)?;
    lenient_i64(&v)
        .or_else(|| v.as_str().and_then(|s| crate::date::from_iso(s).ok()))
        .ok_or_else(|| serde::de::Error::custom(format!("expected timestamp, got {v}")))
}

impl AuthorRecord {
    /// Parse a dump row: `acc_id,username,created,updated,comment_karma,link_karma`.
    pub fn from_csv_fields(fields: &[&str]) -> Result<Self> {
        if fields.len() < 6 {
            return Err(anyhow!("expected 6 fields, got {}", fields.len()));
        }
        let num = |i: usize, name: &str| -> Result<i64> {
            lenient_i64(&Value::String(fields[i].to_string())).ok_or_else(|| anyhow!("invalid {name}: {:?}", fields[i]))
        };
        Ok(Self {
            acc_id: num(0, "acc_id")?,
            username: fields[1].trim().to_string(),
            created: num(2, "created")?,
            updated: num(3, "updated").unwrap_or(0),
            comment_karma: num(4, "comment_karma")?,
            link_karma: num(5, "link_karma")?,
        })
    }
}

pub fn sort_by_acc_id(authors: &mut [AuthorRecord]) {
    authors.sort_by_key(|a| a.acc_id);
}

/// Stream an accounts dump (`.csv`, `.csv.gz` or `.jsonl`) record by record.
/// A non-numeric first CSV row is treated as a header. Bad rows are logged and skipped.
pub fn for_each_author_in_dump(path: &Path, mut f: impl FnMut(AuthorRecord) -> Result<()>) -> Result<u64> {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    let mut n = 0u64;

    if name.ends_with(".jsonl") || name.ends_with(".jsonl.zst") || name.ends_with(".jsonl.gz") {
        let mut rdr = NdjsonReader::open(path, 256 * 1024).with_context(|| format!("open {}", path.display()))?;
        rdr.for_each_line(|line| {
            match serde_json::from_str::<AuthorRecord>(line) {
                Ok(a) => { f(a)?; n += 1; }
                Err(e) => tracing::error!(path=%path.display(), error=%e, "skipping malformed author record"),
            }
            Ok(true)
        })?;
        return Ok(n);
    }

    let file = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let input: Box<dyn Read> = if name.ends_with(".gz") { Box::new(GzDecoder::new(file)) } else { Box::new(file) };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(BufReader::with_capacity(256 * 1024, input));

    for (i, rec) in rdr.records().enumerate() {
        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(path=%path.display(), row=i + 1, error=%e, "unreadable dump row, skipping");
                continue;
            }
        };
        let fields: Vec<&str> = rec.iter().collect();
        match AuthorRecord::from_csv_fields(&fields) {
            Ok(a) => { f(a)?; n += 1; }
            Err(_) if i == 0 => tracing::debug!(path=%path.display(), "header row skipped"),
            Err(e) => tracing::error!(path=%path.display(), row=i + 1, error=%e, "skipping malformed author row"),
        }
    }
    Ok(n)
}

pub fn load_author_dump(path: &Path) -> Result<Vec<AuthorRecord>> {
    let mut out = Vec::new();
    for_each_author_in_dump(path, |a| { out.push(a); Ok(()) })?;
    Ok(out)
}

/// Distinct real authors of a posts backup.
pub fn obtain_usernames(posts: &Path) -> Result<AHashSet<String>> {
    let mut rdr = NdjsonReader::open(posts, 256 * 1024).with_context(|| format!("open {}", posts.display()))?;
    let mut authors = AHashSet::new();
    rdr.for_each_line(|line| {
        let v: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(path=%posts.display(), error=%e, "malformed post, skipping");
                return Ok(true);
            }
        };
        match v.get("author").and_then(|a| a.as_str()) {
            Some(a) if !is_pseudo_user(a) => { authors.insert(a.to_string()); }
            Some(_) => {}
            None => tracing::error!("post {} has no author", v.get("id").unwrap_or(&serde_json::Value::Null)),
        }
        Ok(true)
    })?;
    Ok(authors)
}

/// Case authors of `subreddit_posts` and reference authors of `reference_posts`
/// who never posted in the case backup. Both lists are sorted.
pub fn obtain_authors(subreddit_posts: &Path, reference_posts: &Path, exclude_bots: bool) -> Result<(Vec<String>, Vec<String>)> {
    let mut case = obtain_usernames(subreddit_posts)?;
    let mut reference = obtain_usernames(reference_posts)?;
    if exclude_bots {
        let bots: AHashSet<String> = default_bot_authors().into_iter().collect();
        case.retain(|a| !bots.contains(&a.to_lowercase()));
        reference.retain(|a| !bots.contains(&a.to_lowercase()));
    }
    let case_lower: AHashSet<String> = case.iter().map(|a| a.to_lowercase()).collect();
    reference.retain(|a| !case_lower.contains(&a.to_lowercase()));

    let mut case: Vec<String> = case.into_iter().collect();
    let mut reference: Vec<String> = reference.into_iter().collect();
    case.sort();
    reference.sort();
    tracing::info!(case=case.len(), reference=reference.len(), "authors collected");
    Ok((case, reference))
}

/// One username per line.
pub fn write_usernames(path: &Path, names: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let f = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for n in names {
        writeln!(w, "{n}")?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_usernames(path: &Path) -> Result<Vec<String>> {
    let f = open_with_backoff(path, 16, 50).with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line?;
        let name = line.trim();
        if !name.is_empty() {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

/// Subreddits listed in `path` (one per line, missing file tolerated) plus `additional`, without duplicates.
pub fn list_excluded_subreddits(path: &Path, additional: &[String]) -> Vec<String> {
    let mut subs: Vec<String> = Vec::new();
    if path.is_file() {
        match read_usernames(path) {
            Ok(list) => subs.extend(list.into_iter().map(|s| crate::util::normalize_str(&s))),
            Err(e) => tracing::error!(path=%path.display(), error=%format!("{e:#}"), "read error"),
        }
    }
    for s in additional {
        let s = crate::util::normalize_str(s);
        if !subs.contains(&s) {
            subs.push(s);
        }
    }
    subs
}

/// Look up account metadata for `usernames` in chunks, sort by `acc_id`, and write
/// the result to `out` as JSONL.
pub fn extract_authors_info(
    usernames: &[String],
    directory: &dyn crate::matcher::AuthorDirectory,
    out: &Path,
) -> Result<Vec<AuthorRecord>> {
    let n_chunks = usernames.len().div_ceil(MAX_LOOKUP_CHUNK);
    tracing::info!(authors=usernames.len(), chunks=n_chunks, "looking up author info");

    let mut result = Vec::with_capacity(usernames.len());
    for (i, chunk) in usernames.chunks(MAX_LOOKUP_CHUNK).enumerate() {
        match directory.lookup_usernames(chunk) {
            Ok(found) => result.extend(found),
            Err(e) => tracing::error!(chunk=i + 1, error=%format!("{e:#}"), "lookup failed, chunk skipped"),
        }
        tracing::debug!("chunk {}/{} processed", i + 1, n_chunks);
    }
    tracing::info!("information found for {} of {} authors", result.len(), usernames.len());

    sort_by_acc_id(&mut result);
    write_records(out, &result)?;
    Ok(result)
}

/// Attach each submission's comments (matched on `link_id`, with or without the
/// `t3_` prefix) under `comments` and append the result to `out`.
/// With `remove_op`, comments by the submission's author are left out.
pub fn link_comments_and_submissions(submissions: &Path, comments: &Path, out: &Path, remove_op: bool) -> Result<u64> {
    let mut by_link: AHashMap<String, Vec<Value>> = AHashMap::new();
    for c in read_records::<Value>(comments)? {
        let Some(link) = c.get("link_id").and_then(|v| v.as_str()) else { continue };
        let link = link.strip_prefix("t3_").unwrap_or(link).to_string();
        by_link.entry(link).or_default().push(c);
    }

    let mut w = NdjsonWriter::append(out, 256 * 1024).with_context(|| format!("open {}", out.display()))?;
    let mut n = 0u64;
    for mut sub in read_records::<Value>(submissions)? {
        let Some(id) = sub.get("id").and_then(|v| v.as_str()).map(str::to_string) else { continue };
        let op = sub.get("author").and_then(|v| v.as_str()).map(str::to_string);
        let linked: Vec<Value> = by_link
            .get(&id)
            .map(|cs| {
                cs.iter()
                    .filter(|c| !(remove_op && op.is_some() && c.get("author").and_then(|a| a.as_str()) == op.as_deref()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(expected) = sub.get("num_comments").and_then(lenient_i64) {
            if expected != linked.len() as i64 {
                tracing::debug!("submission {id} has {expected} comments, but {} were found", linked.len());
            }
        }
        if let Some(obj) = sub.as_object_mut() {
            obj.insert("comments".into(), Value::Array(linked));
        }
        w.write_record(&sub)?;
        n += 1;
    }
    w.finish()?;
    Ok(n)
}
