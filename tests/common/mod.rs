#![allow(dead_code)]

use pshharvest::{AuthorRecord, HarvestOptions};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread;

/// Write `lines` as a plain JSONL file, creating parent directories.
pub fn write_jsonl(path: &Path, lines: &[Value]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(f, "{}", l).unwrap();
    }
}

/// Write raw text lines (for usernames lists, CSV sheets, dumps).
pub fn write_text(path: &Path, lines: &[&str]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(f, "{}", l).unwrap();
    }
}

/// Read a JSONL file into a vector of `serde_json::Value` (skips empty lines).
pub fn read_jsonl_values(path: &Path) -> Vec<Value> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines()
        .map(|l| l.unwrap())
        .filter(|s| !s.is_empty())
        .map(|s| serde_json::from_str(&s).unwrap())
        .collect()
}

/// Read a text file line-by-line into strings.
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// A submission as the search API returns it, with a few fields that are not whitelisted.
pub fn post(id: &str, author: &str, subreddit: &str, created_utc: i64, title: &str) -> Value {
    json!({
        "id": id,
        "author": author,
        "subreddit": subreddit,
        "created_utc": created_utc,
        "title": title,
        "selftext": "",
        "num_comments": 0,
        "score": 1,
        "over_18": false,
        "url": format!("https://reddit.com/r/{subreddit}/{id}"),
        "author_flair_css_class": null,
        "all_awardings": []
    })
}

pub fn author(acc_id: i64, username: &str, created: i64, comment_karma: i64, link_karma: i64) -> AuthorRecord {
    AuthorRecord { acc_id, username: username.to_string(), created, updated: created, comment_karma, link_karma }
}

/// Options pointing backups and data at `dir`, progress bars off.
pub fn quiet_options(dir: &Path) -> HarvestOptions {
    pshharvest::init_tracing_once();
    HarvestOptions::default()
        .with_backups_dir(dir.join("backups"))
        .with_data_dir(dir.join("data"))
        .with_progress(false)
}

/// One-connection-per-request HTTP/1.1 server on localhost. `handler` gets the method,
/// the request target and the body, and returns a JSON body served with status 200.
/// Returns the base URL.
pub fn serve_json<F>(handler: F) -> String
where
    F: Fn(&str, &str, &str) -> Value + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or("");
            let target = parts.next().unwrap_or("");
            let reply = handler(method, target, &String::from_utf8_lossy(&body)).to_string();
            let _ = write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
        }
    });
    format!("http://{addr}")
}

/// Integer query parameter `name` of a request target.
pub fn query_param(target: &str, name: &str) -> Option<i64> {
    let query = target.split_once('?').map(|(_, q)| q)?;
    query.split('&').find_map(|kv| kv.strip_prefix(name)?.strip_prefix('=')?.parse().ok())
}
