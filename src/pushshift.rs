//! Historical search API access.
//!
//! `PostSource` is the seam the fetcher talks to. `PushshiftClient` pages through the
//! HTTP API by `created_utc`; `ArchivePostSource` answers the same queries from a local
//! JSONL (or `.zst`) dump when the API is unavailable.

use crate::config::{HarvestOptions, SortOrder};
use crate::json_utils::{created_utc, subreddit_lower};
use crate::ndjson::NdjsonReader;
use ahash::AHashSet;
use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// Submission search parameters. `after`/`before` are exclusive epoch bounds.
#[derive(Clone, Debug)]
pub struct SubmissionQuery {
    pub q: Option<String>,
    pub subreddit: Option<String>,
    pub after: Option<i64>,
    pub before: Option<i64>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl Default for SubmissionQuery {
    fn default() -> Self {
        Self { q: None, subreddit: None, after: None, before: None, sort: SortOrder::Desc, limit: None }
    }
}

impl SubmissionQuery {
    pub fn new() -> Self { Self::default() }
    pub fn query(mut self, q: impl Into<String>) -> Self {
        let q = q.into();
        self.q = if q.trim().is_empty() { None } else { Some(q) };
        self
    }
    pub fn subreddit(mut self, s: impl AsRef<str>) -> Self { self.subreddit = Some(crate::util::normalize_str(s.as_ref())); self }
    pub fn after(mut self, ts: i64) -> Self { self.after = Some(ts); self }
    pub fn before(mut self, ts: i64) -> Self { self.before = Some(ts); self }
    pub fn sort(mut self, order: SortOrder) -> Self { self.sort = order; self }
    pub fn limit(mut self, n: usize) -> Self { self.limit = Some(n); self }
}

pub trait PostSource {
    /// Stream matching submissions in `query.sort` order into `on_post`.
    /// Returning `Ok(false)` from the callback stops the stream.
    /// Returns the number of posts handed to the callback.
    fn search_submissions(&self, query: &SubmissionQuery, on_post: &mut dyn FnMut(Value) -> Result<bool>) -> Result<u64>;
}

impl<T: PostSource + ?Sized> PostSource for Box<T> {
    fn search_submissions(&self, query: &SubmissionQuery, on_post: &mut dyn FnMut(Value) -> Result<bool>) -> Result<u64> {
        (**self).search_submissions(query, on_post)
    }
}

#[derive(Deserialize)]
struct PageResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// Largest `size` the API accepts.
const MAX_PAGE_SIZE: usize = 1000;

/// Blocking HTTP client for `/reddit/search/submission`.
pub struct PushshiftClient {
    http: HttpClient,
    base_url: String,
    page_size: usize,
    delay: Duration,
}

impl PushshiftClient {
    pub fn new(opts: &HarvestOptions) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(opts.request_timeout)
            .user_agent(concat!("pshharvest/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { http, base_url: opts.api_url.clone(), page_size: opts.page_size.max(1), delay: opts.request_delay })
    }

    fn fetch_page(&self, query: &SubmissionQuery, after: Option<i64>, before: Option<i64>, size: usize) -> Result<Vec<Value>> {
        let url = format!("{}/reddit/search/submission", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("sort", query.sort.as_str().to_string()),
            ("sort_type", "created_utc".to_string()),
            ("size", size.to_string()),
        ];
        if let Some(q) = &query.q { params.push(("q", q.clone())); }
        if let Some(s) = &query.subreddit { params.push(("subreddit", s.clone())); }
        if let Some(a) = after { params.push(("after", a.to_string())); }
        if let Some(b) = before { params.push(("before", b.to_string())); }

        tracing::debug!(%url, ?params, "search page");
        let resp = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let page: PageResponse = resp.json().with_context(|| format!("decode response from {url}"))?;
        Ok(page.data)
    }
}

impl PostSource for PushshiftClient {
    /// Pages by `created_utc`. The next cursor stays on the page's edge second so posts
    /// sharing it are not lost; those already delivered are recognised by id. A second
    /// holding more than `MAX_PAGE_SIZE` posts still ends the stream.
    fn search_submissions(&self, query: &SubmissionQuery, on_post: &mut dyn FnMut(Value) -> Result<bool>) -> Result<u64> {
        let mut after = query.after;
        let mut before = query.before;
        let mut delivered = 0u64;
        let mut edge: Option<i64> = None;
        let mut edge_ids: AHashSet<String> = AHashSet::new();

        loop {
            if query.limit.is_some_and(|l| delivered as usize >= l) { break; }
            // Room for the edge-second posts that come back again.
            let size = (self.page_size + edge_ids.len()).min(MAX_PAGE_SIZE);

            let page = self.fetch_page(query, after, before, size)?;
            if page.is_empty() { break; }

            let mut fresh = 0usize;
            for post in page {
                let id = post.get("id").and_then(|v| v.as_str()).map(str::to_owned);
                if id.as_ref().is_some_and(|id| edge_ids.contains(id)) { continue; }
                fresh += 1;

                // Oldest timestamp on a desc page (newest on asc) becomes the next cursor.
                if let Some(ts) = created_utc(&post) {
                    let moved = match (query.sort, edge) {
                        (_, None) => true,
                        (SortOrder::Desc, Some(e)) => ts < e,
                        (SortOrder::Asc, Some(e)) => ts > e,
                    };
                    if moved {
                        edge = Some(ts);
                        edge_ids.clear();
                    }
                    if edge == Some(ts) {
                        edge_ids.extend(id);
                    }
                }
                delivered += 1;
                if !on_post(post)? { return Ok(delivered); }
                if query.limit == Some(delivered as usize) { return Ok(delivered); }
            }
            if fresh == 0 { break; }

            let Some(ts) = edge else { break };
            match query.sort {
                SortOrder::Desc => before = Some(ts.saturating_add(1)),
                SortOrder::Asc => after = Some(ts.saturating_sub(1)),
            }
            if !self.delay.is_zero() { sleep(self.delay); }
        }
        Ok(delivered)
    }
}

/// Offline stand-in for the API: all posts of a local dump held in memory,
/// sorted by `created_utc`. `q` matches case-insensitively against title and selftext.
pub struct ArchivePostSource {
    posts: Vec<(i64, Value)>,
}

impl ArchivePostSource {
    pub fn from_posts(posts: impl IntoIterator<Item = Value>) -> Self {
        let mut posts: Vec<(i64, Value)> = posts
            .into_iter()
            .filter_map(|p| created_utc(&p).map(|ts| (ts, p)))
            .collect();
        posts.sort_by_key(|(ts, _)| *ts);
        Self { posts }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let mut rdr = NdjsonReader::open(path, 256 * 1024).with_context(|| format!("open {}", path.display()))?;
        let mut posts = Vec::new();
        rdr.for_each_line(|line| {
            match serde_json::from_str::<Value>(line) {
                Ok(v) => posts.push(v),
                Err(e) => tracing::warn!(path=%path.display(), error=%e, "skipping malformed archive line"),
            }
            Ok(true)
        })?;
        tracing::info!(path=%path.display(), posts=posts.len(), "archive loaded");
        Ok(Self::from_posts(posts))
    }

    pub fn len(&self) -> usize { self.posts.len() }
    pub fn is_empty(&self) -> bool { self.posts.is_empty() }

    fn matches(query: &SubmissionQuery, needle: Option<&str>, ts: i64, post: &Value) -> bool {
        if query.after.is_some_and(|a| ts <= a) || query.before.is_some_and(|b| ts >= b) {
            return false;
        }
        if let Some(sub) = &query.subreddit {
            if subreddit_lower(post).as_deref() != Some(sub.as_str()) { return false; }
        }
        if let Some(needle) = needle {
            let hit = ["title", "selftext"].iter().any(|k| {
                post.get(*k).and_then(|v| v.as_str()).is_some_and(|s| s.to_lowercase().contains(needle))
            });
            if !hit { return false; }
        }
        true
    }
}

impl PostSource for ArchivePostSource {
    fn search_submissions(&self, query: &SubmissionQuery, on_post: &mut dyn FnMut(Value) -> Result<bool>) -> Result<u64> {
        let needle = query.q.as_ref().map(|q| q.to_lowercase());
        let ordered: Box<dyn Iterator<Item = &(i64, Value)>> = match query.sort {
            SortOrder::Asc => Box::new(self.posts.iter()),
            SortOrder::Desc => Box::new(self.posts.iter().rev()),
        };
        let mut delivered = 0u64;
        for (ts, post) in ordered {
            if query.limit.is_some_and(|l| delivered as usize >= l) { break; }
            if !Self::matches(query, needle.as_deref(), *ts, post) { continue; }
            delivered += 1;
            if !on_post(post.clone())? { break; }
        }
        Ok(delivered)
    }
}
