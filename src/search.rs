//! Blocking client for an Elasticsearch-compatible REST API: index management,
//! `_bulk` loading, `_search` and scroll scans.

use crate::authors::AuthorRecord;
use crate::config::HarvestOptions;
use crate::matcher::{AuthorDirectory, MatchCriteria};
use ahash::AHashSet;
use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::{json, Value};

const SCROLL_KEEPALIVE: &str = "1m";
const SCROLL_PAGE: usize = 1000;

/// One document of a bulk request. Without `id` the engine assigns one.
#[derive(Clone, Debug)]
pub struct BulkDoc {
    pub id: Option<String>,
    pub source: Value,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: u64,
    pub failed: u64,
}

pub struct SearchClient {
    http: HttpClient,
    base_url: String,
}

impl SearchClient {
    pub fn new(opts: &HarvestOptions) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(opts.request_timeout)
            .build()
            .context("building HTTP client")?;
        tracing::debug!(url=%opts.search_url, "search engine client ready");
        Ok(Self { http, base_url: opts.search_url.clone() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.url(index);
        let resp = self.http.head(&url).send().with_context(|| format!("HEAD {url} (is the search engine running?)"))?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(anyhow!("HEAD {url}: unexpected status {s}")),
        }
    }

    /// Create `index`; an index that already exists is not an error.
    pub fn create_index(&self, index: &str) -> Result<()> {
        let url = self.url(index);
        let resp = self.http.put(&url).send().with_context(|| format!("PUT {url}"))?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => {
                tracing::debug!(%index, "index already exists");
                Ok(())
            }
            s => Err(anyhow!("PUT {url}: unexpected status {s}")),
        }
    }

    pub fn ensure_index(&self, index: &str) -> Result<()> {
        if !self.index_exists(index)? {
            self.create_index(index)?;
            tracing::info!(%index, "index created");
        }
        Ok(())
    }

    /// Send one `_bulk` request. Per-item failures are counted and logged.
    pub fn bulk_index(&self, index: &str, docs: &[BulkDoc]) -> Result<BulkOutcome> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let mut body = String::with_capacity(docs.len() * 256);
        for d in docs {
            let action = match &d.id {
                Some(id) => json!({"index": {"_index": index, "_id": id}}),
                None => json!({"index": {"_index": index}}),
            };
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&d.source.to_string());
            body.push('\n');
        }

        let url = self.url("_bulk");
        let resp: Value = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?
            .json()
            .context("decode bulk response")?;

        let mut outcome = BulkOutcome::default();
        for item in resp.get("items").and_then(|v| v.as_array()).into_iter().flatten() {
            let status = item.pointer("/index/status").and_then(|s| s.as_u64()).unwrap_or(0);
            if (200..300).contains(&status) {
                outcome.indexed += 1;
            } else {
                outcome.failed += 1;
                tracing::error!(status, error=%item.pointer("/index/error").unwrap_or(&serde_json::Value::Null), "bulk item rejected");
            }
        }
        Ok(outcome)
    }

    pub fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let url = self.url(&format!("{index}/_search"));
        self.http
            .post(&url)
            .json(body)
            .send()
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?
            .json()
            .context("decode search response")
    }

    /// Every document whose `field` is one of `values`, via the scroll API.
    pub fn scan_terms(&self, index: &str, field: &str, values: &[String], mut on_hit: impl FnMut(Value) -> Result<()>) -> Result<u64> {
        let body = json!({
            "size": SCROLL_PAGE,
            "query": {"bool": {"filter": {"terms": {field: values}}}}
        });
        let url = self.url(&format!("{index}/_search?scroll={SCROLL_KEEPALIVE}"));
        let mut resp: Value = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?
            .json()
            .context("decode scroll response")?;

        let mut n = 0u64;
        loop {
            let hits = hit_sources(&resp);
            if hits.is_empty() { break; }
            for h in hits {
                on_hit(h)?;
                n += 1;
            }
            let Some(scroll_id) = resp.get("_scroll_id").and_then(|s| s.as_str()).map(str::to_string) else { break };
            let url = self.url("_search/scroll");
            resp = self
                .http
                .post(&url)
                .json(&json!({"scroll": SCROLL_KEEPALIVE, "scroll_id": scroll_id}))
                .send()
                .with_context(|| format!("POST {url}"))?
                .error_for_status()
                .with_context(|| format!("POST {url}"))?
                .json()
                .context("decode scroll response")?;
        }

        if let Some(scroll_id) = resp.get("_scroll_id").and_then(|s| s.as_str()) {
            let url = self.url("_search/scroll");
            if let Err(e) = self.http.delete(&url).json(&json!({"scroll_id": scroll_id})).send() {
                tracing::debug!(error=%e, "scroll cleanup failed");
            }
        }
        Ok(n)
    }
}

/// `_source` of every hit in a search response.
pub fn hit_sources(resp: &Value) -> Vec<Value> {
    resp.pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|hits| hits.iter().filter_map(|h| h.get("_source").cloned()).collect())
        .unwrap_or_default()
}

/// `_source` of the first hit, if any.
pub fn first_hit(resp: &Value) -> Option<Value> {
    resp.pointer("/hits/hits/0/_source").cloned()
}

/// Similarity query over an accounts index, ordered by `acc_id`.
///
/// Excluded usernames go into a `must_not` clause. Pass the last `acc_id` of the previous
/// page as `search_after` to continue.
pub fn candidates_query(
    criteria: &MatchCriteria,
    excluded: &AHashSet<String>,
    size: usize,
    search_after: Option<i64>,
) -> Value {
    let mut names: Vec<&str> = excluded.iter().map(String::as_str).collect();
    names.sort_unstable();
    let mut q = json!({
        "size": size,
        "sort": [{"acc_id": "asc"}],
        "query": {"bool": {
            "filter": [
                {"range": {"created": {"gte": criteria.created.lo, "lte": criteria.created.hi}}},
                {"range": {"comment_karma": {"gte": criteria.comment_karma.lo, "lte": criteria.comment_karma.hi}}},
                {"range": {"link_karma": {"gte": criteria.link_karma.lo, "lte": criteria.link_karma.hi}}}
            ],
            "must_not": [{"terms": {"username": names}}]
        }}
    });
    if let Some(after) = search_after {
        q["search_after"] = json!([after]);
    }
    q
}

/// An accounts index seen as an `AuthorDirectory`.
pub struct IndexedAuthors<'a> {
    client: &'a SearchClient,
    index: String,
}

impl<'a> IndexedAuthors<'a> {
    pub fn new(client: &'a SearchClient, index: impl Into<String>) -> Self {
        Self { client, index: index.into() }
    }
}

fn parse_author(v: Value) -> Option<AuthorRecord> {
    match serde_json::from_value::<AuthorRecord>(v) {
        Ok(a) => Some(a),
        Err(e) => {
            tracing::error!(error=%e, "unreadable author document, skipping");
            None
        }
    }
}

impl AuthorDirectory for IndexedAuthors<'_> {
    fn lookup_usernames(&self, usernames: &[String]) -> Result<Vec<AuthorRecord>> {
        let mut out = Vec::with_capacity(usernames.len());
        self.client.scan_terms(&self.index, "username", usernames, |hit| {
            out.extend(parse_author(hit));
            Ok(())
        })?;
        Ok(out)
    }

    // `must_not` is an exact keyword match while exclusion is case-insensitive, so hits are
    // filtered again here and paging continues until enough eligible accounts are found.
    fn find_candidates(
        &self,
        criteria: &MatchCriteria,
        excluded: &AHashSet<String>,
        limit: usize,
    ) -> Result<Vec<AuthorRecord>> {
        let size = limit.max(1);
        let mut out = Vec::new();
        let mut after = None;
        loop {
            let prev = after;
            let resp = self.client.search(&self.index, &candidates_query(criteria, excluded, size, after))?;
            let hits = hit_sources(&resp);
            let page_len = hits.len();
            for a in hits.into_iter().filter_map(parse_author) {
                after = Some(a.acc_id);
                if !excluded.contains(&a.username.to_lowercase()) {
                    out.push(a);
                }
            }
            if out.len() >= limit || page_len < size || after == prev {
                break;
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}
