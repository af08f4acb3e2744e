//! Bulk-loading backups and account dumps into the search engine, and running
//! stored query files against it.

use crate::authors::for_each_author_in_dump;
use crate::ndjson::NdjsonReader;
use crate::progress::ProgressScope;
use crate::search::{BulkDoc, BulkOutcome, SearchClient};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub read: u64,
    pub indexed: u64,
    pub failed: u64,
}

struct Batcher<'a> {
    client: &'a SearchClient,
    index: &'a str,
    batch: usize,
    docs: Vec<BulkDoc>,
    summary: IndexSummary,
    pb: ProgressScope,
}

impl<'a> Batcher<'a> {
    fn new(client: &'a SearchClient, index: &'a str, batch: usize, progress: bool) -> Self {
        let batch = batch.max(1);
        Self { client, index, batch, docs: Vec::with_capacity(batch), summary: IndexSummary::default(), pb: ProgressScope::spinner(progress, format!("indexing into {index}")) }
    }

    fn push(&mut self, doc: BulkDoc) {
        self.summary.read += 1;
        self.docs.push(doc);
        if self.docs.len() >= self.batch {
            self.flush();
        }
    }

    /// A failed request loses its batch; the run continues.
    fn flush(&mut self) {
        if self.docs.is_empty() { return; }
        let n = self.docs.len() as u64;
        match self.client.bulk_index(self.index, &self.docs) {
            Ok(BulkOutcome { indexed, failed }) => {
                self.summary.indexed += indexed;
                self.summary.failed += failed;
            }
            Err(e) => {
                tracing::error!(index=%self.index, docs=n, error=%format!("{e:#}"), "bulk request failed");
                self.summary.failed += n;
            }
        }
        self.pb.inc(n);
        self.docs.clear();
    }

    fn finish(mut self) -> IndexSummary {
        self.flush();
        self.pb.finish("done");
        self.summary
    }
}

/// Index every JSON line of `path` in batches of `batch` documents.
pub fn index_from_file(client: &SearchClient, path: &Path, index: &str, batch: usize, progress: bool) -> Result<IndexSummary> {
    client.ensure_index(index)?;
    let mut rdr = NdjsonReader::open(path, 256 * 1024).with_context(|| format!("open {}", path.display()))?;
    let mut b = Batcher::new(client, index, batch, progress);
    rdr.for_each_line(|line| {
        match serde_json::from_str::<Value>(line) {
            Ok(source) => b.push(BulkDoc { id: None, source }),
            Err(e) => tracing::error!(path=%path.display(), error=%e, "malformed line, not indexed"),
        }
        Ok(true)
    })?;
    let summary = b.finish();
    tracing::info!("{} documents indexed successfully (expected {})", summary.indexed, summary.read);
    Ok(summary)
}

/// Index an accounts dump, keyed by `acc_id`.
pub fn index_author_dump(client: &SearchClient, path: &Path, index: &str, batch: usize, progress: bool) -> Result<IndexSummary> {
    client.ensure_index(index)?;
    let mut b = Batcher::new(client, index, batch, progress);
    for_each_author_in_dump(path, |a| {
        let id = a.acc_id.to_string();
        b.push(BulkDoc { id: Some(id), source: serde_json::to_value(&a)? });
        Ok(())
    })?;
    let summary = b.finish();
    tracing::info!("{} accounts indexed successfully (expected {})", summary.indexed, summary.read);
    Ok(summary)
}

/// Run a stored query file: a JSON array whose first element holds `descriptions`
/// (one per array slot) and whose remaining elements are query bodies.
/// Failed queries are logged and left out of the result.
pub fn run_query_file(client: &SearchClient, path: &Path, index: &str) -> Result<Vec<(String, Value)>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let data: Vec<Value> = serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    let descriptions: Vec<String> = data
        .first()
        .and_then(|h| h.get("descriptions"))
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("{}: first element must carry a `descriptions` array", path.display()))?
        .iter()
        .map(|d| d.as_str().unwrap_or_default().to_string())
        .collect();

    let mut out = Vec::new();
    for (i, body) in data.iter().enumerate().skip(1) {
        let desc = descriptions.get(i).cloned().unwrap_or_else(|| format!("query {i}"));
        match client.search(index, body) {
            Ok(resp) => out.push((desc, resp)),
            Err(e) => tracing::error!(query=i, description=%desc, error=%format!("{e:#}"), "query failed"),
        }
    }
    Ok(out)
}
