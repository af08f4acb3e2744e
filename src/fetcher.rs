//! Harvesting posts from a `PostSource` into append-only JSONL backups.

use crate::blocks::{Block, BlockConfig, BlockGenerator};
use crate::config::{HarvestOptions, SortOrder};
use crate::date::{now_epoch, to_iso};
use crate::json_utils::{created_utc, subreddit_lower};
use crate::ndjson::{NdjsonReader, NdjsonWriter};
use crate::progress::ProgressScope;
use crate::pushshift::{PostSource, SubmissionQuery};
use crate::sheets::ScaleQueries;
use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Fields kept from an API response.
pub const POST_FIELDS: [&str; 16] = [
    "id", "url", "title", "author", "selftext", "created_utc", "retrieved_on", "subreddit",
    "subreddit_id", "subreddit_type", "domain", "gildings", "num_comments", "score", "over_18",
    "permalink",
];

pub type Post = Map<String, Value>;

/// Keep the whitelisted fields that are present. Posts without an `id` are discarded.
pub fn convert_response(post: &Value) -> Option<Post> {
    let obj = post.as_object()?;
    if !obj.get("id").is_some_and(|v| v.is_string() || v.is_number()) {
        tracing::error!("post without id, skipping");
        return None;
    }
    Some(
        POST_FIELDS
            .iter()
            .filter_map(|k| obj.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect(),
    )
}

#[derive(Clone, Debug)]
pub struct FetchStats {
    pub path: PathBuf,
    pub written: u64,
    pub skipped: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct ReferenceConfig {
    pub block_size: usize,
    pub posts_per_block: usize,
    /// Posts newer than this (epoch seconds) are not sampled around.
    pub cutoff: i64,
    /// Attach `parameters` (`random_baseline`) to sampled posts.
    pub params: bool,
    /// Subreddit whose posts must not enter the reference collection.
    pub exclude_subreddit: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ReferenceSummary {
    pub path: PathBuf,
    pub windows: usize,
    pub written: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub initial: Option<i64>,
    pub last_end: Option<i64>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct ScalesSummary {
    pub files: Vec<PathBuf>,
    pub written: u64,
    pub failed_queries: Vec<String>,
    pub elapsed: Duration,
}

pub struct Fetcher<S: PostSource> {
    source: S,
    opts: HarvestOptions,
}

impl<S: PostSource> Fetcher<S> {
    pub fn new(source: S, opts: HarvestOptions) -> Self {
        Self { source, opts }
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.opts
    }

    fn backup_path(&self, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.opts.backups_dir)
            .with_context(|| format!("create {}", self.opts.backups_dir.display()))?;
        Ok(self.opts.backups_dir.join(name))
    }

    /// Full history of a subreddit older than `before`, newest first, into
    /// `r_<subreddit>_<now>.jsonl`.
    pub fn extract_historic_for_subreddit(&self, subreddit: &str, before: i64) -> Result<FetchStats> {
        let subreddit = crate::util::normalize_str(subreddit);
        if subreddit.is_empty() || subreddit.contains(char::is_whitespace) {
            anyhow::bail!("invalid subreddit name: {subreddit:?}");
        }
        let path = self.backup_path(&format!("r_{}_{}.jsonl", subreddit, now_epoch()))?;
        let mut w = NdjsonWriter::append(&path, self.opts.write_buffer_bytes)
            .with_context(|| format!("open {}", path.display()))?;

        tracing::info!(%subreddit, before=%to_iso(before), "starting historic extraction");
        let started = Instant::now();
        let pb = ProgressScope::spinner(self.opts.progress, format!("r/{subreddit}"));
        let (mut written, mut skipped) = (0u64, 0u64);

        let query = SubmissionQuery::new().subreddit(&subreddit).before(before).sort(SortOrder::Desc);
        self.source.search_submissions(&query, &mut |raw| {
            match convert_response(&raw) {
                Some(post) => {
                    w.write_record(&post)?;
                    written += 1;
                    pb.inc(1);
                }
                None => skipped += 1,
            }
            Ok(true)
        })?;
        w.finish()?;
        pb.finish("done");

        let stats = FetchStats { path, written, skipped, elapsed: started.elapsed() };
        tracing::info!(path=%stats.path.display(), written, skipped, secs=%format!("{:.3}", stats.elapsed.as_secs_f64()), "historic extraction finished");
        Ok(stats)
    }

    /// Up to `size` posts created in `[lo, hi)`, newest first, appended to `out`.
    pub fn extract_posts_for_interval(
        &self,
        lo: i64,
        hi: i64,
        size: usize,
        exclude_subreddit: Option<&str>,
        params: bool,
        out: &mut NdjsonWriter,
    ) -> Result<FetchStats> {
        tracing::debug!("interval: [{} - {})", to_iso(lo), to_iso(hi));
        let started = Instant::now();
        let exclude = exclude_subreddit.map(crate::util::normalize_str);
        let (mut written, mut skipped) = (0u64, 0u64);

        if size > 0 {
            // `after` is exclusive on the API side.
            let query = SubmissionQuery::new().after(lo.saturating_sub(1)).before(hi).sort(SortOrder::Desc);
            self.source.search_submissions(&query, &mut |raw| {
                let Some(mut post) = convert_response(&raw) else {
                    skipped += 1;
                    return Ok(true);
                };
                let sub = subreddit_lower(&raw);
                if sub.is_none() {
                    tracing::error!("missing subreddit key, skipping post");
                    skipped += 1;
                    return Ok(true);
                }
                if exclude.is_some() && sub == exclude {
                    skipped += 1;
                    return Ok(true);
                }
                if params {
                    post.insert("parameters".into(), json!({"query": "", "scale": "random_baseline", "thematic": false}));
                }
                out.write_record(&post)?;
                written += 1;
                Ok((written as usize) < size)
            })?;
        }
        out.flush()?;
        Ok(FetchStats { path: out.path().to_path_buf(), written, skipped, elapsed: started.elapsed() })
    }

    fn sample_block(&self, block: &Block, size: usize, cfg: &ReferenceConfig, out: &mut NdjsonWriter) -> (u64, Duration) {
        let (lo, hi) = block.interval();
        match self.extract_posts_for_interval(lo, hi, size, cfg.exclude_subreddit.as_deref(), cfg.params, out) {
            Ok(s) => {
                tracing::debug!(block=block.index, written=s.written, "window sampled");
                (s.written, s.elapsed)
            }
            Err(e) => {
                tracing::error!(block=block.index, lo, hi, error=%format!("{e:#}"), "window query failed, skipping");
                (0, Duration::ZERO)
            }
        }
    }

    /// Build a reference collection of random posts shadowing the time distribution of
    /// a historic backup: one window per `block_size` historic posts, `posts_per_block`
    /// posts sampled per window, into `ref_col_<block_size>_<now>.jsonl`.
    ///
    /// The trailing partial window asks for `min(posts_per_block, posts in the window)`,
    /// so it never samples more densely than a full window does.
    pub fn obtain_reference_collection(&self, historic: &Path, cfg: &ReferenceConfig) -> Result<ReferenceSummary> {
        let path = self.backup_path(&format!("ref_col_{}_{}.jsonl", cfg.block_size, now_epoch()))?;
        let mut out = NdjsonWriter::append(&path, self.opts.write_buffer_bytes)
            .with_context(|| format!("open {}", path.display()))?;
        let mut rdr = NdjsonReader::open(historic, self.opts.read_buffer_bytes)
            .with_context(|| format!("open {}", historic.display()))?;

        tracing::info!(historic=%historic.display(), block_size=cfg.block_size, posts_per_block=cfg.posts_per_block, "generating reference collection");
        let pb = ProgressScope::spinner(self.opts.progress, "reference windows");
        let mut gen = BlockGenerator::new(BlockConfig { block_size: cfg.block_size, cutoff: cfg.cutoff });
        let (mut written, mut malformed) = (0u64, 0u64);
        let mut query_time = Duration::ZERO;

        rdr.for_each_line(|line| {
            let ts = serde_json::from_str::<Value>(line).ok().and_then(|v| created_utc(&v));
            let Some(ts) = ts else {
                malformed += 1;
                tracing::error!("historic line without a readable created_utc, skipping");
                return Ok(true);
            };
            if let Some(block) = gen.push(ts) {
                let (n, t) = self.sample_block(&block, cfg.posts_per_block, cfg, &mut out);
                written += n;
                query_time += t;
                pb.inc(1);
                pb.set_message(format!("reference windows ({written} posts)"));
            }
            Ok(true)
        })?;

        let (tail, stats) = gen.finish();
        if let Some(block) = tail {
            let size = cfg.posts_per_block.min(block.posts);
            let (n, t) = self.sample_block(&block, size, cfg, &mut out);
            written += n;
            query_time += t;
            pb.inc(1);
        }
        out.finish()?;
        pb.finish("done");

        let summary = ReferenceSummary {
            path,
            windows: stats.blocks,
            written,
            skipped: stats.skipped,
            malformed,
            initial: stats.initial,
            last_end: stats.last_end,
            elapsed: query_time,
        };
        tracing::info!(
            "generated documents between {} and {} with {} documents per interval (size {})",
            summary.initial.map(to_iso).unwrap_or_default(),
            summary.last_end.map(to_iso).unwrap_or_default(),
            cfg.posts_per_block,
            cfg.block_size
        );
        tracing::info!(
            "{} documents skipped because newer than {}, {} documents generated in {:.3} seconds",
            summary.skipped,
            to_iso(cfg.cutoff),
            summary.written,
            summary.elapsed.as_secs_f64()
        );
        if stats.dropped_tail > 0 {
            tracing::info!(posts=stats.dropped_tail, "trailing partial window not sampled (starts after cutoff)");
        }
        Ok(summary)
    }

    /// For every scale query: probe for the most recent match, then write up to
    /// `max_posts_per_query` older matches to `<query>_<scale>_<now>.jsonl`.
    pub fn extract_posts_from_scales(&self, scales: &ScaleQueries, max_posts_per_query: usize) -> Result<ScalesSummary> {
        let total = scales.total_queries();
        let pb = ProgressScope::count(self.opts.progress, "scale queries", total as u64);
        let started = Instant::now();
        let mut summary = ScalesSummary::default();

        for (i, sq) in scales.iter().enumerate() {
            let t0 = Instant::now();
            tracing::debug!(query=%sq.query, scale=%sq.scale, "performing query");

            let mut most_recent: Option<i64> = None;
            let probe = SubmissionQuery::new().query(&sq.query).sort(SortOrder::Desc).limit(1);
            let probed = self.source.search_submissions(&probe, &mut |raw| {
                most_recent = convert_response(&raw).and_then(|p| created_utc(&Value::Object(p)));
                Ok(false)
            });
            if let Err(e) = probed {
                tracing::error!(query=%sq.query, error=%format!("{e:#}"), "probe query failed");
            }
            let Some(most_recent) = most_recent else {
                summary.failed_queries.push(format!("No results found for query: '{}'", sq.query));
                pb.inc(1);
                continue;
            };

            let fetched_at = now_epoch();
            let name = format!("{}_{}_{}.jsonl", file_safe(&sq.query), file_safe(&sq.scale), fetched_at);
            let path = self.backup_path(&name)?;
            let mut w = NdjsonWriter::append(&path, self.opts.write_buffer_bytes)
                .with_context(|| format!("open {}", path.display()))?;
            let parameters = json!({
                "query": sq.query,
                "scale": sq.scale,
                "thematic": true,
                "related": sq.related,
            });

            let mut ok_docs = 0u64;
            let query = SubmissionQuery::new().query(&sq.query).before(most_recent).sort(SortOrder::Desc).limit(max_posts_per_query);
            let res = self.source.search_submissions(&query, &mut |raw| {
                if let Some(mut post) = convert_response(&raw) {
                    post.insert("parameters".into(), parameters.clone());
                    post.insert("timestamp".into(), Value::String(to_iso(fetched_at)));
                    w.write_record(&post)?;
                    ok_docs += 1;
                }
                Ok(true)
            });
            w.finish()?;
            if let Err(e) = res {
                tracing::error!(query=%sq.query, error=%format!("{e:#}"), "query failed part-way");
                summary.failed_queries.push(format!("Query failed: '{}'", sq.query));
            }

            tracing::debug!("{} documents successfully saved (expected {})", ok_docs, max_posts_per_query);
            tracing::debug!("query '{}' - {} of {} performed in {:.3} seconds", sq.query, i + 1, total, t0.elapsed().as_secs_f64());
            summary.written += ok_docs;
            summary.files.push(path);
            pb.inc(1);
        }
        pb.finish("done");

        for e in &summary.failed_queries {
            tracing::error!("{e}");
        }
        summary.elapsed = started.elapsed();
        tracing::info!("all {} queries performed in a total of {:.3} seconds", total, summary.elapsed.as_secs_f64());
        Ok(summary)
    }
}

/// Query/scale text made safe for a file name: spaces become `-`, path separators `_`.
fn file_safe(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            ' ' => '-',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
