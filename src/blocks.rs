//! Time-window partitioning of a sorted post stream.
//!
//! The generator is fed one `created_utc` at a time. The first post at or before the
//! cutoff opens a window; every `block_size` further posts close it at the closing
//! post's timestamp, which also opens the next window. Windows therefore share their
//! boundaries and tile the accepted span without gaps or overlap.

/// Parameters of a block scan.
#[derive(Clone, Copy, Debug)]
pub struct BlockConfig {
    pub block_size: usize,
    /// Leading posts newer than this are skipped; the trailing partial block is only
    /// flushed when its start is strictly older.
    pub cutoff: i64,
}

/// A window of the historic stream. `start` and `end` are in stream order, so for a
/// newest-first file `start > end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    pub start: i64,
    pub end: i64,
    /// Posts after `start` up to and including `end`.
    pub posts: usize,
    pub partial: bool,
}

impl Block {
    /// `(low, high)` bounds regardless of stream direction.
    pub fn interval(&self) -> (i64, i64) {
        (self.start.min(self.end), self.start.max(self.end))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub blocks: usize,
    /// Leading posts newer than the cutoff.
    pub skipped: u64,
    /// Timestamp of the post that opened the first window.
    pub initial: Option<i64>,
    /// Closing timestamp of the last window emitted.
    pub last_end: Option<i64>,
    /// Trailing posts that formed no window (partial block not flushed).
    pub dropped_tail: usize,
}

pub struct BlockGenerator {
    cfg: BlockConfig,
    start: Option<i64>,
    count: usize,
    last_ts: Option<i64>,
    stats: BlockStats,
}

impl BlockGenerator {
    pub fn new(cfg: BlockConfig) -> Self {
        let cfg = BlockConfig { block_size: cfg.block_size.max(1), ..cfg };
        Self { cfg, start: None, count: 0, last_ts: None, stats: BlockStats::default() }
    }

    /// Feed the next post timestamp. Returns a block when this post closes one.
    pub fn push(&mut self, ts: i64) -> Option<Block> {
        let Some(start) = self.start else {
            if ts > self.cfg.cutoff {
                self.stats.skipped += 1;
            } else {
                self.start = Some(ts);
                self.stats.initial = Some(ts);
                self.last_ts = Some(ts);
            }
            return None;
        };

        self.count += 1;
        self.last_ts = Some(ts);
        if self.count < self.cfg.block_size {
            return None;
        }

        let block = Block { index: self.stats.blocks, start, end: ts, posts: self.count, partial: false };
        self.stats.blocks += 1;
        self.stats.last_end = Some(ts);
        self.start = Some(ts);
        self.count = 0;
        Some(block)
    }

    /// End of stream: the trailing partial block, if any and if it predates the cutoff.
    pub fn finish(mut self) -> (Option<Block>, BlockStats) {
        let tail = match (self.start, self.last_ts) {
            (Some(start), Some(last)) if self.count > 0 => {
                if start < self.cfg.cutoff {
                    let b = Block { index: self.stats.blocks, start, end: last, posts: self.count, partial: true };
                    self.stats.blocks += 1;
                    self.stats.last_end = Some(last);
                    Some(b)
                } else {
                    self.stats.dropped_tail = self.count;
                    None
                }
            }
            _ => None,
        };
        (tail, self.stats)
    }
}

/// All blocks of a timestamp sequence, including the flushed partial tail.
pub fn plan_blocks(timestamps: impl IntoIterator<Item = i64>, cfg: BlockConfig) -> (Vec<Block>, BlockStats) {
    let mut gen = BlockGenerator::new(cfg);
    let mut blocks: Vec<Block> = timestamps.into_iter().filter_map(|ts| gen.push(ts)).collect();
    let (tail, stats) = gen.finish();
    blocks.extend(tail);
    (blocks, stats)
}
