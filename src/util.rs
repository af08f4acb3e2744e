use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

// -------- logging --------

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Console logging filtered by `RUST_LOG` (default `info`). Safe to call repeatedly.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter()).try_init();
    });
}

/// Console logging plus a plain-text copy appended to `<logs_dir>/harvest.log`.
/// Falls back to console-only when the log file cannot be opened.
pub fn init_tracing_with_log_file(logs_dir: &Path) {
    INIT_ONCE.call_once(|| {
        let file = fs::create_dir_all(logs_dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(logs_dir.join("harvest.log")));
        match file {
            Ok(f) => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter())
                    .with(fmt::layer().with_writer(io::stderr))
                    .with(fmt::layer().with_ansi(false).with_file(true).with_line_number(true).with_writer(Mutex::new(f)))
                    .try_init();
            }
            Err(e) => {
                let _ = tracing_subscriber::fmt().with_env_filter(env_filter()).try_init();
                tracing::warn!(dir=%logs_dir.display(), error=%e, "log file unavailable, logging to console only");
            }
        }
    });
}

// -------- author normalization --------

#[inline]
pub fn normalize_str(s: &str) -> String {
    let s = s.trim().to_lowercase();
    if let Some(rest) = s.strip_prefix("r/").or_else(|| s.strip_prefix("u/")) { rest.to_string() } else { s }
}

/// `[deleted]`, `[removed]` and empty names are placeholders, not accounts.
pub fn is_pseudo_user(name: &str) -> bool {
    let n = name.trim();
    n.is_empty() || n.eq_ignore_ascii_case("[deleted]") || n.eq_ignore_ascii_case("[removed]")
}

/// Lowercase list of high-volume bot/service accounts that should never enter a sample.
pub fn default_bot_authors() -> Vec<String> {
    let defaults = [
        "automoderator",
        "autowikibot",
        "imguralbumbot",
        "remindmebot",
        "totesmessenger",
        "gifvbot",
        "helper-bot",
        "video_link_bot",
    ];
    let mut v: Vec<String> = defaults.iter().map(|s| normalize_str(s)).collect();
    v.sort();
    v.dedup();
    v
}

// -------- robust open/create with backoff --------

/// Transient errors seen on Windows with AV/backup filter drivers or sharing violations.
fn is_retriable_io_error(e: &io::Error) -> bool {
    // 5 access denied, 32 sharing violation, 33 lock violation, 1224 user-mapped section
    matches!(e.raw_os_error(), Some(5) | Some(32) | Some(33) | Some(1224))
}

fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut last_err: Option<io::Error> = None;
    for i in 0..tries.max(1) {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) => {
                last_err = Some(e);
                sleep(Duration::from_millis(delay_ms.saturating_mul((i + 1) as u64)));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "operation failed after retries")))
}

pub fn open_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::open(path))
}

pub fn create_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || File::create(path))
}

/// Open for appending, creating the file (not its parent) when missing.
pub fn append_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> io::Result<File> {
    with_backoff(tries, delay_ms, || OpenOptions::new().create(true).append(true).open(path))
}

/// Succeeds if the file doesn't exist.
pub fn remove_with_backoff(path: &Path, tries: usize, delay_ms: u64) -> Result<()> {
    match with_backoff(tries, delay_ms, || fs::remove_file(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Replace `dest` with `tmp`. If rename fails (e.g. across devices), fall back to copy+remove.
pub fn replace_file_atomic_backoff(tmp: &Path, dest: &Path) -> Result<()> {
    let tries = 20usize;
    let delay_ms = 50u64;
    if dest.exists() {
        remove_with_backoff(dest, tries, delay_ms)?;
    }
    if with_backoff(tries, delay_ms, || fs::rename(tmp, dest)).is_ok() {
        return Ok(());
    }
    with_backoff(tries, delay_ms, || fs::copy(tmp, dest))
        .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
    remove_with_backoff(tmp, tries, delay_ms)
}
