use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sort direction for time-ordered API queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct HarvestOptions {
    pub api_url: String,              // historical search API root, no trailing slash
    pub search_url: String,           // search engine root, no trailing slash
    pub backups_dir: PathBuf,         // raw post backups (*.jsonl)
    pub data_dir: PathBuf,            // author lists, samples, exports
    pub page_size: usize,             // posts requested per API page
    pub request_timeout: Duration,    // per-request HTTP timeout
    pub request_delay: Duration,      // pause between API pages
    pub progress: bool,               // show progress bars

    // IO tuning
    pub read_buffer_bytes: usize,     // BufReader capacity
    pub write_buffer_bytes: usize,    // BufWriter capacity
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            api_url: "https://api.pushshift.io".to_string(),
            search_url: "http://localhost:9200".to_string(),
            backups_dir: PathBuf::from("./backups"),
            data_dir: PathBuf::from("./data"),
            page_size: 100,
            request_timeout: Duration::from_secs(60),
            request_delay: Duration::from_millis(0),
            progress: true,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl HarvestOptions {
    /// Defaults overridden by `PSH_API_URL`, `PSH_SEARCH_URL`, `PSH_BACKUPS_DIR`
    /// and `PSH_DATA_DIR` when set and non-empty.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(v) = env_non_empty("PSH_API_URL") {
            opts = opts.with_api_url(v);
        }
        if let Some(v) = env_non_empty("PSH_SEARCH_URL") {
            opts = opts.with_search_url(v);
        }
        if let Some(v) = env_non_empty("PSH_BACKUPS_DIR") {
            opts = opts.with_backups_dir(v);
        }
        if let Some(v) = env_non_empty("PSH_DATA_DIR") {
            opts = opts.with_data_dir(v);
        }
        opts
    }

    pub fn with_api_url(mut self, url: impl AsRef<str>) -> Self {
        self.api_url = url.as_ref().trim().trim_end_matches('/').to_string();
        self
    }
    pub fn with_search_url(mut self, url: impl AsRef<str>) -> Self {
        self.search_url = url.as_ref().trim().trim_end_matches('/').to_string();
        self
    }
    pub fn with_backups_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.backups_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.clamp(1, 1000);
        self
    }
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    // IO buffers tuning
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
