use crate::util::{append_with_backoff, create_with_backoff, open_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use zstd::stream::read::Decoder as ZstdDecoder;

/// NDJSON reader with buffering and `\r?\n` trimming.
/// `.zst` and `.gz` inputs are decoded transparently (archive dumps come compressed).
pub struct NdjsonReader {
    rdr: Box<dyn BufRead>,
}

impl NdjsonReader {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path, 16, 50)?;
        let cap = buf_bytes.max(8 * 1024);
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let rdr: Box<dyn BufRead> = match ext.as_str() {
            "zst" => {
                let mut dec = ZstdDecoder::new(f)?;
                dec.window_log_max(31)?;
                Box::new(BufReader::with_capacity(cap, dec))
            }
            "gz" => Box::new(BufReader::with_capacity(cap, GzDecoder::new(f))),
            _ => Box::new(BufReader::with_capacity(cap, f)),
        };
        Ok(Self { rdr })
    }

    /// Read the next line into `buf`. Returns the number of bytes read (0 on EOF).
    /// Strips trailing `\r?\n`; blank lines come back as empty strings.
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        buf.clear();
        let n = self.rdr.read_line(buf)?;
        if n == 0 { return Ok(0); }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') { buf.pop(); }
        }
        Ok(n)
    }

    /// Call `f` for every non-blank line, stopping early when it returns `Ok(false)`.
    pub fn for_each_line(&mut self, mut f: impl FnMut(&str) -> Result<bool>) -> Result<()> {
        let mut buf = String::with_capacity(16 * 1024);
        while self.read_line(&mut buf)? > 0 {
            if buf.trim().is_empty() { continue; }
            if !f(&buf)? { break; }
        }
        Ok(())
    }
}

/// Buffered NDJSON writer. Each `write_line` appends the `\n` terminator.
pub struct NdjsonWriter {
    path: PathBuf,
    w: Option<BufWriter<File>>,
}

impl NdjsonWriter {
    /// Truncating writer.
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path, 16, 50)?;
        Ok(Self { path: path.to_path_buf(), w: Some(BufWriter::with_capacity(buf_bytes.max(8 * 1024), f)) })
    }

    /// Appending writer; backups are append-only logs.
    pub fn append(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let f = append_with_backoff(path, 16, 50)?;
        Ok(Self { path: path.to_path_buf(), w: Some(BufWriter::with_capacity(buf_bytes.max(8 * 1024), f)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn write_line(&mut self, s: &str) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            w.write_all(s.as_bytes())?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn write_record<T: Serialize + ?Sized>(&mut self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.write_line(&line).with_context(|| format!("write {}", self.path.display()))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            w.flush()?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush()?;
        }
        Ok(())
    }

    /// Flushes and promotes the temp file to `final_path`.
    pub fn finish_atomic(mut self, final_path: &Path) -> Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush().with_context(|| format!("flush {}", self.path.display()))?;
        }
        replace_file_atomic_backoff(&self.path, final_path)
    }
}

/// Read every line of a JSONL file as `T`. Lines that fail to parse are logged and skipped.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = NdjsonReader::open(path, 256 * 1024).with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    let mut line_no = 0usize;
    rdr.for_each_line(|line| {
        line_no += 1;
        match serde_json::from_str::<T>(line) {
            Ok(v) => out.push(v),
            Err(e) => tracing::error!(path=%path.display(), line=line_no, error=%e, "skipping malformed JSON line"),
        }
        Ok(true)
    })?;
    Ok(out)
}

/// Write `records` to `path`, replacing any previous content.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = NdjsonWriter::create(path, 256 * 1024).with_context(|| format!("create {}", path.display()))?;
    for r in records {
        w.write_record(r)?;
    }
    w.finish()?;
    Ok(())
}

/// Append one record to `path` (created if missing).
pub fn append_record<T: Serialize + ?Sized>(path: &Path, record: &T) -> Result<()> {
    let mut w = NdjsonWriter::append(path, 8 * 1024).with_context(|| format!("open for append {}", path.display()))?;
    w.write_record(record)?;
    w.finish()?;
    Ok(())
}
