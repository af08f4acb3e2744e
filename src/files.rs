//! File manager: line counting, clearing, sorting, merging and directory helpers
//! for the JSONL backups. Sort and merge rewrite whole files; nothing is edited in place.

use crate::key_extractor::KeyExtractor;
use crate::ndjson::{NdjsonReader, NdjsonWriter};
use crate::util::{create_with_backoff, remove_with_backoff};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const BUF: usize = 256 * 1024;

fn inprogress_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "out".into());
    path.with_file_name(format!("{name}.inprogress"))
}

fn read_all_lines(path: &Path) -> Result<Vec<String>> {
    let mut rdr = NdjsonReader::open(path, BUF).with_context(|| format!("open {}", path.display()))?;
    let mut lines = Vec::new();
    let mut buf = String::new();
    while rdr.read_line(&mut buf)? > 0 {
        lines.push(buf.clone());
    }
    Ok(lines)
}

fn rewrite_lines(path: &Path, lines: &[String]) -> Result<()> {
    let tmp = inprogress_path(path);
    let mut w = NdjsonWriter::create(&tmp, BUF).with_context(|| format!("create {}", tmp.display()))?;
    for l in lines {
        w.write_line(l)?;
    }
    w.finish_atomic(path)
}

/// Number of lines in a file (0 for an empty file).
pub fn count_lines(path: &Path) -> Result<u64> {
    let mut rdr = NdjsonReader::open(path, BUF).with_context(|| format!("open {}", path.display()))?;
    let mut buf = String::new();
    let mut n = 0u64;
    while rdr.read_line(&mut buf)? > 0 {
        n += 1;
    }
    Ok(n)
}

/// Truncate a file to zero length, creating it if missing.
pub fn clear_file(path: &Path) -> Result<()> {
    create_with_backoff(path, 16, 50).with_context(|| format!("clear {}", path.display()))?;
    Ok(())
}

/// Sort a file's lines lexicographically.
pub fn sort_file(path: &Path) -> Result<()> {
    let mut lines = read_all_lines(path)?;
    lines.sort();
    rewrite_lines(path, &lines)
}

/// Stable sort of a JSONL file by a record key. Lines without a key (or not JSON)
/// keep their relative order at the end.
pub fn sort_file_by_key(path: &Path, key: &KeyExtractor) -> Result<()> {
    let lines = read_all_lines(path)?;
    let mut keyed = Vec::with_capacity(lines.len());
    let mut unkeyed = Vec::new();
    for line in lines {
        if line.trim().is_empty() { continue; }
        match serde_json::from_str::<Value>(&line).ok().and_then(|v| key.key_from_value(&v)) {
            Some(k) => keyed.push((k, line)),
            None => {
                tracing::warn!(path=%path.display(), "record without sort key kept at the end");
                unkeyed.push(line);
            }
        }
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    let sorted: Vec<String> = keyed.into_iter().map(|(_, l)| l).chain(unkeyed).collect();
    rewrite_lines(path, &sorted)
}

/// True when `path` is a non-empty file whose last byte is not `\n`.
fn lacks_final_newline(path: &Path) -> io::Result<bool> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if f.metadata()?.len() == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Append every line of `src` to `dest` in order. Returns `false` (after logging)
/// when either file cannot be read or written.
pub fn merge_files(dest: &Path, src: &Path) -> bool {
    let res = (|| -> Result<u64> {
        let mut rdr = NdjsonReader::open(src, BUF).with_context(|| format!("open {}", src.display()))?;
        let unterminated = lacks_final_newline(dest).with_context(|| format!("inspect {}", dest.display()))?;
        let mut w = NdjsonWriter::append(dest, BUF).with_context(|| format!("open for append {}", dest.display()))?;
        if unterminated {
            w.write_line("")?;
        }
        let mut buf = String::new();
        let mut n = 0u64;
        while rdr.read_line(&mut buf)? > 0 {
            w.write_line(&buf)?;
            n += 1;
        }
        w.finish()?;
        Ok(n)
    })();
    match res {
        Ok(n) => {
            tracing::debug!(dest=%dest.display(), src=%src.display(), lines=n, "merged");
            true
        }
        Err(e) => {
            tracing::error!(dest=%dest.display(), src=%src.display(), error=%format!("{e:#}"), "error merging files, skipping");
            false
        }
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn files_in_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read dir {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    out.sort();
    Ok(out)
}

/// Delete a file; failures are logged, not returned.
pub fn remove_file(path: &Path) -> bool {
    match remove_with_backoff(path, 4, 50) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(path=%path.display(), error=%format!("{e:#}"), "file cannot be removed");
            false
        }
    }
}

/// Remove every regular file directly inside `dir`. Returns how many were removed.
pub fn clear_dir(dir: &Path) -> Result<usize> {
    let mut n = 0;
    for p in files_in_dir(dir)? {
        remove_with_backoff(&p, 4, 50)?;
        n += 1;
    }
    Ok(n)
}

/// Create `base/sub`, creating `base` as needed.
pub fn create_subdir(base: &Path, sub: &str) -> Result<PathBuf> {
    let dir = base.join(sub);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// For every `<dir>/<subdir>/<file>`, write a shortened copy `<stem>_s.<ext>` next to it.
/// Files whose name contains `training` keep `size_training` lines; the rest keep
/// `size_training * (1 - split_prop)` lines. Returns the files written.
pub fn cut_datasets(dir: &Path, size_training: usize, split_prop: f64) -> Result<Vec<PathBuf>> {
    if !(0.0..=1.0).contains(&split_prop) {
        return Err(anyhow!("split proportion must be within 0..=1, got {split_prop}"));
    }
    let test_size = (size_training as f64 * (1.0 - split_prop)).floor() as usize;

    let mut inputs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| !p.file_stem().map(|s| s.to_string_lossy().ends_with("_s")).unwrap_or(false))
        .collect();
    inputs.sort();

    let mut written = Vec::with_capacity(inputs.len());
    for input in inputs {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let name = match input.extension() {
            Some(ext) => format!("{stem}_s.{}", ext.to_string_lossy()),
            None => format!("{stem}_s"),
        };
        let out_path = input.with_file_name(name);
        let limit = if stem.contains("training") { size_training } else { test_size };

        let mut rdr = NdjsonReader::open(&input, BUF).with_context(|| format!("open {}", input.display()))?;
        let f = create_with_backoff(&out_path, 16, 50).with_context(|| format!("create {}", out_path.display()))?;
        let mut w = BufWriter::with_capacity(BUF, f);
        let mut buf = String::new();
        let mut n = 0usize;
        while n < limit && rdr.read_line(&mut buf)? > 0 {
            w.write_all(buf.as_bytes())?;
            w.write_all(b"\n")?;
            n += 1;
        }
        w.flush()?;
        tracing::debug!(input=%input.display(), output=%out_path.display(), lines=n, "dataset cut");
        written.push(out_path);
    }
    Ok(written)
}
