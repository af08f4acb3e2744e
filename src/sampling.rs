//! Systematic sampling over a sorted list.

use crate::authors::{sort_by_acc_id, AuthorRecord};
use crate::ndjson::{read_records, write_records};
use crate::sheets::write_csv;
use anyhow::Result;
use rand::Rng;
use std::path::Path;

/// Indices selected from `n` items: stride `k = n / sample_size`, random offset in
/// `[0, k)`, then `offset + i*k` floored, for `i in 0..sample_size`.
/// Strictly increasing, so no index repeats.
pub fn systematic_indices<R: Rng>(n: usize, sample_size: usize, rng: &mut R) -> Vec<usize> {
    if n == 0 || sample_size == 0 {
        return Vec::new();
    }
    if sample_size >= n {
        return (0..n).collect();
    }
    let k = n as f64 / sample_size as f64;
    let offset = rng.gen::<f64>() * k;
    (0..sample_size)
        .map(|i| ((offset + i as f64 * k).floor() as usize).min(n - 1))
        .collect()
}

pub fn systematic_sample<T: Clone, R: Rng>(items: &[T], sample_size: usize, rng: &mut R) -> Vec<T> {
    systematic_indices(items.len(), sample_size, rng).into_iter().map(|i| items[i].clone()).collect()
}

/// Load an authors-info JSONL, sample it (sorted by `acc_id`), and write the selection
/// to `out_jsonl` plus a CSV mirror at `out_csv`.
pub fn sample_authors_file<R: Rng>(
    authors_info: &Path,
    sample_size: usize,
    out_jsonl: &Path,
    out_csv: Option<&Path>,
    rng: &mut R,
) -> Result<Vec<AuthorRecord>> {
    tracing::info!("starting systematic sampling");
    let mut authors: Vec<AuthorRecord> = read_records(authors_info)?;
    sort_by_acc_id(&mut authors);
    tracing::info!("total amount of authors in file: {}", authors.len());

    let selected = systematic_sample(&authors, sample_size, rng);
    write_records(out_jsonl, &selected)?;
    if let Some(csv) = out_csv {
        write_csv(csv, &selected)?;
    }
    tracing::info!(selected=selected.len(), "sample generated");
    Ok(selected)
}
