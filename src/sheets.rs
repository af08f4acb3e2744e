//! Tabular I/O: scale/query sheets in, flat exports of samples out.
//! Workbooks are handled through their CSV export.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One search query belonging to a scale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScaleQuery {
    pub scale: String,
    pub query: String,
    pub related: Vec<String>,
}

/// Queries grouped by scale, in sheet order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScaleQueries {
    pub scales: Vec<(String, Vec<ScaleQuery>)>,
}

impl ScaleQueries {
    pub fn total_queries(&self) -> usize {
        self.scales.iter().map(|(_, q)| q.len()).sum()
    }
    pub fn iter(&self) -> impl Iterator<Item = &ScaleQuery> {
        self.scales.iter().flat_map(|(_, q)| q.iter())
    }
    fn push(&mut self, q: ScaleQuery) {
        match self.scales.iter_mut().find(|(s, _)| *s == q.scale) {
            Some((_, list)) => list.push(q),
            None => self.scales.push((q.scale.clone(), vec![q])),
        }
    }
}

/// Where things live in the sheet. Rows and columns are 1-based, as in a spreadsheet.
#[derive(Clone, Copy, Debug)]
pub struct SheetLayout {
    pub first_row: usize,
    pub scale_col: usize,
    pub query_col: usize,
    pub related_col: Option<usize>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        // rows 5.., scale names in B, queries in D, related scales in E
        Self { first_row: 5, scale_col: 2, query_col: 4, related_col: Some(5) }
    }
}

fn cell(rec: &StringRecord, col: usize) -> Option<&str> {
    col.checked_sub(1).and_then(|i| rec.get(i)).map(str::trim).filter(|s| !s.is_empty())
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Read scales and their queries.
/// An empty scale cell continues the previous scale (merged cells); a query cell may
/// hold several comma-separated queries.
pub fn read_scale_queries(path: &Path, layout: SheetLayout) -> Result<ScaleQueries> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;

    let mut out = ScaleQueries::default();
    let mut current: Option<String> = None;

    for (i, rec) in rdr.records().enumerate() {
        let row = i + 1;
        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(path=%path.display(), row, error=%e, "unreadable sheet row, skipping");
                continue;
            }
        };
        if row < layout.first_row { continue; }

        if let Some(scale) = cell(&rec, layout.scale_col) {
            current = Some(scale.to_string());
        }
        let Some(query_cell) = cell(&rec, layout.query_col) else { continue };
        let Some(scale) = current.clone() else {
            tracing::warn!(path=%path.display(), row, "query without a scale, skipping");
            continue;
        };
        let related = layout.related_col.and_then(|c| cell(&rec, c)).map(split_list).unwrap_or_default();

        for query in split_list(query_cell) {
            out.push(ScaleQuery { scale: scale.clone(), query, related: related.clone() });
        }
    }
    Ok(out)
}

/// Write records as CSV with a header row derived from the struct fields.
pub fn write_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for r in records {
        w.serialize(r)?;
    }
    w.flush()?;
    Ok(())
}
