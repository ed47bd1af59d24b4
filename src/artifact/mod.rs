// src/artifact/mod.rs
//
// Delimited-text artifacts: UTF-8 with a byte-order mark, comma separated,
// minimal quoting, one header row.

pub mod merge;
pub mod summary;

use anyhow::{Context, Result};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{debug, info, warn};

use crate::process::RawTable;
use crate::schema::{CanonicalRecord, Column};

pub use merge::{merge, MergeOptions, MergeReport};
pub use summary::{write_summary, Summary};

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncate, then write BOM + header + rows.
    Replace,
    /// Add rows to an existing artifact, no header.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { rows: usize },
    Skipped,
}

impl WriteOutcome {
    pub fn rows(&self) -> usize {
        match self {
            WriteOutcome::Written { rows } => *rows,
            WriteOutcome::Skipped => 0,
        }
    }
}

/// Write canonical records to `path`. An empty slice is logged and skipped so
/// an existing artifact is never replaced by an empty one.
pub fn write_records<P: AsRef<Path>>(
    records: &[CanonicalRecord],
    path: P,
    mode: WriteMode,
) -> Result<WriteOutcome> {
    let path = path.as_ref();
    if records.is_empty() {
        warn!(path = %path.display(), "no records to write; skipping");
        return Ok(WriteOutcome::Skipped);
    }
    write_rows(
        path,
        &Column::labels(),
        records.iter().map(CanonicalRecord::to_row),
        mode,
    )
}

/// Replace-mode write that always produces a valid file, header-only when
/// `records` is empty. Used for normalized CSV downloads.
pub fn write_table<P: AsRef<Path>>(records: &[CanonicalRecord], path: P) -> Result<WriteOutcome> {
    write_rows(
        path.as_ref(),
        &Column::labels(),
        records.iter().map(CanonicalRecord::to_row),
        WriteMode::Replace,
    )
}

/// Replace-mode write of an arbitrary table (merged artifacts).
pub fn write_raw_table<P: AsRef<Path>>(table: &RawTable, path: P) -> Result<WriteOutcome> {
    let path = path.as_ref();
    if table.rows.is_empty() {
        warn!(path = %path.display(), "table has no rows; skipping");
        return Ok(WriteOutcome::Skipped);
    }
    let headers: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    let rows = table.rows.iter().map(|row| {
        row.iter()
            .map(|cell| cell.clone().unwrap_or_default())
            .collect::<Vec<_>>()
    });
    write_rows(path, &headers, rows, WriteMode::Replace)
}

fn write_rows<I>(path: &Path, headers: &[&str], rows: I, mode: WriteMode) -> Result<WriteOutcome>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let mode = match mode {
        WriteMode::Append if !path.exists() => {
            warn!(path = %path.display(), "append target missing; writing a fresh artifact");
            WriteMode::Replace
        }
        WriteMode::Append => {
            check_header(path, headers)?;
            WriteMode::Append
        }
        m => m,
    };

    let file = match mode {
        WriteMode::Replace => {
            File::create(path).with_context(|| format!("creating {}", path.display()))?
        }
        WriteMode::Append => OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("opening {} for append", path.display()))?,
    };
    let mut out = BufWriter::new(file);
    if mode == WriteMode::Replace {
        out.write_all(UTF8_BOM)?;
    }

    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(out);
    if mode == WriteMode::Replace {
        wtr.write_record(headers)
            .with_context(|| format!("writing header to {}", path.display()))?;
    }

    let mut count = 0usize;
    for row in rows {
        wtr.write_record(&row)
            .with_context(|| format!("writing row {} to {}", count, path.display()))?;
        count += 1;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;

    info!(path = %path.display(), rows = count, ?mode, "wrote artifact");
    Ok(WriteOutcome::Written { rows: count })
}

fn check_header(path: &Path, headers: &[&str]) -> Result<()> {
    let existing = read_artifact(path)?;
    if existing.headers != headers {
        warn!(
            path = %path.display(),
            existing = ?existing.headers,
            "appending to an artifact with a different header"
        );
    }
    Ok(())
}

/// Read an artifact back as a table. A leading BOM is ignored, empty cells
/// become `None`, short rows are padded and rows that fail to parse are
/// skipped.
pub fn read_artifact<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let data = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut table = RawTable::new(headers);
    let width = table.headers.len();

    for (idx, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %path.display(), row = idx, error = %e, "skipping unreadable row");
                continue;
            }
        };
        if record.len() > width {
            debug!(path = %path.display(), row = idx, "row wider than header; truncating");
        }
        let mut row: Vec<Option<String>> = record
            .iter()
            .take(width)
            .map(|cell| Some(cell.to_string()).filter(|c| !c.is_empty()))
            .collect();
        row.resize(width, None);
        table.rows.push(row);
    }
    Ok(table)
}
