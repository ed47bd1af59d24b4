// src/artifact/merge.rs

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{read_artifact, write_raw_table, WriteOutcome};
use crate::process::RawTable;

/// Header names a spreadsheet-style reader invents for columns without one.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Unnamed(: ?\d+)?|Column\d+)?$").expect("placeholder regex"));

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MergeOptions {
    /// Drop columns that are empty in every row of a table, and placeholder
    /// columns, before concatenating.
    pub drop_empty_columns: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            drop_empty_columns: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub inputs_read: usize,
    pub inputs_skipped: Vec<PathBuf>,
    pub columns: Vec<String>,
    pub outcome: WriteOutcome,
}

pub fn is_placeholder(name: &str) -> bool {
    PLACEHOLDER.is_match(name.trim())
}

/// Remove all-empty and placeholder columns from one table.
pub fn drop_empty_columns(table: &RawTable) -> RawTable {
    let keep: Vec<usize> = (0..table.headers.len())
        .filter(|&i| !is_placeholder(&table.headers[i]))
        .filter(|&i| {
            table
                .rows
                .iter()
                .any(|row| row.get(i).and_then(|v| v.as_deref()).is_some_and(|v| !v.trim().is_empty()))
        })
        .collect();
    table.select(&keep)
}

/// Concatenate tables in order under the union of their columns. Columns a
/// table lacks are null for its rows.
pub fn concat_tables(tables: &[RawTable]) -> RawTable {
    let mut headers: Vec<String> = Vec::new();
    for t in tables {
        for h in &t.headers {
            if !headers.contains(h) {
                headers.push(h.clone());
            }
        }
    }

    let mut out = RawTable::new(headers);
    for t in tables {
        let positions: Vec<Option<usize>> =
            out.headers.iter().map(|h| t.column_index(h)).collect();
        for row in &t.rows {
            out.rows.push(
                positions
                    .iter()
                    .map(|pos| pos.and_then(|i| row.get(i).cloned().flatten()))
                    .collect(),
            );
        }
    }
    out
}

/// Merge previously written artifacts into `output`.
///
/// Inputs that cannot be read are logged and skipped. Tables that disagree on
/// columns are still merged; the gaps are null.
#[tracing::instrument(level = "info", skip(paths, output, options), fields(output = %output.as_ref().display()))]
pub fn merge<P, Q>(paths: &[P], output: Q, options: &MergeOptions) -> Result<MergeReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut tables = Vec::with_capacity(paths.len());
    let mut inputs_skipped = Vec::new();

    for p in paths {
        let p = p.as_ref();
        match read_artifact(p) {
            Ok(t) => {
                let t = if options.drop_empty_columns {
                    drop_empty_columns(&t)
                } else {
                    t
                };
                info!(input = %p.display(), rows = t.rows.len(), columns = t.headers.len(), "read merge input");
                tables.push(t);
            }
            Err(e) => {
                warn!(input = %p.display(), error = %e, "skipping merge input");
                inputs_skipped.push(p.to_path_buf());
            }
        }
    }

    if tables.len() > 1 {
        let first = &tables[0].headers;
        if tables.iter().any(|t| &t.headers != first) {
            warn!("merge inputs disagree on columns; missing values will be empty");
        }
    }

    let merged = concat_tables(&tables);
    let outcome = write_raw_table(&merged, output.as_ref())?;

    Ok(MergeReport {
        inputs_read: tables.len(),
        inputs_skipped,
        columns: merged.headers,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{write_records, WriteMode, UTF8_BOM};
    use crate::schema::{CanonicalRecord, Column};
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    fn rec(code: &str, name: &str, pe: &str) -> CanonicalRecord {
        CanonicalRecord::from_cells([
            (Column::SecurityCode, Some(code)),
            (Column::SecurityName, Some(name)),
            (Column::PriceEarningsRatio, Some(pe)),
        ])
    }

    #[test]
    fn placeholder_names() {
        assert!(is_placeholder("Unnamed: 9"));
        assert!(is_placeholder("Unnamed"));
        assert!(is_placeholder(""));
        assert!(is_placeholder("  "));
        assert!(!is_placeholder("公司代號"));
        assert!(!is_placeholder("Unnamed company"));
    }

    #[test]
    fn merges_in_order_with_single_header() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("TWSE.csv");
        let b = dir.path().join("TPEX.csv");
        let out = dir.path().join("merged.csv");
        write_records(&[rec("1101", "台泥", "20.31"), rec("1102", "亞泥", "15.2")], &a, WriteMode::Replace)?;
        write_records(&[rec("5380", "台半", "12.34")], &b, WriteMode::Replace)?;

        let report = merge(&[&a, &b], &out, &MergeOptions::default())?;
        assert_eq!(report.outcome, WriteOutcome::Written { rows: 3 });
        assert_eq!(report.columns, vec!["公司代號", "公司名稱", "本益比"]);

        let bytes = fs::read(&out)?;
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes)?;
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "公司代號,公司名稱,本益比");
        assert_eq!(lines[1], "1101,台泥,20.31");
        assert_eq!(lines[3], "5380,台半,12.34");
        Ok(())
    }

    #[test]
    fn keeps_empty_columns_when_asked() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("a.csv");
        let out = dir.path().join("merged.csv");
        write_records(&[rec("1101", "台泥", "20.31")], &a, WriteMode::Replace)?;

        let report = merge(&[&a], &out, &MergeOptions { drop_empty_columns: false })?;
        assert_eq!(report.columns, Column::labels());
        Ok(())
    }

    #[test]
    fn placeholder_columns_from_trailing_commas_are_dropped() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("trailing.csv");
        fs::write(&a, "證券代號,證券名稱,本益比,\n5380,台半,12.34,\n")?;
        let table = drop_empty_columns(&read_artifact(&a)?);
        assert_eq!(table.headers, vec!["證券代號", "證券名稱", "本益比"]);
        assert_eq!(table.rows.len(), 1);
        Ok(())
    }

    #[test]
    fn mismatched_columns_are_null_filled() {
        let a = RawTable {
            headers: vec!["code".into(), "pe".into()],
            rows: vec![vec![Some("1101".into()), Some("20".into())]],
        };
        let b = RawTable {
            headers: vec!["code".into(), "pb".into()],
            rows: vec![vec![Some("5380".into()), Some("1.1".into())]],
        };
        let merged = concat_tables(&[a, b]);
        assert_eq!(merged.headers, vec!["code", "pe", "pb"]);
        assert_eq!(merged.rows[0], vec![Some("1101".into()), Some("20".into()), None]);
        assert_eq!(merged.rows[1], vec![Some("5380".into()), None, Some("1.1".into())]);
    }

    #[test]
    fn unreadable_inputs_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let a = dir.path().join("a.csv");
        let missing = dir.path().join("missing.csv");
        let out = dir.path().join("merged.csv");
        write_records(&[rec("1101", "台泥", "20.31")], &a, WriteMode::Replace)?;

        let report = merge(&[&a, &missing], &out, &MergeOptions::default())?;
        assert_eq!(report.inputs_read, 1);
        assert_eq!(report.inputs_skipped, vec![missing]);
        assert_eq!(report.outcome.rows(), 1);
        Ok(())
    }
}
