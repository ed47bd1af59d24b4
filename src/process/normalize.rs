// src/process/normalize.rs

use csv::ReaderBuilder;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::process::utils::{clean_str, is_blank};
use crate::schema::{CanonicalRecord, Column};

/// Shape of a CSV download: how many metadata lines precede the header and
/// which canonical column each header position carries.
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    pub name: &'static str,
    pub preamble_lines: usize,
    pub expected: &'static [Column],
}

/// TPEx `pera_result.php` download.
pub const TPEX_LAYOUT: TableLayout = TableLayout {
    name: "TPEX",
    preamble_lines: 6,
    expected: &[
        Column::SecurityCode,
        Column::SecurityName,
        Column::PriceEarningsRatio,
        Column::DividendPerShare,
        Column::DividendYear,
        Column::DividendYield,
        Column::PriceBookRatio,
    ],
};

/// TWSE `BWIBBU_d?response=csv` download: one title line, then the header.
pub const TWSE_LAYOUT: TableLayout = TableLayout {
    name: "TWSE",
    preamble_lines: 1,
    expected: &[
        Column::SecurityCode,
        Column::SecurityName,
        Column::ClosingPrice,
        Column::DividendYield,
        Column::DividendYear,
        Column::PriceEarningsRatio,
        Column::PriceBookRatio,
        Column::ReportPeriod,
    ],
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTable {
    pub records: Vec<CanonicalRecord>,
    /// Rows dropped because they were not well-formed.
    pub skipped_rows: usize,
}

/// Turn a raw CSV download into canonical records.
///
/// 1) drop the preamble, take the first non-blank row as the source header
/// 2) map header positions to canonical columns (positionally when the
///    header is wide enough, otherwise by label)
/// 3) every data row becomes a full canonical record; unmapped columns are
///    dropped and missing ones stay null
///
/// Rows that fail to parse, are wider than the header, lack a security code,
/// or are single-cell notes are skipped and counted. Shorter rows are kept and
/// their missing trailing cells stay null. An empty body yields an empty table.
#[tracing::instrument(level = "debug", skip(text), fields(layout = layout.name))]
pub fn normalize(text: &str, layout: &TableLayout) -> NormalizedTable {
    let body = strip_preamble(text, layout.preamble_lines);

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut columns: Option<Vec<Option<Column>>> = None;
    let mut out = NormalizedTable::default();

    for (idx, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(row = idx, error = %e, "skipping unparseable row");
                out.skipped_rows += 1;
                continue;
            }
        };

        if record.iter().all(is_blank) {
            continue;
        }

        let Some(cols) = columns.as_ref() else {
            let header: Vec<String> = record.iter().map(clean_str).collect();
            columns = Some(resolve_columns(&header, layout));
            continue;
        };

        if record.len() > cols.len() {
            debug!(
                row = idx,
                width = record.len(),
                expected = cols.len(),
                "skipping row wider than header"
            );
            out.skipped_rows += 1;
            continue;
        }
        // footers and notes ("共3筆", "說明:") are short rows with a single cell
        if record.len() < cols.len() && record.iter().filter(|c| !is_blank(c)).count() < 2 {
            debug!(row = idx, "skipping note row");
            out.skipped_rows += 1;
            continue;
        }

        let cells = cols
            .iter()
            .zip(record.iter())
            .filter_map(|(col, raw)| col.map(|c| (c, Some(clean_str(raw)))));
        let rec = CanonicalRecord::from_cells(cells);

        if rec.security_code.is_empty() {
            debug!(row = idx, "skipping row without security code");
            out.skipped_rows += 1;
            continue;
        }
        out.records.push(rec);
    }

    if columns.is_none() {
        warn!(layout = layout.name, "no header row found; table is empty");
    }
    info!(
        layout = layout.name,
        rows = out.records.len(),
        skipped = out.skipped_rows,
        "normalized table"
    );
    out
}

fn strip_preamble(text: &str, preamble_lines: usize) -> String {
    let text = text.trim_start_matches('\u{feff}');
    text.lines()
        .skip(preamble_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

fn resolve_columns(header: &[String], layout: &TableLayout) -> Vec<Option<Column>> {
    if header.len() >= layout.expected.len() {
        return (0..header.len())
            .map(|i| layout.expected.get(i).copied())
            .collect();
    }

    warn!(
        layout = layout.name,
        width = header.len(),
        expected = layout.expected.len(),
        "header narrower than expected; matching columns by label"
    );
    let mut seen = HashSet::new();
    header
        .iter()
        .map(|h| Column::from_label(h).filter(|c| seen.insert(*c)))
        .collect()
}
