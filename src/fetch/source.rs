// src/fetch/source.rs

use chrono::NaiveDate;
use std::fmt;

use crate::process::{TableLayout, TPEX_LAYOUT, TWSE_LAYOUT};

/// The exchange feeds this crate knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// TWSE OpenAPI `BWIBBU_d`, JSON array, today's data.
    TwseOpenApi,
    /// TPEx OpenAPI mainboard P/E analysis, JSON array, today's data.
    TpexOpenApi,
    /// TWSE per-date CSV download.
    TwseCsv,
    /// TPEx per-date CSV download (legacy page, BIG5).
    TpexCsv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Csv,
}

impl Source {
    pub const JSON_FEEDS: [Source; 2] = [Source::TwseOpenApi, Source::TpexOpenApi];
    pub const CSV_FEEDS: [Source; 2] = [Source::TwseCsv, Source::TpexCsv];

    /// Exchange name used in file names and summary labels.
    pub fn exchange(self) -> &'static str {
        match self {
            Source::TwseOpenApi | Source::TwseCsv => "TWSE",
            Source::TpexOpenApi | Source::TpexCsv => "TPEX",
        }
    }

    pub fn kind(self) -> PayloadKind {
        match self {
            Source::TwseOpenApi | Source::TpexOpenApi => PayloadKind::Json,
            Source::TwseCsv | Source::TpexCsv => PayloadKind::Csv,
        }
    }

    /// Identifier key every JSON element must carry.
    pub fn required_key(self) -> Option<&'static str> {
        match self {
            Source::TwseOpenApi => Some("Code"),
            Source::TpexOpenApi => Some("SecuritiesCompanyCode"),
            Source::TwseCsv | Source::TpexCsv => None,
        }
    }

    /// Query parameters for the run date. The OpenAPI feeds take none.
    pub fn query(self, date: NaiveDate) -> Vec<(&'static str, String)> {
        match self {
            Source::TwseOpenApi | Source::TpexOpenApi => Vec::new(),
            Source::TwseCsv => vec![
                ("response", "csv".to_string()),
                ("date", date.format("%Y%m%d").to_string()),
                ("selectType", "ALL".to_string()),
            ],
            Source::TpexCsv => vec![
                ("l", "zh-tw".to_string()),
                ("o", "csv".to_string()),
                ("d", date.format("%Y/%m/%d").to_string()),
                ("c", String::new()),
                ("s", "0,asc".to_string()),
            ],
        }
    }

    pub fn layout(self) -> Option<&'static TableLayout> {
        match self {
            Source::TwseCsv => Some(&TWSE_LAYOUT),
            Source::TpexCsv => Some(&TPEX_LAYOUT),
            Source::TwseOpenApi | Source::TpexOpenApi => None,
        }
    }

    pub fn accept(self) -> &'static str {
        match self.kind() {
            PayloadKind::Json => "application/json",
            PayloadKind::Csv => "text/csv, */*",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::TwseOpenApi => "TWSE OpenAPI",
            Source::TpexOpenApi => "TPEX OpenAPI",
            Source::TwseCsv => "TWSE CSV",
            Source::TpexCsv => "TPEX CSV",
        };
        f.write_str(name)
    }
}
