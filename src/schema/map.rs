// src/schema/map.rs
//
// Field dictionaries of the OpenAPI feeds. Each mapper is total: absent or
// null source fields become null, never an error.

use crate::fetch::{RawRecord, TpexRow, TwseRow};

use super::{CanonicalRecord, Column};

/// TWSE OpenAPI → canonical.
///
/// | source             | column               |
/// |--------------------|----------------------|
/// | FiscalYearQuarter  | period               |
/// | Code               | security_code        |
/// | Name               | security_name        |
/// | PEratio            | price_earnings_ratio |
/// | (none)             | dividend_per_share   |
/// | DividendYield      | dividend_yield       |
/// | PBratio            | price_book_ratio     |
pub fn map_twse(row: &TwseRow) -> CanonicalRecord {
    CanonicalRecord::from_cells([
        (Column::Period, row.fiscal_year_quarter.as_deref()),
        (Column::SecurityCode, row.code.as_deref()),
        (Column::SecurityName, row.name.as_deref()),
        (Column::PriceEarningsRatio, row.pe_ratio.as_deref()),
        (Column::DividendPerShare, None),
        (Column::DividendYield, row.dividend_yield.as_deref()),
        (Column::PriceBookRatio, row.pb_ratio.as_deref()),
    ])
}

/// TPEx OpenAPI → canonical.
///
/// | source                | column               |
/// |-----------------------|----------------------|
/// | Date                  | period               |
/// | SecuritiesCompanyCode | security_code        |
/// | CompanyName           | security_name        |
/// | PriceEarningRatio     | price_earnings_ratio |
/// | DividendPerShare      | dividend_per_share   |
/// | YieldRatio            | dividend_yield       |
/// | PriceBookRatio        | price_book_ratio     |
pub fn map_tpex(row: &TpexRow) -> CanonicalRecord {
    CanonicalRecord::from_cells([
        (Column::Period, row.date.as_deref()),
        (Column::SecurityCode, row.code.as_deref()),
        (Column::SecurityName, row.company_name.as_deref()),
        (Column::PriceEarningsRatio, row.pe_ratio.as_deref()),
        (Column::DividendPerShare, row.dividend_per_share.as_deref()),
        (Column::DividendYield, row.yield_ratio.as_deref()),
        (Column::PriceBookRatio, row.pb_ratio.as_deref()),
    ])
}

pub fn map_record(record: &RawRecord) -> CanonicalRecord {
    match record {
        RawRecord::Twse(row) => map_twse(row),
        RawRecord::Tpex(row) => map_tpex(row),
    }
}

pub fn map_records(records: &[RawRecord]) -> Vec<CanonicalRecord> {
    records.iter().map(map_record).collect()
}
