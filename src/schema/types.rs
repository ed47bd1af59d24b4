// src/schema/types.rs

use crate::process::utils::{clean_str, strip_thousands};

/// One column of the canonical P/E table.
///
/// `Column::ALL` is the single source of truth for the column order of
/// every artifact this crate writes.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub enum Column {
    Period,
    SecurityCode,
    SecurityName,
    PriceEarningsRatio,
    DividendPerShare,
    DividendYield,
    PriceBookRatio,
    ClosingPrice,
    DividendYear,
    ReportPeriod,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Period,
        Column::SecurityCode,
        Column::SecurityName,
        Column::PriceEarningsRatio,
        Column::DividendPerShare,
        Column::DividendYield,
        Column::PriceBookRatio,
        Column::ClosingPrice,
        Column::DividendYear,
        Column::ReportPeriod,
    ];

    /// Header label written to artifacts.
    pub fn label(self) -> &'static str {
        match self {
            Column::Period => "財務年度季度",
            Column::SecurityCode => "公司代號",
            Column::SecurityName => "公司名稱",
            Column::PriceEarningsRatio => "本益比",
            Column::DividendPerShare => "每股股利",
            Column::DividendYield => "殖利率",
            Column::PriceBookRatio => "股價淨值比",
            Column::ClosingPrice => "收盤價",
            Column::DividendYear => "股利年度",
            Column::ReportPeriod => "財報年/季",
        }
    }

    /// Resolve a header cell to a column. Accepts the canonical labels and
    /// the labels the exchanges print in their CSV downloads.
    pub fn from_label(raw: &str) -> Option<Column> {
        let label = clean_str(raw.trim_start_matches('\u{feff}'));
        let col = match label.as_str() {
            "財務年度季度" => Column::Period,
            "公司代號" | "證券代號" | "股票代號" => Column::SecurityCode,
            "公司名稱" | "證券名稱" | "名稱" => Column::SecurityName,
            "本益比" => Column::PriceEarningsRatio,
            "每股股利" | "每股股利(註)" => Column::DividendPerShare,
            "殖利率" | "殖利率(%)" => Column::DividendYield,
            "股價淨值比" => Column::PriceBookRatio,
            "收盤價" => Column::ClosingPrice,
            "股利年度" => Column::DividendYear,
            "財報年/季" => Column::ReportPeriod,
            _ => return None,
        };
        Some(col)
    }

    /// Columns whose values are decimals in the source feeds.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Column::PriceEarningsRatio
                | Column::DividendPerShare
                | Column::DividendYield
                | Column::PriceBookRatio
                | Column::ClosingPrice
        )
    }

    pub fn labels() -> Vec<&'static str> {
        Column::ALL.iter().map(|c| c.label()).collect()
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single normalized P/E disclosure row.
///
/// Values are kept as the text the exchange published; `None` is an absent
/// or null value and is written as an empty field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub period: Option<String>,
    pub security_code: String,
    pub security_name: Option<String>,
    pub price_earnings_ratio: Option<String>,
    pub dividend_per_share: Option<String>,
    pub dividend_yield: Option<String>,
    pub price_book_ratio: Option<String>,
    pub closing_price: Option<String>,
    pub dividend_year: Option<String>,
    pub report_period: Option<String>,
}

impl CanonicalRecord {
    /// Build a record from `(column, value)` cells. Columns that are not
    /// supplied stay null; empty strings are treated as null.
    pub fn from_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = (Column, Option<S>)>,
        S: Into<String>,
    {
        let mut rec = CanonicalRecord::default();
        for (col, value) in cells {
            let value = value.map(Into::into).filter(|v| !v.is_empty());
            match col {
                Column::Period => rec.period = value,
                Column::SecurityCode => {
                    rec.security_code = value.map(|v| v.trim().to_string()).unwrap_or_default()
                }
                Column::SecurityName => {
                    rec.security_name = value
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty())
                }
                Column::PriceEarningsRatio => rec.price_earnings_ratio = value,
                Column::DividendPerShare => rec.dividend_per_share = value,
                Column::DividendYield => rec.dividend_yield = value,
                Column::PriceBookRatio => rec.price_book_ratio = value,
                Column::ClosingPrice => rec.closing_price = value,
                Column::DividendYear => rec.dividend_year = value,
                Column::ReportPeriod => rec.report_period = value,
            }
        }
        rec
    }

    pub fn get(&self, col: Column) -> Option<&str> {
        match col {
            Column::Period => self.period.as_deref(),
            Column::SecurityCode => Some(self.security_code.as_str()).filter(|c| !c.is_empty()),
            Column::SecurityName => self.security_name.as_deref(),
            Column::PriceEarningsRatio => self.price_earnings_ratio.as_deref(),
            Column::DividendPerShare => self.dividend_per_share.as_deref(),
            Column::DividendYield => self.dividend_yield.as_deref(),
            Column::PriceBookRatio => self.price_book_ratio.as_deref(),
            Column::ClosingPrice => self.closing_price.as_deref(),
            Column::DividendYear => self.dividend_year.as_deref(),
            Column::ReportPeriod => self.report_period.as_deref(),
        }
    }

    /// Every `(column, value)` pair in canonical order.
    pub fn fields(&self) -> Vec<(Column, Option<&str>)> {
        Column::ALL.iter().map(|&c| (c, self.get(c))).collect()
    }

    /// Cells as written to an artifact: canonical order, nulls empty,
    /// thousands separators removed from numeric columns.
    pub fn to_row(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .map(|(col, value)| match value {
                Some(v) if col.is_numeric() => strip_thousands(v),
                Some(v) => v.to_string(),
                None => String::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_canonical_order() {
        let labels = Column::labels();
        assert_eq!(labels.len(), 10);
        assert_eq!(labels[0], "財務年度季度");
        assert_eq!(labels[1], "公司代號");
        assert_eq!(labels[9], "財報年/季");
        for col in Column::ALL {
            assert_eq!(Column::from_label(col.label()), Some(col));
        }
    }

    #[test]
    fn exchange_labels_resolve() {
        assert_eq!(Column::from_label("證券代號"), Some(Column::SecurityCode));
        assert_eq!(Column::from_label(" 殖利率(%) "), Some(Column::DividendYield));
        assert_eq!(Column::from_label("\u{feff}證券名稱"), Some(Column::SecurityName));
        assert_eq!(Column::from_label("Unnamed: 9"), None);
    }

    #[test]
    fn to_row_strips_separators_only_in_numeric_columns() {
        let rec = CanonicalRecord::from_cells([
            (Column::SecurityCode, Some("2330")),
            (Column::SecurityName, Some("  台積電 ")),
            (Column::ClosingPrice, Some("1,234.5")),
            (Column::Period, Some("1,2")),
        ]);
        let row = rec.to_row();
        assert_eq!(row.len(), Column::ALL.len());
        assert_eq!(row[0], "1,2");
        assert_eq!(row[1], "2330");
        assert_eq!(row[2], "台積電");
        assert_eq!(row[7], "1234.5");
        assert_eq!(row[3], "");
    }

    #[test]
    fn empty_cells_become_null() {
        let rec = CanonicalRecord::from_cells([
            (Column::SecurityCode, Some("1101")),
            (Column::PriceEarningsRatio, Some("")),
        ]);
        assert_eq!(rec.price_earnings_ratio, None);
        assert_eq!(rec.get(Column::SecurityCode), Some("1101"));
    }
}
