// src/fetch/raw.rs
//
// Typed shapes of the two OpenAPI feeds. Every field is optional text: the
// exchanges publish numbers as strings, sometimes as numbers, sometimes null.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{FetchError, Source};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TwseRow {
    #[serde(rename = "FiscalYearQuarter", default, deserialize_with = "loose_text")]
    pub fiscal_year_quarter: Option<String>,
    #[serde(rename = "Code", default, deserialize_with = "loose_text")]
    pub code: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "loose_text")]
    pub name: Option<String>,
    #[serde(rename = "PEratio", default, deserialize_with = "loose_text")]
    pub pe_ratio: Option<String>,
    #[serde(rename = "DividendYield", default, deserialize_with = "loose_text")]
    pub dividend_yield: Option<String>,
    #[serde(rename = "PBratio", default, deserialize_with = "loose_text")]
    pub pb_ratio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TpexRow {
    #[serde(rename = "Date", default, deserialize_with = "loose_text")]
    pub date: Option<String>,
    #[serde(rename = "SecuritiesCompanyCode", default, deserialize_with = "loose_text")]
    pub code: Option<String>,
    #[serde(rename = "CompanyName", default, deserialize_with = "loose_text")]
    pub company_name: Option<String>,
    #[serde(rename = "PriceEarningRatio", default, deserialize_with = "loose_text")]
    pub pe_ratio: Option<String>,
    #[serde(rename = "DividendPerShare", default, deserialize_with = "loose_text")]
    pub dividend_per_share: Option<String>,
    #[serde(rename = "YieldRatio", default, deserialize_with = "loose_text")]
    pub yield_ratio: Option<String>,
    #[serde(rename = "PriceBookRatio", default, deserialize_with = "loose_text")]
    pub pb_ratio: Option<String>,
}

/// One element of an OpenAPI response, tagged by feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    Twse(TwseRow),
    Tpex(TpexRow),
}

/// Accept strings, numbers, booleans or null as optional text.
fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Validate a JSON body into typed records.
///
/// The body must be an array of objects and every object must carry the
/// feed's identifier key (a null value is accepted, an absent key is not).
pub fn parse_records(feed: Source, body: &[u8]) -> Result<Vec<RawRecord>, FetchError> {
    let malformed = |reason: String| FetchError::Malformed { feed, reason };

    let value: Value = serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array".to_string()));
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Some(obj) = item.as_object() else {
            return Err(malformed(format!("element {} is not an object", index)));
        };
        if let Some(key) = feed.required_key() {
            if !obj.contains_key(key) {
                return Err(FetchError::MissingField { feed, index, key });
            }
        }
        let record = match feed {
            Source::TwseOpenApi => serde_json::from_value(item).map(RawRecord::Twse),
            Source::TpexOpenApi => serde_json::from_value(item).map(RawRecord::Tpex),
            Source::TwseCsv | Source::TpexCsv => {
                return Err(malformed("CSV feed has no JSON records".to_string()))
            }
        }
        .map_err(|e| malformed(format!("element {}: {}", index, e)))?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twse_rows_parse_with_mixed_value_types() {
        let body = r#"[{"Code":"1101","Name":"台泥","PEratio":20.31,"DividendYield":"3.08","PBratio":null,"FiscalYearQuarter":"113/3"}]"#;
        let records = parse_records(Source::TwseOpenApi, body.as_bytes()).unwrap();
        let RawRecord::Twse(row) = &records[0] else {
            panic!("expected a TWSE row");
        };
        assert_eq!(row.code.as_deref(), Some("1101"));
        assert_eq!(row.name.as_deref(), Some("台泥"));
        assert_eq!(row.pe_ratio.as_deref(), Some("20.31"));
        assert_eq!(row.pb_ratio, None);
    }

    #[test]
    fn missing_optional_key_is_null() {
        let body = br#"[{"SecuritiesCompanyCode":"5380","CompanyName":"X"}]"#;
        let records = parse_records(Source::TpexOpenApi, body).unwrap();
        assert_eq!(
            records[0],
            RawRecord::Tpex(TpexRow {
                code: Some("5380".into()),
                company_name: Some("X".into()),
                ..TpexRow::default()
            })
        );
    }

    #[test]
    fn missing_identifier_is_a_typed_failure() {
        let body = br#"[{"Code":"1101"},{"Name":"no code"}]"#;
        match parse_records(Source::TwseOpenApi, body) {
            Err(FetchError::MissingField { index, key, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(key, "Code");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn null_identifier_is_accepted() {
        let body = br#"[{"Code":null}]"#;
        assert_eq!(parse_records(Source::TwseOpenApi, body).unwrap().len(), 1);
    }

    #[test]
    fn non_array_bodies_are_malformed() {
        assert!(matches!(
            parse_records(Source::TwseOpenApi, br#"{"stat":"error"}"#),
            Err(FetchError::Malformed { .. })
        ));
        assert!(matches!(
            parse_records(Source::TwseOpenApi, b"<html>"),
            Err(FetchError::Malformed { .. })
        ));
    }
}
