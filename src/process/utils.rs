/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Remove thousands separators from a numeric cell: `"1,234.5"` → `"1234.5"`.
pub fn strip_thousands(raw: &str) -> String {
    raw.trim().chars().filter(|&c| c != ',').collect()
}

/// True for cells that carry no value once trimmed.
pub fn is_blank(raw: &str) -> bool {
    raw.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_quotes_and_space() {
        assert_eq!(clean_str("  \"台泥 \" "), "台泥");
        assert_eq!(clean_str("1101"), "1101");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn thousands_separators_removed() {
        assert_eq!(strip_thousands("1,234.5"), "1234.5");
        assert_eq!(strip_thousands(" 12,345,678 "), "12345678");
        assert_eq!(strip_thousands("-"), "-");
    }
}
