use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

pub const SCHEMA_VERSION: u32 = 1;
pub const BADGE_COLOR: &str = "blue";

/// Badge-style summary of one source's run: the record count as text.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub schema_version: u32,
    pub label: String,
    pub message: String,
    pub color: String,
}

impl Summary {
    pub fn new(label: impl Into<String>, count: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            label: label.into(),
            message: count.to_string(),
            color: BADGE_COLOR.to_string(),
        }
    }
}

/// Write `<dir>/<name>.json` for a source.
///
/// - pretty-printed with four-space indent and a trailing newline
/// - written to a dotfile first, then renamed over the target
pub fn write_summary<P: AsRef<Path>>(path: P, label: &str, count: usize) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let summary = Summary::new(label, count);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "summary.json".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;

    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut tmp, formatter);
    summary
        .serialize(&mut ser)
        .context("serializing summary JSON")?;
    tmp.write_all(b"\n")?;
    drop(tmp);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn summary_matches_badge_format() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("TWSE.json");
        write_summary(&path, "TWSE 公司數", 1034)?;

        let text = fs::read_to_string(&path)?;
        assert!(text.contains("\"label\": \"TWSE 公司數\""));
        assert!(text.contains("\n    \"schemaVersion\": 1,"));
        assert!(text.ends_with("}\n"));

        let parsed: Summary = serde_json::from_str(&text)?;
        assert_eq!(parsed, Summary::new("TWSE 公司數", 1034));
        assert_eq!(parsed.message, "1034");
        assert_eq!(parsed.color, "blue");

        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["schemaVersion"], 1);
        Ok(())
    }

    #[test]
    fn zero_count_is_still_written() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("TPEX.json");
        write_summary(&path, "TPEX 公司數", 0)?;
        let parsed: Summary = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(parsed.message, "0");
        assert!(!dir.path().join(".TPEX.json.tmp").exists());
        Ok(())
    }
}
