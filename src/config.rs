// src/config.rs

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::artifact::MergeOptions;
use crate::fetch::Source;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_ENV: &str = "PERATIO_CONFIG";

/// Everything a run needs besides the date. Every field has a default, so an
/// empty YAML document (or none at all) is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory for fixed-name artifacts and summaries.
    pub output_dir: PathBuf,
    /// Directory for the dated "today" artifact, relative to `output_dir`.
    pub today_dir: PathBuf,
    /// Explicit today artifact path; overrides `today_dir`.
    pub today_path: Option<PathBuf>,
    /// Rolling backup that receives the same rows as the today artifact.
    pub backup_file: PathBuf,
    /// Where raw CSV downloads are archived.
    pub raw_dir: PathBuf,
    /// Combined artifact built from the per-exchange CSV artifacts.
    pub merged_file: PathBuf,
    pub merge: MergeOptions,
    pub fetch: FetchConfig,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            today_dir: PathBuf::from("歷史資料"),
            today_path: None,
            backup_file: PathBuf::from("TWSE_TPEX.csv"),
            raw_dir: PathBuf::from("raw"),
            merged_file: PathBuf::from("TWSE_TPEX_CSV.csv"),
            merge: MergeOptions::default(),
            fetch: FetchConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Extra attempts after a failed request. Zero means one request only.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 0,
            retry_delay_ms: 1_000,
            user_agent: concat!("peratio/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Feed URLs and the declared text encodings of the CSV downloads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub twse_openapi: String,
    pub tpex_openapi: String,
    pub twse_csv: String,
    pub tpex_csv: String,
    /// WHATWG label the TWSE download is decoded with. It must match the
    /// charset the endpoint actually serves: a wrong label does not fail,
    /// it only logs a warning and leaves U+FFFD in the decoded text.
    pub twse_csv_encoding: String,
    /// Same for the TPEx download, which is served as BIG5.
    pub tpex_csv_encoding: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            twse_openapi: "https://openapi.twse.com.tw/v1/exchangeReport/BWIBBU_d".into(),
            tpex_openapi: "https://www.tpex.org.tw/openapi/v1/tpex_mainboard_peratio_analysis"
                .into(),
            twse_csv: "https://www.twse.com.tw/exchangeReport/BWIBBU_d".into(),
            tpex_csv:
                "https://www.tpex.org.tw/web/stock/aftertrading/peratio_analysis/pera_result.php"
                    .into(),
            twse_csv_encoding: "utf-8".into(),
            tpex_csv_encoding: "big5".into(),
        }
    }
}

impl Endpoints {
    /// Same paths as the real feeds, served from `base` (a local mock server).
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            twse_openapi: format!("{}/v1/exchangeReport/BWIBBU_d", base),
            tpex_openapi: format!("{}/openapi/v1/tpex_mainboard_peratio_analysis", base),
            twse_csv: format!("{}/exchangeReport/BWIBBU_d", base),
            tpex_csv: format!("{}/web/stock/aftertrading/peratio_analysis/pera_result.php", base),
            ..Self::default()
        }
    }

    pub fn base_url(&self, feed: Source) -> &str {
        match feed {
            Source::TwseOpenApi => &self.twse_openapi,
            Source::TpexOpenApi => &self.tpex_openapi,
            Source::TwseCsv => &self.twse_csv,
            Source::TpexCsv => &self.tpex_csv,
        }
    }

    /// Declared encoding of a feed's body. JSON feeds are always UTF-8.
    pub fn encoding_label(&self, feed: Source) -> &str {
        match feed {
            Source::TwseCsv => &self.twse_csv_encoding,
            Source::TpexCsv => &self.tpex_csv_encoding,
            Source::TwseOpenApi | Source::TpexOpenApi => "utf-8",
        }
    }
}

impl Config {
    /// Load from the file named by `PERATIO_CONFIG`, or fall back to defaults.
    pub fn load() -> Result<Self> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg = Self::from_yaml(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("invalid YAML config")
    }

    /// Resolve a configured path against `output_dir` unless it is absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }

    /// The dated today artifact: the explicit override, else
    /// `<today_dir>/<YYYYMMDD>.csv`.
    pub fn today_path(&self, date: NaiveDate) -> PathBuf {
        match &self.today_path {
            Some(p) => p.clone(),
            None => self
                .resolve(&self.today_dir)
                .join(format!("{}.csv", date.format("%Y%m%d"))),
        }
    }

    pub fn backup_path(&self) -> PathBuf {
        self.resolve(&self.backup_file)
    }

    pub fn merged_path(&self) -> PathBuf {
        self.resolve(&self.merged_file)
    }

    pub fn raw_path(&self, exchange: &str, date: NaiveDate) -> PathBuf {
        self.resolve(&self.raw_dir)
            .join(format!("{}_{}.csv", exchange, date.format("%Y%m%d")))
    }

    /// `<EXCHANGE>_<YYYYMMDD>.csv`, the dated normalized CSV download.
    pub fn dated_csv_path(&self, exchange: &str, date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.csv", exchange, date.format("%Y%m%d")))
    }

    /// `<EXCHANGE>.csv`, the latest non-empty normalized CSV download.
    pub fn latest_csv_path(&self, exchange: &str) -> PathBuf {
        self.output_dir.join(format!("{}.csv", exchange))
    }

    pub fn summary_path(&self, exchange: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", exchange))
    }

    /// Inputs of the CSV-flow merge, in merge order.
    pub fn merge_inputs(&self) -> Vec<PathBuf> {
        Source::CSV_FEEDS
            .iter()
            .map(|s| self.latest_csv_path(s.exchange()))
            .collect()
    }
}

/// Per-run inputs that must not be computed inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub date: NaiveDate,
}

impl RunContext {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }
}
