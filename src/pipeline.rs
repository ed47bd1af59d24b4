// src/pipeline.rs
//
// One daily run: both OpenAPI feeds into the today/backup artifacts, both
// per-date CSV downloads into their own artifacts, then the merge.

use anyhow::{Context, Result};
use std::{
    fmt, fs,
    path::Path,
};
use tracing::{error, info, instrument, warn};

use crate::artifact::{self, write_summary, WriteMode, WriteOutcome};
use crate::config::{Config, RunContext};
use crate::fetch::{Fetcher, RawPayload, Source};
use crate::process::normalize;
use crate::schema::{map_records, CanonicalRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The step wrote `rows` data rows.
    Done { rows: usize },
    /// Nothing to write; existing artifacts were left alone.
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
}

/// Per-step outcome of a run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    fn record(&mut self, step: impl Into<String>, status: StepStatus) {
        let step = step.into();
        match &status {
            StepStatus::Done { rows } => info!(step = %step, rows, "step done"),
            StepStatus::Empty => warn!(step = %step, "step produced no rows"),
            StepStatus::Failed(e) => error!(step = %step, error = %e, "step failed"),
        }
        self.steps.push(StepReport { step, status });
    }

    pub fn status(&self, step: &str) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.status)
    }

    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed(_)))
            .count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.steps {
            match &s.status {
                StepStatus::Done { rows } => writeln!(f, "{:<24} {} rows", s.step, rows)?,
                StepStatus::Empty => writeln!(f, "{:<24} empty", s.step)?,
                StepStatus::Failed(e) => writeln!(f, "{:<24} FAILED: {}", s.step, e)?,
            }
        }
        Ok(())
    }
}

fn write_status(outcome: Result<WriteOutcome>) -> StepStatus {
    match outcome {
        Ok(WriteOutcome::Written { rows }) => StepStatus::Done { rows },
        Ok(WriteOutcome::Skipped) => StepStatus::Empty,
        Err(e) => StepStatus::Failed(format!("{:#}", e)),
    }
}

pub struct Pipeline {
    config: Config,
    fetcher: Fetcher,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Fetcher::new(&config.fetch, config.endpoints.clone())
            .context("building fetcher")?;
        Ok(Self { config, fetcher })
    }

    /// Run every step in order. Only failing to create the output
    /// directories is fatal; every other failure is logged, recorded in the
    /// report, and the run moves on.
    #[instrument(level = "info", skip(self), fields(date = %ctx.date))]
    pub async fn run(&self, ctx: &RunContext) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.prepare_dirs(ctx)?;

        self.json_flow(ctx, &mut report).await;
        self.csv_flow(ctx, &mut report).await;
        self.merge_step(&mut report);

        info!(steps = report.steps.len(), failures = report.failures(), "run finished");
        Ok(report)
    }

    fn prepare_dirs(&self, ctx: &RunContext) -> Result<()> {
        let today = self.config.today_path(ctx.date);
        let dirs = [
            Some(self.config.output_dir.clone()),
            today.parent().map(Path::to_path_buf),
            self.config.backup_path().parent().map(Path::to_path_buf),
            Some(self.config.resolve(&self.config.raw_dir)),
        ];
        for d in dirs.into_iter().flatten() {
            if d.as_os_str().is_empty() {
                continue;
            }
            fs::create_dir_all(&d).with_context(|| format!("creating {}", d.display()))?;
        }
        Ok(())
    }

    // ─── JSON flow ───────────────────────────────────────────────────

    /// Both feeds land in the today and backup artifacts. The first feed that
    /// writes rows to a target in this run replaces it; later feeds append.
    #[instrument(level = "info", skip_all)]
    async fn json_flow(&self, ctx: &RunContext, report: &mut RunReport) {
        let targets = [self.config.today_path(ctx.date), self.config.backup_path()];
        let mut replaced = [false; 2];

        for feed in Source::JSON_FEEDS {
            let records = self.fetch_records(feed, ctx, report).await;

            for (target, done) in targets.iter().zip(replaced.iter_mut()) {
                let mode = if *done {
                    WriteMode::Append
                } else {
                    WriteMode::Replace
                };
                let written = artifact::write_records(&records, target, mode);
                if matches!(written, Ok(WriteOutcome::Written { .. })) {
                    *done = true;
                }
                let step = format!("{} -> {}", feed, file_label(target));
                report.record(step, write_status(written));
            }

            let label = format!("{} 公司數", feed.exchange());
            let summary_path = self.config.summary_path(feed.exchange());
            let status = match write_summary(&summary_path, &label, records.len()) {
                Ok(_) => StepStatus::Done {
                    rows: records.len(),
                },
                Err(e) => StepStatus::Failed(format!("{:#}", e)),
            };
            report.record(format!("{} summary", feed), status);
        }
    }

    /// Fetch and map one OpenAPI feed. Failures become an empty dataset.
    async fn fetch_records(
        &self,
        feed: Source,
        ctx: &RunContext,
        report: &mut RunReport,
    ) -> Vec<CanonicalRecord> {
        match self.fetcher.fetch(feed, ctx.date).await {
            Ok(RawPayload::Records(raw)) => {
                let records = map_records(&raw);
                report.record(
                    format!("{} fetch", feed),
                    if records.is_empty() {
                        StepStatus::Empty
                    } else {
                        StepStatus::Done {
                            rows: records.len(),
                        }
                    },
                );
                records
            }
            Ok(RawPayload::Text { .. }) => {
                report.record(
                    format!("{} fetch", feed),
                    StepStatus::Failed("expected JSON records, got text".to_string()),
                );
                Vec::new()
            }
            Err(e) => {
                warn!(feed = %feed, error = %e, "treating failed source as empty");
                report.record(format!("{} fetch", feed), StepStatus::Failed(e.to_string()));
                Vec::new()
            }
        }
    }

    // ─── CSV flow ────────────────────────────────────────────────────

    #[instrument(level = "info", skip_all)]
    async fn csv_flow(&self, ctx: &RunContext, report: &mut RunReport) {
        for feed in Source::CSV_FEEDS {
            let Some(layout) = feed.layout() else {
                continue;
            };
            let exchange = feed.exchange();
            let text = self.fetch_text(feed, ctx, report).await;

            if !text.is_empty() {
                let raw_path = self.config.raw_path(exchange, ctx.date);
                let status = match archive_raw(&text, &raw_path) {
                    Ok(()) => StepStatus::Done {
                        rows: text.lines().count(),
                    },
                    Err(e) => StepStatus::Failed(format!("{:#}", e)),
                };
                report.record(format!("{} archive", feed), status);
            }

            let table = normalize(&text, layout);
            if table.skipped_rows > 0 {
                info!(feed = %feed, skipped = table.skipped_rows, "dropped malformed rows");
            }

            let dated = self.config.dated_csv_path(exchange, ctx.date);
            let written = artifact::write_table(&table.records, &dated);
            let has_rows = matches!(written, Ok(WriteOutcome::Written { rows }) if rows > 0);
            report.record(format!("{} -> {}", feed, file_label(&dated)), write_status(written));

            if has_rows {
                let latest = self.config.latest_csv_path(exchange);
                let status = match fs::copy(&dated, &latest) {
                    Ok(_) => StepStatus::Done {
                        rows: table.records.len(),
                    },
                    Err(e) => StepStatus::Failed(format!(
                        "copying {} -> {}: {}",
                        dated.display(),
                        latest.display(),
                        e
                    )),
                };
                report.record(format!("{} -> {}", feed, file_label(&latest)), status);
            } else {
                warn!(feed = %feed, "no rows; keeping previous latest artifact");
            }
        }
    }

    /// Fetch one CSV download as text. Failures become an empty body.
    async fn fetch_text(&self, feed: Source, ctx: &RunContext, report: &mut RunReport) -> String {
        match self.fetcher.fetch(feed, ctx.date).await {
            Ok(RawPayload::Text { text, encoding }) => {
                info!(feed = %feed, encoding, lines = text.lines().count(), "downloaded CSV");
                report.record(
                    format!("{} fetch", feed),
                    StepStatus::Done {
                        rows: text.lines().count(),
                    },
                );
                text
            }
            Ok(RawPayload::Records(_)) => {
                report.record(
                    format!("{} fetch", feed),
                    StepStatus::Failed("expected text, got JSON records".to_string()),
                );
                String::new()
            }
            Err(e) => {
                warn!(feed = %feed, error = %e, "treating failed source as empty");
                report.record(format!("{} fetch", feed), StepStatus::Failed(e.to_string()));
                String::new()
            }
        }
    }

    // ─── merge ───────────────────────────────────────────────────────

    fn merge_step(&self, report: &mut RunReport) {
        let inputs = self.config.merge_inputs();
        let output = self.config.merged_path();
        let status = match artifact::merge(&inputs, &output, &self.config.merge) {
            Ok(r) => write_status(Ok(r.outcome)),
            Err(e) => StepStatus::Failed(format!("{:#}", e)),
        };
        report.record(format!("merge -> {}", file_label(&output)), status);
    }
}

/// Save the decoded download as UTF-8 text.
fn archive_raw(text: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), bytes = text.len(), "archived raw download");
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{read_artifact, UTF8_BOM};
    use crate::config::{Endpoints, FetchConfig};
    use chrono::NaiveDate;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWSE_CSV: &str = "\"113年12月20日 個股日本益比、殖利率及股價淨值比\"
\"證券代號\",\"證券名稱\",\"收盤價\",\"殖利率(%)\",\"股利年度\",\"本益比\",\"股價淨值比\",\"財報年/季\",
\"1101\",\"台泥\",\"32.50\",\"3.08\",\"112\",\"20.31\",\"1.16\",\"113/3\",
\"說明:\"
";

    const TPEX_CSV: &str = "上櫃股票個股本益比、殖利率、股價淨值比(依日期查詢)
資料日期:113/12/20
\"\"
\"\"
\"\"
\"\"
股票代號,名稱,本益比,每股股利(註),股利年度,殖利率(%),股價淨值比
\"5380\",\"台半\",\"12.34\",\"1.20\",\"112\",\"3.50\",\"1.10\"
";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 20).unwrap()
    }

    fn config(server: &MockServer, out: &Path) -> Config {
        Config {
            output_dir: out.to_path_buf(),
            fetch: FetchConfig {
                timeout_secs: 5,
                retry_delay_ms: 1,
                ..FetchConfig::default()
            },
            endpoints: Endpoints::local(&server.uri()),
            ..Config::default()
        }
    }

    async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_bytes(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    async fn mount_all(server: &MockServer) {
        mount_json(
            server,
            "/v1/exchangeReport/BWIBBU_d",
            serde_json::json!([
                {"Code": "1101", "Name": "台泥", "PEratio": "20.31", "DividendYield": "3.08", "PBratio": "1.16", "FiscalYearQuarter": "113/3"}
            ]),
        )
        .await;
        mount_json(
            server,
            "/openapi/v1/tpex_mainboard_peratio_analysis",
            serde_json::json!([
                {"Date": "1131220", "SecuritiesCompanyCode": "5380", "CompanyName": "台半", "PriceEarningRatio": "12.34"},
                {"Date": "1131220", "SecuritiesCompanyCode": "6488", "CompanyName": "環球晶", "PriceEarningRatio": "1,234.5"}
            ]),
        )
        .await;
        mount_bytes(server, "/exchangeReport/BWIBBU_d", TWSE_CSV.as_bytes().to_vec()).await;
        let (big5, _, _) = encoding_rs::BIG5.encode(TPEX_CSV);
        mount_bytes(
            server,
            "/web/stock/aftertrading/peratio_analysis/pera_result.php",
            big5.into_owned(),
        )
        .await;
    }

    #[tokio::test]
    async fn full_run_writes_every_artifact() -> Result<()> {
        let server = MockServer::start().await;
        mount_all(&server).await;
        let dir = tempdir()?;
        let cfg = config(&server, dir.path());

        let pipeline = Pipeline::new(cfg.clone())?;
        let report = pipeline.run(&RunContext::new(date())).await?;
        assert_eq!(report.failures(), 0, "{}", report);

        // today artifact: TWSE replaced, TPEX appended under one header
        let today = cfg.today_path(date());
        assert!(fs::read(&today)?.starts_with(UTF8_BOM));
        let table = read_artifact(&today)?;
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0][1].as_deref(), Some("1101"));
        assert_eq!(table.rows[2][3].as_deref(), Some("1234.5"));
        assert_eq!(fs::read(&today)?, fs::read(cfg.backup_path())?);

        let summary = fs::read_to_string(cfg.summary_path("TPEX"))?;
        assert!(summary.contains("\"label\": \"TPEX 公司數\""));
        assert!(summary.contains("\"message\": \"2\""));

        assert!(cfg.raw_path("TPEX", date()).exists());
        let tpex = read_artifact(cfg.latest_csv_path("TPEX"))?;
        assert_eq!(tpex.rows.len(), 1);
        assert_eq!(tpex.rows[0][2].as_deref(), Some("台半"));
        assert_eq!(
            fs::read(cfg.dated_csv_path("TWSE", date()))?,
            fs::read(cfg.latest_csv_path("TWSE"))?
        );

        let merged = read_artifact(cfg.merged_path())?;
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(merged.rows[0][merged.column_index("公司代號").unwrap()].as_deref(), Some("1101"));
        assert_eq!(merged.rows[1][merged.column_index("公司代號").unwrap()].as_deref(), Some("5380"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_sources_do_not_stop_the_run() -> Result<()> {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/openapi/v1/tpex_mainboard_peratio_analysis",
            serde_json::json!([{"SecuritiesCompanyCode": "5380", "CompanyName": "台半"}]),
        )
        .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempdir()?;
        let cfg = config(&server, dir.path());

        let report = Pipeline::new(cfg.clone())?.run(&RunContext::new(date())).await?;

        assert!(matches!(
            report.status("TWSE OpenAPI fetch"),
            Some(StepStatus::Failed(_))
        ));
        // with TWSE down, TPEX is the first writer and replaces the today artifact
        let today = read_artifact(cfg.today_path(date()))?;
        assert_eq!(today.rows.len(), 1);
        assert!(fs::read_to_string(cfg.summary_path("TWSE"))?.contains("\"message\": \"0\""));

        // failed CSV downloads leave header-only dated artifacts and no latest copy
        let dated = fs::read_to_string(cfg.dated_csv_path("TWSE", date()))?;
        assert_eq!(dated.lines().count(), 1);
        assert!(!cfg.latest_csv_path("TWSE").exists());
        assert_eq!(report.status("merge -> TWSE_TPEX_CSV.csv"), Some(&StepStatus::Empty));
        Ok(())
    }

    #[tokio::test]
    async fn rerun_with_first_feed_down_replaces_instead_of_appending() -> Result<()> {
        let dir = tempdir()?;

        let up = MockServer::start().await;
        mount_all(&up).await;
        let cfg = config(&up, dir.path());
        Pipeline::new(cfg.clone())?.run(&RunContext::new(date())).await?;

        let down = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/exchangeReport/BWIBBU_d"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&down)
            .await;
        mount_all(&down).await;
        let cfg = config(&down, dir.path());
        let report = Pipeline::new(cfg.clone())?.run(&RunContext::new(date())).await?;
        assert!(matches!(
            report.status("TWSE OpenAPI fetch"),
            Some(StepStatus::Failed(_))
        ));

        for artifact in [cfg.backup_path(), cfg.today_path(date())] {
            let table = read_artifact(&artifact)?;
            let code = table.column_index("公司代號").unwrap();
            let codes: Vec<Option<&str>> = table.rows.iter().map(|r| r[code].as_deref()).collect();
            assert_eq!(codes, vec![Some("5380"), Some("6488")]);
            assert_eq!(fs::read_to_string(&artifact)?.matches("公司代號").count(), 1);
        }
        Ok(())
    }

    #[tokio::test]
    async fn empty_download_keeps_the_previous_latest_artifact() -> Result<()> {
        let server = MockServer::start().await;
        mount_bytes(&server, "/exchangeReport/BWIBBU_d", Vec::new()).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempdir()?;
        let cfg = config(&server, dir.path());
        fs::write(cfg.latest_csv_path("TWSE"), "\u{feff}公司代號\n1101\n")?;

        Pipeline::new(cfg.clone())?.run(&RunContext::new(date())).await?;

        let latest = read_artifact(cfg.latest_csv_path("TWSE"))?;
        assert_eq!(latest.rows.len(), 1);
        let merged = read_artifact(cfg.merged_path())?;
        assert_eq!(merged.headers, vec!["公司代號".to_string()]);
        Ok(())
    }
}
