use anyhow::{Context, Result};
use peratio::{artifact::merge, config::Config};
use std::{env, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// merge_csv [OUTPUT INPUT...]
///
/// Merge existing artifacts into OUTPUT. With no arguments the configured
/// per-exchange artifacts are merged into the configured merged artifact.
fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let config = Config::load().context("loading config")?;
    let args: Vec<PathBuf> = env::args().skip(1).map(PathBuf::from).collect();

    let (output, inputs) = match args.split_first() {
        Some((output, inputs)) if !inputs.is_empty() => (output.clone(), inputs.to_vec()),
        Some(_) => anyhow::bail!("usage: merge_csv [OUTPUT INPUT...]"),
        None => (config.merged_path(), config.merge_inputs()),
    };

    let report = merge(&inputs, &output, &config.merge)?;
    info!(
        output = %output.display(),
        read = report.inputs_read,
        skipped = report.inputs_skipped.len(),
        rows = report.outcome.rows(),
        "merge finished"
    );
    println!(
        "{} rows from {} files -> {}",
        report.outcome.rows(),
        report.inputs_read,
        output.display()
    );
    Ok(())
}
