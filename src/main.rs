use anyhow::{Context, Result};
use chrono::Local;
use peratio::{
    config::{Config, RunContext},
    pipeline::Pipeline,
};
use std::{env, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) config + run inputs ──────────────────────────────────────
    let mut config = Config::load().context("loading config")?;
    let mut args = env::args().skip(1);
    if let Some(out) = args.next() {
        config.today_path = Some(PathBuf::from(out));
    }
    if args.next().is_some() {
        warn!("ignoring extra arguments; usage: peratio [OUTPUT_CSV]");
    }
    let ctx = RunContext::new(Local::now().date_naive());
    info!(
        date = %ctx.date,
        today = %config.today_path(ctx.date).display(),
        output_dir = %config.output_dir.display(),
        "run inputs"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.run(&ctx).await?;
    print!("{}", report);

    info!(failures = report.failures(), "all done");
    Ok(())
}
