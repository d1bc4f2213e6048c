use anyhow::Context;
use clap::Parser;
use geo_heatmap::{Cli, RunConfig, pipeline};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RunConfig::from(Cli::parse());
    let summary = pipeline::run(&config)
        .with_context(|| format!("failed to build heatmap {}", config.output.display()))?;

    log::info!("--- Summary ---");
    log::info!(
        "{} samples from {} files, {} distinct coordinates",
        summary.accepted_samples,
        summary.files,
        summary.distinct_points
    );
    match summary.hottest {
        Some((coordinate, count)) => log::info!("Most visited: {coordinate} ({count} samples)"),
        None => log::info!("No samples inside the date range"),
    }
    log::info!("✓ Heatmap written to {}", summary.output.display());

    Ok(())
}
