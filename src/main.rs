mod app;
mod classify;
mod config;
mod dsl;
mod feed;
mod geometry;
mod model;
mod resolver;
mod sinks;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;

use app::{
    Cli, build_classification, detect_format, init_sink, process_feed, runtime_config,
    summarize_classification,
};
use feed::PbfFeed;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    // Every expression is compiled before the first pass
    let classification = build_classification(cli.config.as_deref(), cli.filter.as_deref())?;
    tracing::info!(
        "Classification: {}",
        summarize_classification(&classification)
    );

    let runtime = runtime_config(&cli)?;
    let format = detect_format(cli.format, &cli.output)?;
    let mut feed = PbfFeed::open(&cli.input)?;
    let mut sink = init_sink(&format, &cli.output)?;

    let start = std::time::Instant::now();
    let stats = process_feed(&mut feed, &classification, &runtime, sink.as_mut())?;

    sink.finish().context("Sink: Failed to finalize sink")?;
    stats.log_summary();

    let written = stats.emitted.total();
    let elapsed = start.elapsed();
    tracing::info!(
        "Done! Written {} features in {:.2}s ({} features/s)",
        written,
        elapsed.as_secs_f64(),
        (written as f64 / elapsed.as_secs_f64()) as u64
    );

    Ok(())
}
