use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use crate::classify::Classification;
use crate::config::{ClassificationConfig, IndexMode, RuntimeConfig};
use crate::dsl::parse_filter;
use crate::feed::EntityFeed;
use crate::resolver::{ResolveStats, Resolver};
use crate::sinks::{GeoJsonSink, GeoJsonlSink, GeoParquetSink, RecordSink};
use crate::storage::{IndexSet, select_strategy};
use crate::utils::available_memory_bytes;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input PBF file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file (.geojson, .geojsonl, .parquet), or '-' for geojsonl on stdout
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format (auto-detected if omitted)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Classification file (YAML); without it every entity is kept
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Thematic filter expression, replaces the one from the config
    #[arg(long)]
    pub filter: Option<String>,

    /// Reference index backing
    #[arg(long, default_value = "auto", env = "OSMSIFT_INDEX_MODE")]
    pub index_mode: IndexMode,

    /// Memory budget in bytes (default: available memory)
    #[arg(long)]
    pub memory_budget: Option<u64>,

    /// Share of the memory budget below which the input is indexed in memory
    #[arg(long, default_value_t = 0.05)]
    pub memory_fraction: f64,

    /// Directory for disk index temp files
    #[arg(long, env = "OSMSIFT_TMP_DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Extra relation scans to discover nested relation references
    #[arg(long, default_value_t = 1)]
    pub group_rescans: u32,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum OutputFormat {
    #[value(name = "geojson")]
    GeoJson,
    #[value(name = "geojsonl")]
    GeoJsonl,
    #[value(name = "geoparquet", alias = "parquet")]
    GeoParquet,
}

pub fn output_format_label(format: &OutputFormat) -> &'static str {
    match format {
        OutputFormat::GeoJson => "geojson",
        OutputFormat::GeoJsonl => "geojsonl",
        OutputFormat::GeoParquet => "geoparquet",
    }
}

/// The explicit format, or one derived from the output extension. Stdout
/// defaults to geojsonl.
pub fn detect_format(explicit: Option<OutputFormat>, output: &Path) -> Result<OutputFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    if output == Path::new("-") {
        return Ok(OutputFormat::GeoJsonl);
    }
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext.to_lowercase().as_str() {
            "geojson" => Some(OutputFormat::GeoJson),
            "geojsonl" | "jsonl" | "json" => Some(OutputFormat::GeoJsonl),
            "parquet" => Some(OutputFormat::GeoParquet),
            _ => None,
        })
        .context("CLI: Could not detect output format from extension; use --format")
}

pub fn runtime_config(cli: &Cli) -> Result<RuntimeConfig> {
    if !(cli.memory_fraction > 0.0 && cli.memory_fraction <= 1.0) {
        anyhow::bail!(
            "CLI: --memory-fraction must be in (0, 1], got {}",
            cli.memory_fraction
        );
    }
    Ok(RuntimeConfig {
        index_mode: cli.index_mode,
        memory_budget: cli.memory_budget,
        memory_fraction: cli.memory_fraction,
        tmp_dir: cli.tmp_dir.clone(),
        group_rescans: cli.group_rescans,
    })
}

/// Compile the classification table and the filter override. Runs before
/// the feed is opened so a bad expression fails the run up front.
pub fn build_classification(
    config_path: Option<&Path>,
    filter: Option<&str>,
) -> Result<Classification> {
    let config = match config_path {
        Some(path) => ClassificationConfig::load(path)?,
        None => ClassificationConfig::default(),
    };
    let mut classification = Classification::compile(&config)?;
    if let Some(source) = filter {
        let tree = parse_filter(source).map_err(|e| {
            anyhow::anyhow!("Classification: Error parsing filter '{}': {}", source, e)
        })?;
        classification = classification.with_filter(tree);
    }
    Ok(classification)
}

pub fn summarize_classification(classification: &Classification) -> String {
    match classification.keys() {
        None => format!(
            "keep everything ({} categories)",
            classification.category_count()
        ),
        Some(keys) => format!(
            "{} relevant keys, {} categories",
            keys.len(),
            classification.category_count()
        ),
    }
}

pub fn init_sink(format: &OutputFormat, output: &Path) -> Result<Box<dyn RecordSink>> {
    match format {
        OutputFormat::GeoJson => {
            if output == Path::new("-") {
                anyhow::bail!(
                    "CLI: GeoJSON output to stdout is not supported; use geojsonl instead"
                );
            }
            tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
            Ok(Box::new(GeoJsonSink::new(output)?))
        }
        OutputFormat::GeoJsonl => {
            if output == Path::new("-") {
                tracing::info!("Sink: {} -> stdout", output_format_label(format));
                Ok(Box::new(GeoJsonlSink::stdout()?))
            } else {
                tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
                Ok(Box::new(GeoJsonlSink::new(output)?))
            }
        }
        OutputFormat::GeoParquet => {
            if output == Path::new("-") {
                anyhow::bail!("CLI: Parquet output to stdout is not supported");
            }
            tracing::info!("Sink: {} -> {:?}", output_format_label(format), output);
            Ok(Box::new(GeoParquetSink::new(output)?))
        }
    }
}

/// Pick the index backing for `feed`, then run every pass into `sink`.
pub fn process_feed(
    feed: &mut dyn EntityFeed,
    classification: &Classification,
    runtime: &RuntimeConfig,
    sink: &mut dyn RecordSink,
) -> Result<ResolveStats> {
    let input_bytes = feed.size_bytes();
    if let Some(size) = input_bytes {
        let size_gb = size as f64 / (1024.0 * 1024.0 * 1024.0);
        tracing::info!("Input {}: {:.2} GB", feed.describe(), size_gb);
    }

    let budget = runtime.memory_budget.unwrap_or_else(available_memory_bytes);
    let (strategy, reason) =
        select_strategy(runtime.index_mode, input_bytes, budget, runtime.memory_fraction);
    tracing::info!("Reference index: {}", reason);

    let index = IndexSet::open(strategy, runtime.tmp_dir.as_deref())
        .context("Index: Failed to open reference index")?;
    Resolver::new(index, classification, runtime.group_rescans).run(feed, sink)
}
