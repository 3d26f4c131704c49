//! Clip merge worker binary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipmerge_media::{check_ffmpeg, check_ffprobe};
use clipmerge_worker::{
    init_metrics, run_directory, run_store_pass, write_snapshot, StoreSummary, WorkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "clipmerge-worker", version, about = "Deduplicate and merge overlapping clips")]
struct Cli {
    /// Print store summaries as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Write merge metrics in Prometheus text format to this file
    #[arg(long = "metrics-file", global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one merge pass over a clip store
    Merge {
        store: PathBuf,

        #[command(flatten)]
        overrides: MergeOverrides,
    },
    /// Run a merge pass over every clip store in a directory
    MergeDir {
        dir: PathBuf,

        /// Stores merged at the same time
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        #[command(flatten)]
        overrides: MergeOverrides,
    },
}

/// Command-line overrides for the environment configuration.
#[derive(Args, Debug, Clone, Default)]
struct MergeOverrides {
    /// Minimum fraction of matching pixels (0.0-1.0)
    #[arg(long)]
    threshold: Option<f64>,

    /// Per-channel pixel difference still counted as a match
    #[arg(long)]
    tolerance: Option<u8>,

    /// Seconds allowed between one clip ending and the next being captured,
    /// for clips without a recording offset
    #[arg(long = "max-gap")]
    max_gap_secs: Option<u64>,

    /// Stop scanning a clip after this many frames
    #[arg(long = "scan-frames")]
    scan_frames: Option<u64>,

    /// Directory for merged clips
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,
}

impl MergeOverrides {
    fn apply(self, config: &mut WorkerConfig) {
        if let Some(threshold) = self.threshold {
            config.merge.similarity_threshold = threshold;
        }
        if let Some(tolerance) = self.tolerance {
            config.merge.pixel_tolerance = tolerance;
        }
        if let Some(secs) = self.max_gap_secs {
            config.merge.max_join_gap = Duration::from_secs(secs);
        }
        if let Some(frames) = self.scan_frames {
            config.merge.max_scan_frames = Some(frames);
        }
        if let Some(dir) = self.output_dir {
            config.merge.output_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in [
        "clipmerge_engine=info",
        "clipmerge_media=info",
        "clipmerge_store=info",
        "clipmerge_worker=info",
    ] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;
    let metrics = init_metrics()?;

    let mut config = WorkerConfig::from_env();

    let summaries = match cli.command {
        Command::Merge { store, overrides } => {
            overrides.apply(&mut config);
            info!(store = %store.display(), "Starting merge pass");
            let summary = tokio::task::spawn_blocking(move || run_store_pass(&store, &config))
                .await
                .context("Merge task panicked")??;
            vec![summary]
        }
        Command::MergeDir {
            dir,
            jobs,
            overrides,
        } => {
            overrides.apply(&mut config);
            if let Some(jobs) = jobs {
                config.max_concurrent_stores = jobs.max(1);
            }
            info!(
                dir = %dir.display(),
                max_concurrent_stores = config.max_concurrent_stores,
                "Starting directory merge"
            );
            run_directory(&dir, &config).await?
        }
    };

    if let Some(path) = &cli.metrics_file {
        write_snapshot(&metrics, path)?;
        info!(path = %path.display(), "Wrote metrics");
    }

    report(&summaries, cli.json)
}

fn report(summaries: &[StoreSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{}: {} clips, {:.1}s total, {} merges, {}",
            summary.store.display(),
            summary.clips,
            summary.total_duration,
            summary.merges,
            if summary.ready { "ready" } else { "not ready" }
        );
        if !summary.ready {
            warn!(store = %summary.store.display(), "Store not ready for assembly");
        }
    }
    Ok(())
}
