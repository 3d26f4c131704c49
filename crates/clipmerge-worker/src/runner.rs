//! Store discovery and merge pass orchestration.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use clipmerge_engine::{MergeExecutor, MergeOutcome, ReadinessCriteria};
use clipmerge_media::{FfmpegFrameDecoder, FfmpegJoinRenderer};
use clipmerge_store::ClipStore;

use crate::config::WorkerConfig;

/// File extension of clip stores.
pub const STORE_EXTENSION: &str = "csv";

/// What one merge pass did to one store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreSummary {
    pub store: PathBuf,
    pub clips: usize,
    pub total_duration: f64,
    pub ready: bool,
    pub merges: usize,
    pub pairs_attempted: usize,
    pub rejections: usize,
}

impl StoreSummary {
    pub fn new(store: &Path, outcome: &MergeOutcome, readiness: &ReadinessCriteria) -> Self {
        Self {
            store: store.to_path_buf(),
            clips: outcome.assembly.len(),
            total_duration: outcome.assembly.total_duration(),
            ready: outcome.assembly.is_ready(readiness),
            merges: outcome.report.merges,
            pairs_attempted: outcome.report.pairs_attempted,
            rejections: outcome.report.rejections(),
        }
    }
}

/// Run one blocking merge pass over a store with the FFmpeg backends.
pub fn run_store_pass(store_path: &Path, config: &WorkerConfig) -> Result<StoreSummary> {
    let mut renderer = FfmpegJoinRenderer::new(config.merge.encoding.clone());
    if let Some(timeout) = config.merge.render_timeout {
        renderer = renderer.with_timeout(timeout.as_secs());
    }
    let executor = MergeExecutor::new(config.merge.clone(), FfmpegFrameDecoder::new(), renderer)
        .context("Invalid merge configuration")?;

    let store = ClipStore::new(store_path);
    let outcome = executor
        .merge_store(&store)
        .with_context(|| format!("Merge pass failed for {}", store_path.display()))?;

    Ok(StoreSummary::new(store_path, &outcome, &config.readiness))
}

/// Clip stores directly inside `dir`, sorted by path.
pub fn discover_stores(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut stores = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read store directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == STORE_EXTENSION) {
            stores.push(path);
        }
    }
    stores.sort();
    Ok(stores)
}

/// Merge every store in `dir`, at most `max_concurrent_stores` at a time.
///
/// Each store gets its own blocking task, so one store is never merged by two
/// passes at once. A failed store is logged and left out of the result.
pub async fn run_directory(dir: &Path, config: &WorkerConfig) -> Result<Vec<StoreSummary>> {
    let stores = discover_stores(dir)?;
    info!(dir = %dir.display(), stores = stores.len(), "Discovered clip stores");

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_stores.max(1)));
    let mut tasks = JoinSet::new();

    for store in stores {
        let permit = semaphore.clone().acquire_owned().await?;
        let config = config.clone();
        tasks.spawn_blocking(move || {
            let result = run_store_pass(&store, &config);
            drop(permit);
            (store, result)
        });
    }

    let mut summaries = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => summaries.push(summary),
            Ok((store, Err(e))) => {
                error!(store = %store.display(), "Merge pass failed: {:#}", e);
            }
            Err(e) => error!("Merge task panicked: {}", e),
        }
    }
    summaries.sort_by(|a, b| a.store.cmp(&b.store));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clipmerge_engine::{ClipAssembly, MergeReport};
    use clipmerge_models::ClipRecord;
    use tempfile::TempDir;

    #[test]
    fn test_discover_stores_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.csv"), "").unwrap();
        std::fs::write(dir.path().join("a.csv"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let stores = discover_stores(dir.path()).unwrap();

        assert_eq!(
            stores,
            vec![dir.path().join("a.csv"), dir.path().join("b.csv")]
        );
    }

    #[test]
    fn test_discover_stores_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(discover_stores(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_summary_from_outcome() {
        let captured = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
        let outcome = MergeOutcome {
            assembly: ClipAssembly::new(vec![
                ClipRecord::new("a.mp4", "1", "s", captured, 200.0),
                ClipRecord::new("b.mp4", "1", "s", captured, 150.0),
            ]),
            report: MergeReport {
                pairs_attempted: 3,
                merges: 1,
                alignment_rejections: 2,
                ..MergeReport::default()
            },
        };
        let readiness = ReadinessCriteria {
            required_clip_count: 2,
            min_total_duration: 300.0,
        };

        let summary = StoreSummary::new(Path::new("s.csv"), &outcome, &readiness);

        assert_eq!(summary.clips, 2);
        assert!(summary.ready);
        assert_eq!(summary.merges, 1);
        assert_eq!(summary.rejections, 2);
        assert!((summary.total_duration - 350.0).abs() < 1e-9);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["store"], "s.csv");
    }

    #[tokio::test]
    async fn test_run_directory_with_empty_stores() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), "").unwrap();
        std::fs::write(dir.path().join("b.csv"), "").unwrap();

        let summaries = run_directory(dir.path(), &WorkerConfig::default())
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.clips == 0 && !s.ready));
    }
}
