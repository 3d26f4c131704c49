//! Structured merge-pass logging.

use std::path::{Path, PathBuf};
use tracing::{info, warn, Span};

use clipmerge_models::ClipRecord;

use crate::executor::{MergeReport, PairOutcome};

/// Logger for one merge pass.
///
/// Every event carries the pass ID and, for store passes, the store path, so
/// passes over different stores running side by side stay distinguishable.
#[derive(Debug, Clone)]
pub struct MergeLogger {
    pass_id: String,
    store: Option<PathBuf>,
}

impl MergeLogger {
    /// Logger for a pass over an in-memory clip set.
    pub fn for_clips(pass_id: impl Into<String>) -> Self {
        Self {
            pass_id: pass_id.into(),
            store: None,
        }
    }

    /// Logger for a pass that persists to the store at `path`.
    pub fn for_store(pass_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            pass_id: pass_id.into(),
            store: Some(path.into()),
        }
    }

    pub fn pass_id(&self) -> &str {
        &self.pass_id
    }

    pub fn store(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    fn store_label(&self) -> String {
        self.store
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    /// Create a tracing span for this pass.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "merge_pass",
            pass_id = %self.pass_id,
            store = %self.store_label()
        )
    }

    pub fn log_start(&self, clip_count: usize) {
        info!(
            pass_id = %self.pass_id,
            store = %self.store_label(),
            clip_count,
            "Merge pass started"
        );
    }

    /// Log a pair joined into `merged`.
    pub fn log_merge(&self, first: &ClipRecord, second: &ClipRecord, merged: &ClipRecord) {
        info!(
            pass_id = %self.pass_id,
            first = %first.location.display(),
            second = %second.location.display(),
            merged = %merged.location.display(),
            duration = merged.duration,
            "Clips merged"
        );
    }

    /// Log a pair left unmerged because its media could not be read or written.
    ///
    /// Gap and alignment rejections are routine and not logged here.
    pub fn log_pair_failed(&self, first: &ClipRecord, second: &ClipRecord, outcome: &PairOutcome) {
        let detail = match outcome {
            PairOutcome::DecodeFailed(msg) | PairOutcome::RenderFailed(msg) => msg.as_str(),
            _ => return,
        };
        warn!(
            pass_id = %self.pass_id,
            store = %self.store_label(),
            first = %first.location.display(),
            second = %second.location.display(),
            reason = outcome.reason(),
            "Pair not merged: {}", detail
        );
    }

    pub fn log_completion(&self, remaining: usize, report: &MergeReport) {
        info!(
            pass_id = %self.pass_id,
            store = %self.store_label(),
            remaining,
            merges = report.merges,
            pairs_attempted = report.pairs_attempted,
            rejections = report.rejections(),
            "Merge pass completed"
        );
    }
}
