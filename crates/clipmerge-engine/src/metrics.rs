//! Merge pass metrics.
//!
//! Emitted through the `metrics` facade; nothing is recorded until the host
//! installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const PAIRS_ATTEMPTED_TOTAL: &str = "clipmerge_pairs_attempted_total";
    pub const PAIRS_REJECTED_TOTAL: &str = "clipmerge_pairs_rejected_total";
    pub const MERGES_TOTAL: &str = "clipmerge_merges_total";
    pub const ALIGNMENT_SCORE: &str = "clipmerge_alignment_score";
}

/// Record a pair handed to the aligner.
pub fn record_pair_attempted() {
    counter!(names::PAIRS_ATTEMPTED_TOTAL).increment(1);
}

/// Record a pair left unmerged, labelled by why.
pub fn record_pair_rejected(reason: &'static str) {
    counter!(names::PAIRS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_merge() {
    counter!(names::MERGES_TOTAL).increment(1);
}

/// Record the best similarity score found for a pair.
pub fn record_alignment_score(score: f64) {
    histogram!(names::ALIGNMENT_SCORE).record(score);
}
