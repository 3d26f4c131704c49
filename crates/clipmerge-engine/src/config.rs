//! Merge engine configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clipmerge_models::EncodingConfig;

use crate::error::{EngineError, EngineResult};

/// Minimum fraction of matching pixels for two frames to count as the same moment.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Per-channel difference under which two pixels still match (absorbs re-encoding noise).
pub const DEFAULT_PIXEL_TOLERANCE: u8 = 12;
/// Seconds allowed between a clip ending and the next one being captured,
/// for clips ordered without a VOD offset.
pub const DEFAULT_MAX_JOIN_GAP_SECS: u64 = 60;

/// Tunables for grouping, alignment, and merge rendering.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Alignment is accepted when the best score is at least this (0.0-1.0)
    pub similarity_threshold: f64,
    /// Maximum per-channel difference for a pixel to match
    pub pixel_tolerance: u8,
    /// In time-ordered clusters, how far past the end of the earlier clip the
    /// later one may be captured
    pub max_join_gap: Duration,
    /// Stop scanning the second clip after this many frames
    pub max_scan_frames: Option<u64>,
    /// Directory for merge products; defaults to the first parent's directory
    pub output_dir: Option<PathBuf>,
    /// Kill a merge render after this long
    pub render_timeout: Option<Duration>,
    /// Encoding used for merge products
    pub encoding: EncodingConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            pixel_tolerance: DEFAULT_PIXEL_TOLERANCE,
            max_join_gap: Duration::from_secs(DEFAULT_MAX_JOIN_GAP_SECS),
            max_scan_frames: None,
            output_dir: None,
            render_timeout: None,
            encoding: EncodingConfig::default(),
        }
    }
}

impl MergeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            similarity_threshold: env_or(
                "CLIPMERGE_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            pixel_tolerance: env_or("CLIPMERGE_PIXEL_TOLERANCE", defaults.pixel_tolerance),
            max_join_gap: env_opt::<f64>("CLIPMERGE_MAX_JOIN_GAP_SECS")
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(defaults.max_join_gap),
            max_scan_frames: env_opt("CLIPMERGE_MAX_SCAN_FRAMES"),
            output_dir: std::env::var("CLIPMERGE_OUTPUT_DIR").ok().map(PathBuf::from),
            render_timeout: env_opt::<u64>("CLIPMERGE_RENDER_TIMEOUT_SECS").map(Duration::from_secs),
            encoding: EncodingConfig {
                crf: env_or("CLIPMERGE_CRF", defaults.encoding.crf),
                preset: std::env::var("CLIPMERGE_PRESET").unwrap_or(defaults.encoding.preset),
                ..defaults.encoding
            },
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_pixel_tolerance(mut self, tolerance: u8) -> Self {
        self.pixel_tolerance = tolerance;
        self
    }

    pub fn with_max_join_gap(mut self, gap: Duration) -> Self {
        self.max_join_gap = gap;
        self
    }

    pub fn with_max_scan_frames(mut self, frames: u64) -> Self {
        self.max_scan_frames = Some(frames);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(EngineError::config_error(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_join_gap.is_zero() {
            return Err(EngineError::config_error("max join gap must be positive"));
        }
        if self.max_scan_frames == Some(0) {
            return Err(EngineError::config_error("max scan frames must be positive"));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env_opt(key).unwrap_or(default)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
