//! Worker configuration.

use clipmerge_engine::{MergeConfig, ReadinessCriteria};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum stores merged at the same time
    pub max_concurrent_stores: usize,
    /// When a merged store counts as ready for assembly
    pub readiness: ReadinessCriteria,
    /// Engine tunables shared by every pass
    pub merge: MergeConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_stores: 2,
            readiness: ReadinessCriteria::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = ReadinessCriteria::default();
        Self {
            max_concurrent_stores: std::env::var("WORKER_MAX_STORES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(2),
            readiness: ReadinessCriteria {
                required_clip_count: std::env::var("CLIPMERGE_REQUIRED_CLIPS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.required_clip_count),
                min_total_duration: std::env::var("CLIPMERGE_MIN_TOTAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.min_total_duration),
            },
            merge: MergeConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_stores, 2);
        assert_eq!(config.readiness.required_clip_count, 3);
        assert!(config.merge.validate().is_ok());
    }
}
