//! Clip assembly result.

use clipmerge_models::ClipRecord;

/// Minimum clip count before a set is worth assembling.
pub const DEFAULT_REQUIRED_CLIP_COUNT: usize = 3;

/// Minimum combined play time, in seconds, before a set is worth assembling.
pub const DEFAULT_MIN_TOTAL_DURATION_SECS: f64 = 300.0;

/// Thresholds a clip set must meet before it is handed to assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessCriteria {
    pub required_clip_count: usize,
    pub min_total_duration: f64,
}

impl Default for ReadinessCriteria {
    fn default() -> Self {
        Self {
            required_clip_count: DEFAULT_REQUIRED_CLIP_COUNT,
            min_total_duration: DEFAULT_MIN_TOTAL_DURATION_SECS,
        }
    }
}

/// The deduplicated, time-ordered clips left after a merge pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipAssembly {
    clips: Vec<ClipRecord>,
}

impl ClipAssembly {
    /// Order clips by capture time, then recording offset, then location.
    pub fn new(mut clips: Vec<ClipRecord>) -> Self {
        clips.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| {
                    a.vod_offset
                        .unwrap_or_default()
                        .total_cmp(&b.vod_offset.unwrap_or_default())
                })
                .then_with(|| a.location.cmp(&b.location))
        });
        Self { clips }
    }

    pub fn clips(&self) -> &[ClipRecord] {
        &self.clips
    }

    pub fn into_clips(self) -> Vec<ClipRecord> {
        self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Combined play time in seconds.
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.duration).sum()
    }

    /// Whether there is enough material to assemble.
    pub fn is_ready(&self, criteria: &ReadinessCriteria) -> bool {
        self.len() >= criteria.required_clip_count
            && self.total_duration() >= criteria.min_total_duration
    }
}
