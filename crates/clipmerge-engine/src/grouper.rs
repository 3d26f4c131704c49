//! Overlap grouping.
//!
//! Clips are only ever compared with clips in the same cluster:
//! - clips sharing a `source_video_id` form one cluster, ordered by VOD offset
//!   when every member has one and by capture time otherwise
//! - clips without a `source_video_id` fall back to one cluster per source
//!   stream, ordered by capture time
//!
//! The fallback is narrower than a single catch-all cluster on purpose: clips
//! from different streams never show the same frames, so keeping them apart
//! only skips comparisons that could not succeed.
//!
//! Within a cluster only adjacent clips are candidates, and only when their
//! metadata leaves room for an overlap. In capture-ordered clusters the
//! allowed gap grows with the earlier clip's length, so a merge product
//! stays within reach of the clip that continues it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use clipmerge_models::ClipRecord;

use crate::config::MergeConfig;

/// Identity of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterKey {
    /// Clips cut from the same archival recording
    SourceVideo(String),
    /// Fallback for clips whose recording is unknown, keyed by source stream
    Stream(String),
}

/// How members of a cluster are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOrdering {
    /// By position in the shared recording (authoritative)
    VodOffset,
    /// By upstream capture time
    CapturedAt,
}

/// Clips that may overlap each other, in play order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub key: ClusterKey,
    pub ordering: ClusterOrdering,
    /// Indices into the grouped slice
    pub members: Vec<usize>,
}

/// Two adjacent cluster members and the metadata gap between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePair {
    /// Index of the earlier clip
    pub first: usize,
    /// Index of the later clip
    pub second: usize,
    /// Gap in seconds between the two clips' start positions
    pub gap: f64,
    /// Largest gap at which the pair can still overlap: the earlier clip's
    /// length, plus the configured join gap when ordered by capture time
    pub limit: f64,
}

impl CandidatePair {
    /// Whether the pair is worth handing to the aligner.
    pub fn within_limit(&self) -> bool {
        self.gap <= self.limit
    }
}

/// Partitions a clip set into clusters and proposes adjacent pairs.
#[derive(Debug, Clone)]
pub struct OverlapGrouper {
    max_join_gap_secs: f64,
}

impl OverlapGrouper {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            max_join_gap_secs: config.max_join_gap.as_secs_f64(),
        }
    }

    /// Build clusters in a stable order (recording clusters first, then by key).
    pub fn group(&self, records: &[ClipRecord]) -> Vec<Cluster> {
        let mut buckets: BTreeMap<ClusterKey, Vec<usize>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            let key = match &record.source_video_id {
                Some(video) => ClusterKey::SourceVideo(video.clone()),
                None => ClusterKey::Stream(record.source_stream_id.clone()),
            };
            buckets.entry(key).or_default().push(idx);
        }

        buckets
            .into_iter()
            .map(|(key, mut members)| {
                let ordering = match key {
                    ClusterKey::SourceVideo(_)
                        if members.iter().all(|&i| records[i].vod_offset.is_some()) =>
                    {
                        ClusterOrdering::VodOffset
                    }
                    _ => ClusterOrdering::CapturedAt,
                };
                members.sort_by(|&a, &b| compare(&records[a], &records[b], ordering));
                Cluster {
                    key,
                    ordering,
                    members,
                }
            })
            .collect()
    }

    /// Adjacent pairs of a cluster in play order, with their gap check.
    pub fn adjacent_pairs(&self, cluster: &Cluster, records: &[ClipRecord]) -> Vec<CandidatePair> {
        cluster
            .members
            .windows(2)
            .map(|w| {
                let (first, second) = (&records[w[0]], &records[w[1]]);
                let (gap, limit) = match cluster.ordering {
                    ClusterOrdering::VodOffset => (
                        second.vod_offset.unwrap_or_default() - first.vod_offset.unwrap_or_default(),
                        first.duration,
                    ),
                    ClusterOrdering::CapturedAt => (
                        (second.captured_at - first.captured_at).num_milliseconds() as f64 / 1000.0,
                        first.duration + self.max_join_gap_secs,
                    ),
                };
                CandidatePair {
                    first: w[0],
                    second: w[1],
                    gap,
                    limit,
                }
            })
            .collect()
    }

    /// Every pair across all clusters that passes the gap check.
    pub fn proposals(&self, records: &[ClipRecord]) -> Vec<CandidatePair> {
        self.group(records)
            .iter()
            .flat_map(|cluster| self.adjacent_pairs(cluster, records))
            .filter(CandidatePair::within_limit)
            .collect()
    }
}

fn compare(a: &ClipRecord, b: &ClipRecord, ordering: ClusterOrdering) -> Ordering {
    let primary = match ordering {
        ClusterOrdering::VodOffset => a
            .vod_offset
            .unwrap_or_default()
            .total_cmp(&b.vod_offset.unwrap_or_default()),
        ClusterOrdering::CapturedAt => a.captured_at.cmp(&b.captured_at),
    };
    primary
        .then_with(|| a.captured_at.cmp(&b.captured_at))
        .then_with(|| a.location.cmp(&b.location))
}
