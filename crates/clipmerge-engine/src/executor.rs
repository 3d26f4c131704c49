//! The fixed-point merge loop.
//!
//! A pass repeatedly clusters the working set, walks adjacent pairs and
//! merges the first pair that aligns. Clusters are rebuilt from scratch after
//! every merge because a merged clip can become adjacent to clips it could not
//! reach before. A pair that was rejected is not retried within the pass.
//!
//! A merge is persisted in this order: render the joined media, rewrite the
//! store, delete the parents' media. Until the rewrite succeeds the parents
//! are untouched.

use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use clipmerge_media::{FrameDecoder, JoinRenderer};
use clipmerge_models::ClipRecord;
use clipmerge_store::ClipStore;

use crate::aligner::{AlignmentOutcome, FrameAligner};
use crate::assembly::ClipAssembly;
use crate::config::MergeConfig;
use crate::error::EngineResult;
use crate::grouper::{CandidatePair, OverlapGrouper};
use crate::logging::MergeLogger;
use crate::metrics;

const DEFAULT_EXTENSION: &str = "mp4";

/// What happened to one candidate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    /// The pair was joined into this record
    Merged(ClipRecord),
    /// Metadata rules out an overlap; the aligner was not run
    GapRejected,
    /// No frame scored above the threshold
    NoAlignment { best_score: f64 },
    /// Media for either clip could not be decoded or compared
    DecodeFailed(String),
    /// The joined media could not be written
    RenderFailed(String),
}

impl PairOutcome {
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            PairOutcome::Merged(_) => "merged",
            PairOutcome::GapRejected => "gap",
            PairOutcome::NoAlignment { .. } => "no_alignment",
            PairOutcome::DecodeFailed(_) => "decode_failed",
            PairOutcome::RenderFailed(_) => "render_failed",
        }
    }
}

/// Counts for one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Pairs handed to the aligner
    pub pairs_attempted: usize,
    pub merges: usize,
    pub gap_rejections: usize,
    pub alignment_rejections: usize,
    pub decode_failures: usize,
    pub render_failures: usize,
}

impl MergeReport {
    fn record(&mut self, outcome: &PairOutcome) {
        match outcome {
            PairOutcome::Merged(_) => self.merges += 1,
            PairOutcome::GapRejected => self.gap_rejections += 1,
            PairOutcome::NoAlignment { .. } => self.alignment_rejections += 1,
            PairOutcome::DecodeFailed(_) => self.decode_failures += 1,
            PairOutcome::RenderFailed(_) => self.render_failures += 1,
        }
    }

    /// Pairs that were looked at but not merged.
    pub fn rejections(&self) -> usize {
        self.gap_rejections + self.alignment_rejections + self.decode_failures + self.render_failures
    }
}

/// Result of a merge pass.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub assembly: ClipAssembly,
    pub report: MergeReport,
}

/// Runs merge passes over clip sets.
pub struct MergeExecutor<D, R> {
    config: MergeConfig,
    grouper: OverlapGrouper,
    aligner: FrameAligner,
    decoder: D,
    renderer: R,
}

impl<D: FrameDecoder, R: JoinRenderer> MergeExecutor<D, R> {
    /// Create an executor. Fails if the configuration is invalid.
    pub fn new(config: MergeConfig, decoder: D, renderer: R) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            grouper: OverlapGrouper::new(&config),
            aligner: FrameAligner::new(&config),
            config,
            decoder,
            renderer,
        })
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge an in-memory clip set.
    ///
    /// Merged media is rendered and parent media deleted exactly as for a
    /// store, but no store is rewritten.
    pub fn merge_clips(&self, clips: Vec<ClipRecord>) -> EngineResult<MergeOutcome> {
        let pass_id = Uuid::new_v4().simple().to_string();
        let logger = MergeLogger::for_clips(&pass_id[..8]);
        self.run(clips, None, &logger)
    }

    /// Load a store, merge its records, and persist every merge to it.
    pub fn merge_store(&self, store: &ClipStore) -> EngineResult<MergeOutcome> {
        let pass_id = Uuid::new_v4().simple().to_string();
        let logger = MergeLogger::for_store(&pass_id[..8], store.path());
        let clips = store.load()?;
        self.run(clips, Some(store), &logger)
    }

    fn run(
        &self,
        clips: Vec<ClipRecord>,
        store: Option<&ClipStore>,
        logger: &MergeLogger,
    ) -> EngineResult<MergeOutcome> {
        let _span = logger.create_span().entered();
        logger.log_start(clips.len());

        let mut working = clips;
        let mut rejected: HashSet<(PathBuf, PathBuf)> = HashSet::new();
        let mut report = MergeReport::default();

        while let Some((pair, merged)) =
            self.next_merge(&working, &mut rejected, &mut report, store, logger)?
        {
            logger.log_merge(&working[pair.first], &working[pair.second], &merged);
            // Remove the higher index first so the lower one stays valid
            let (low, high) = if pair.first < pair.second {
                (pair.first, pair.second)
            } else {
                (pair.second, pair.first)
            };
            working.remove(high);
            working.remove(low);
            working.push(merged);
        }

        let assembly = ClipAssembly::new(working);
        logger.log_completion(assembly.len(), &report);

        Ok(MergeOutcome { assembly, report })
    }

    /// Walk every cluster's adjacent pairs until one merges.
    fn next_merge(
        &self,
        working: &[ClipRecord],
        rejected: &mut HashSet<(PathBuf, PathBuf)>,
        report: &mut MergeReport,
        store: Option<&ClipStore>,
        logger: &MergeLogger,
    ) -> EngineResult<Option<(CandidatePair, ClipRecord)>> {
        for cluster in self.grouper.group(working) {
            for pair in self.grouper.adjacent_pairs(&cluster, working) {
                let (first, second) = (&working[pair.first], &working[pair.second]);
                let key = (first.location.clone(), second.location.clone());
                if rejected.contains(&key) {
                    continue;
                }

                let outcome = if pair.within_limit() {
                    report.pairs_attempted += 1;
                    metrics::record_pair_attempted();
                    self.merge_pair(first, second, store)?
                } else {
                    debug!(
                        first = %first.location.display(),
                        second = %second.location.display(),
                        gap = pair.gap,
                        limit = pair.limit,
                        "Pair too far apart to overlap"
                    );
                    PairOutcome::GapRejected
                };
                report.record(&outcome);

                match outcome {
                    PairOutcome::Merged(merged) => {
                        metrics::record_merge();
                        return Ok(Some((pair, merged)));
                    }
                    other => {
                        metrics::record_pair_rejected(other.reason());
                        logger.log_pair_failed(first, second, &other);
                        rejected.insert(key);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Align, render and persist one pair.
    ///
    /// Only a failed store rewrite is an error; everything else is an outcome.
    fn merge_pair(
        &self,
        first: &ClipRecord,
        second: &ClipRecord,
        store: Option<&ClipStore>,
    ) -> EngineResult<PairOutcome> {
        let alignment = match self
            .aligner
            .align(&self.decoder, &first.location, &second.location)
        {
            AlignmentOutcome::Aligned(alignment) => alignment,
            AlignmentOutcome::NotFound { best_score } => {
                return Ok(PairOutcome::NoAlignment { best_score })
            }
            AlignmentOutcome::DimensionMismatch => {
                return Ok(PairOutcome::DecodeFailed("frame dimensions differ".to_string()))
            }
            AlignmentOutcome::DecodeFailed(msg) => return Ok(PairOutcome::DecodeFailed(msg)),
        };

        let output = self.output_path(first);
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir) {
                return Ok(PairOutcome::RenderFailed(e.to_string()));
            }
        }

        let rendered = match self.renderer.render(
            &first.location,
            &second.location,
            &alignment.join_plan(),
            &output,
        ) {
            Ok(rendered) => rendered,
            // Inputs that vanished or stopped probing since alignment
            Err(e) if e.is_decode_error() => return Ok(PairOutcome::DecodeFailed(e.to_string())),
            Err(e) => return Ok(PairOutcome::RenderFailed(e.to_string())),
        };

        let merged = merged_record(first, second, output, rendered.duration);

        if let Some(store) = store {
            if let Err(e) = store.rewrite(&[first.clone(), second.clone()], &[merged.clone()]) {
                remove_media(&merged.location);
                return Err(e.into());
            }
        }

        remove_media(&first.location);
        remove_media(&second.location);

        Ok(PairOutcome::Merged(merged))
    }

    /// `<prefix>_merged_<timestamp>_<id>.<ext>` in the output directory.
    fn output_path(&self, first: &ClipRecord) -> PathBuf {
        let dir = match (&self.config.output_dir, first.location.parent()) {
            (Some(dir), _) => dir.clone(),
            (None, Some(parent)) => parent.to_path_buf(),
            (None, None) => PathBuf::new(),
        };
        let ext = first
            .location
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION);
        let id = Uuid::new_v4().simple().to_string();
        dir.join(format!(
            "{}_merged_{}_{}.{}",
            first.file_prefix(),
            Utc::now().format("%Y-%m-%d-%H-%M-%S"),
            &id[..8],
            ext
        ))
    }
}

/// The record that replaces `first` and `second` once their join is rendered.
///
/// Channel metadata comes from the later clip; start position and capture
/// time come from the earlier one.
pub fn merged_record(
    first: &ClipRecord,
    second: &ClipRecord,
    location: PathBuf,
    duration: f64,
) -> ClipRecord {
    ClipRecord {
        location,
        id: None,
        source_stream_id: second.source_stream_id.clone(),
        game_id: second.game_id.clone(),
        source_stream_name: second.source_stream_name.clone(),
        captured_at: first.captured_at,
        duration,
        view_count: first.view_count.max(second.view_count),
        title: second.title.clone().or_else(|| first.title.clone()),
        vod_offset: first.vod_offset,
        source_video_id: second.source_video_id.clone(),
        transcript: first.transcript.clone().or_else(|| second.transcript.clone()),
        word_timings: first
            .word_timings
            .clone()
            .or_else(|| second.word_timings.clone()),
    }
}

fn remove_media(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed clip media"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
