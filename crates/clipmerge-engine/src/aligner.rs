//! Content-based frame alignment.
//!
//! The aligner decides whether a later clip continues an earlier one by
//! scanning the later clip for the frame that best matches the earlier clip's
//! final frame. Timestamps from upstream are advisory only; the join point is
//! found by content.

use std::path::Path;
use tracing::{debug, info};

use clipmerge_media::{Frame, FrameDecoder, JoinPlan};

use crate::config::MergeConfig;
use crate::metrics;

/// Fraction of pixels that match within `tolerance` on every channel.
///
/// Returns `None` when the frames differ in size or are empty.
pub fn similarity_score(a: &Frame, b: &Frame, tolerance: u8) -> Option<f64> {
    if !a.same_dimensions(b) || a.pixel_count() == 0 {
        return None;
    }
    let matching = a
        .pixels()
        .zip(b.pixels())
        .filter(|(pa, pb)| {
            pa.iter()
                .zip(pb.iter())
                .all(|(ca, cb)| ca.abs_diff(*cb) <= tolerance)
        })
        .count();
    Some(matching as f64 / a.pixel_count() as f64)
}

/// An accepted join point between two clips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Index of the first clip's final frame
    pub last_frame_index_first: u64,
    /// Frame of the second clip showing the first clip's final frame
    pub match_index: u64,
    pub fps_first: f64,
    pub fps_second: f64,
    /// Similarity of the matched frame (0.0-1.0)
    pub score: f64,
    pub frames_scanned: u64,
}

impl Alignment {
    /// First frame of the second clip that is not already in the first clip.
    pub fn resume_frame(&self) -> u64 {
        self.match_index + 1
    }

    /// Length of content shared by both clips, in seconds.
    pub fn overlap_secs(&self) -> f64 {
        if self.fps_second > 0.0 {
            self.resume_frame() as f64 / self.fps_second
        } else {
            0.0
        }
    }

    pub fn join_plan(&self) -> JoinPlan {
        JoinPlan {
            tail_start_frame: self.resume_frame(),
            fps_first: self.fps_first,
            fps_second: self.fps_second,
        }
    }
}

/// Result of aligning one candidate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    Aligned(Alignment),
    /// The best frame scored below the threshold
    NotFound { best_score: f64 },
    /// The clips have different frame sizes and can never align
    DimensionMismatch,
    /// Either clip could not be decoded
    DecodeFailed(String),
}

/// Scans a clip for the frame that continues another.
#[derive(Debug, Clone)]
pub struct FrameAligner {
    threshold: f64,
    tolerance: u8,
    max_scan_frames: Option<u64>,
}

impl FrameAligner {
    pub fn new(config: &MergeConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            tolerance: config.pixel_tolerance,
            max_scan_frames: config.max_scan_frames,
        }
    }

    /// Find where `second` continues `first`.
    ///
    /// The earliest frame with the highest score wins. A perfect match ends
    /// the scan since nothing later can beat it.
    pub fn align<D>(&self, decoder: &D, first: &Path, second: &Path) -> AlignmentOutcome
    where
        D: FrameDecoder + ?Sized,
    {
        let tail = match decoder.last_frame(first) {
            Ok(tail) => tail,
            Err(e) => return AlignmentOutcome::DecodeFailed(e.to_string()),
        };
        let stream = match decoder.frames(second) {
            Ok(stream) => stream,
            Err(e) => return AlignmentOutcome::DecodeFailed(e.to_string()),
        };

        if stream.width != tail.frame.width() || stream.height != tail.frame.height() {
            debug!(
                first = %first.display(),
                second = %second.display(),
                "Frame sizes differ: {}x{} vs {}x{}",
                tail.frame.width(),
                tail.frame.height(),
                stream.width,
                stream.height
            );
            return AlignmentOutcome::DimensionMismatch;
        }

        let limit = self.max_scan_frames.unwrap_or(u64::MAX);
        let fps_second = stream.fps;
        let mut best: Option<(u64, f64)> = None;
        let mut scanned: u64 = 0;

        for (index, frame) in (0u64..limit).zip(stream.frames) {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => return AlignmentOutcome::DecodeFailed(e.to_string()),
            };
            scanned += 1;

            let Some(score) = similarity_score(&tail.frame, &frame, self.tolerance) else {
                return AlignmentOutcome::DimensionMismatch;
            };
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
                if score >= 1.0 {
                    break;
                }
            }
        }

        let Some((match_index, score)) = best else {
            return AlignmentOutcome::DecodeFailed(format!(
                "no frames decoded from {}",
                second.display()
            ));
        };

        metrics::record_alignment_score(score);

        if score < self.threshold {
            debug!(
                first = %first.display(),
                second = %second.display(),
                best_score = score,
                best_index = match_index,
                frames_scanned = scanned,
                "No alignment above threshold"
            );
            return AlignmentOutcome::NotFound { best_score: score };
        }

        let alignment = Alignment {
            last_frame_index_first: tail.index(),
            match_index,
            fps_first: tail.fps,
            fps_second,
            score,
            frames_scanned: scanned,
        };

        info!(
            first = %first.display(),
            second = %second.display(),
            match_index,
            score,
            overlap_secs = alignment.overlap_secs(),
            "Aligned clips"
        );

        AlignmentOutcome::Aligned(alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipmerge_media::{FrameStream, MediaError, MediaResult, TailFrame};
    use std::collections::HashMap;
    use std::path::PathBuf;

    const BLACK: [u8; 3] = [0, 0, 0];
    const WHITE: [u8; 3] = [255, 255, 255];

    /// Serves fixed frame lists keyed by path.
    #[derive(Default)]
    struct FakeDecoder {
        clips: HashMap<PathBuf, Vec<MediaResult<Frame>>>,
    }

    impl FakeDecoder {
        fn with_clip(mut self, path: &str, frames: Vec<Frame>) -> Self {
            self.clips
                .insert(PathBuf::from(path), frames.into_iter().map(Ok).collect());
            self
        }

        fn with_broken_clip(mut self, path: &str, good: Vec<Frame>) -> Self {
            let mut frames: Vec<MediaResult<Frame>> = good.into_iter().map(Ok).collect();
            frames.push(Err(MediaError::decode_failed("truncated frame")));
            self.clips.insert(PathBuf::from(path), frames);
            self
        }

        fn frames_of(&self, path: &Path) -> MediaResult<Vec<Frame>> {
            let frames = self
                .clips
                .get(path)
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;
            frames
                .iter()
                .map(|f| match f {
                    Ok(frame) => Ok(frame.clone()),
                    Err(e) => Err(MediaError::decode_failed(e.to_string())),
                })
                .collect()
        }
    }

    impl FrameDecoder for FakeDecoder {
        fn last_frame(&self, path: &Path) -> MediaResult<TailFrame> {
            let frames = self.frames_of(path)?;
            let count = frames.len() as u64;
            let frame = frames
                .into_iter()
                .last()
                .ok_or_else(|| MediaError::decode_failed("empty clip"))?;
            Ok(TailFrame {
                frame,
                fps: 10.0,
                frame_count: count,
            })
        }

        fn frames(&self, path: &Path) -> MediaResult<FrameStream<'_>> {
            let frames = self
                .clips
                .get(path)
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;
            let (width, height) = frames
                .iter()
                .find_map(|f| f.as_ref().ok().map(|f| (f.width(), f.height())))
                .unwrap_or((0, 0));
            Ok(FrameStream {
                fps: 10.0,
                width,
                height,
                frames: Box::new(frames.iter().map(|f| match f {
                    Ok(frame) => Ok(frame.clone()),
                    Err(e) => Err(MediaError::decode_failed(e.to_string())),
                })),
            })
        }
    }

    fn aligner(threshold: f64) -> FrameAligner {
        FrameAligner::new(
            &MergeConfig::default()
                .with_similarity_threshold(threshold)
                .with_pixel_tolerance(0),
        )
    }

    fn solid(rgb: [u8; 3]) -> Frame {
        Frame::solid(2, 2, rgb)
    }

    /// A black 2x2 frame with one white pixel: 3 of 4 pixels match black.
    fn mostly_black() -> Frame {
        let mut frame = solid(BLACK);
        frame.set_pixel(1, 1, WHITE);
        frame
    }

    fn align(decoder: &FakeDecoder, threshold: f64) -> AlignmentOutcome {
        aligner(threshold).align(decoder, Path::new("a.mp4"), Path::new("b.mp4"))
    }

    #[test]
    fn test_similarity_score() {
        assert_eq!(similarity_score(&solid(BLACK), &solid(BLACK), 0), Some(1.0));
        assert_eq!(similarity_score(&solid(BLACK), &solid(WHITE), 0), Some(0.0));
        assert_eq!(similarity_score(&solid(BLACK), &mostly_black(), 0), Some(0.75));
        assert_eq!(
            similarity_score(&solid(BLACK), &Frame::solid(4, 4, BLACK), 0),
            None
        );
    }

    #[test]
    fn test_similarity_tolerance_is_per_channel() {
        let noisy = solid([10, 0, 5]);
        assert_eq!(similarity_score(&solid(BLACK), &noisy, 10), Some(1.0));
        assert_eq!(similarity_score(&solid(BLACK), &noisy, 9), Some(0.0));
    }

    #[test]
    fn test_finds_exact_continuation() {
        let red = solid([255, 0, 0]);
        let green = solid([0, 255, 0]);
        let blue = solid([0, 0, 255]);
        let decoder = FakeDecoder::default()
            .with_clip("a.mp4", vec![solid(WHITE), red.clone()])
            .with_clip("b.mp4", vec![green, red, blue]);

        let AlignmentOutcome::Aligned(alignment) = align(&decoder, 0.8) else {
            panic!("expected alignment");
        };
        assert_eq!(alignment.last_frame_index_first, 1);
        assert_eq!(alignment.match_index, 1);
        assert_eq!(alignment.resume_frame(), 2);
        assert_eq!(alignment.score, 1.0);
        assert_eq!(alignment.frames_scanned, 2);
        assert!((alignment.overlap_secs() - 0.2).abs() < 1e-9);
        assert_eq!(alignment.join_plan().tail_start_frame, 2);
    }

    #[test]
    fn test_threshold_boundary() {
        let decoder = FakeDecoder::default()
            .with_clip("a.mp4", vec![solid(BLACK)])
            .with_clip("b.mp4", vec![solid(WHITE), mostly_black(), solid(WHITE)]);

        match align(&decoder, 0.75) {
            AlignmentOutcome::Aligned(alignment) => {
                assert_eq!(alignment.match_index, 1);
                assert_eq!(alignment.score, 0.75);
            }
            other => panic!("expected alignment at the threshold, got {:?}", other),
        }

        assert_eq!(
            align(&decoder, 0.75 + 1e-9),
            AlignmentOutcome::NotFound { best_score: 0.75 }
        );
    }

    #[test]
    fn test_first_maximum_wins() {
        let decoder = FakeDecoder::default()
            .with_clip("a.mp4", vec![solid(BLACK)])
            .with_clip(
                "b.mp4",
                vec![solid(WHITE), mostly_black(), solid(WHITE), mostly_black()],
            );

        let AlignmentOutcome::Aligned(alignment) = align(&decoder, 0.5) else {
            panic!("expected alignment");
        };
        assert_eq!(alignment.match_index, 1);
        assert_eq!(alignment.frames_scanned, 4);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let decoder = FakeDecoder::default()
            .with_clip("a.mp4", vec![solid(BLACK)])
            .with_clip("b.mp4", vec![Frame::solid(4, 4, BLACK)]);

        assert_eq!(align(&decoder, 0.1), AlignmentOutcome::DimensionMismatch);
    }

    #[test]
    fn test_decode_failures_reject_the_pair() {
        let decoder = FakeDecoder::default().with_clip("b.mp4", vec![solid(BLACK)]);
        assert!(matches!(
            align(&decoder, 0.8),
            AlignmentOutcome::DecodeFailed(_)
        ));

        let decoder = FakeDecoder::default()
            .with_clip("a.mp4", vec![solid(BLACK)])
            .with_broken_clip("b.mp4", vec![solid(WHITE)]);
        assert!(matches!(
            align(&decoder, 0.8),
            AlignmentOutcome::DecodeFailed(_)
        ));
    }

    #[test]
    fn test_scan_limit() {
        let decoder = FakeDecoder::default()
            .with_clip("a.mp4", vec![solid(BLACK)])
            .with_clip("b.mp4", vec![solid(WHITE), solid(WHITE), solid(BLACK)]);

        let limited = FrameAligner::new(
            &MergeConfig::default()
                .with_pixel_tolerance(0)
                .with_max_scan_frames(2),
        );
        assert_eq!(
            limited.align(&decoder, Path::new("a.mp4"), Path::new("b.mp4")),
            AlignmentOutcome::NotFound { best_score: 0.0 }
        );

        assert!(matches!(
            align(&decoder, 0.8),
            AlignmentOutcome::Aligned(Alignment { match_index: 2, .. })
        ));
    }
}
