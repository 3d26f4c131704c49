//! Rendering of joined clips.
//!
//! A join plays the first clip in full, then the second clip from the frame
//! after the detected overlap. The output is written beside its final path
//! and renamed into place only once FFmpeg succeeds, so a failed render never
//! leaves a partial file where a merge product is expected.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use clipmerge_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Where the second clip resumes after the first one ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinPlan {
    /// First frame of the second clip that is kept
    pub tail_start_frame: u64,
    /// Frame rate of the first clip
    pub fps_first: f64,
    /// Frame rate of the second clip
    pub fps_second: f64,
}

impl JoinPlan {
    /// Time in the second clip at which the kept tail starts.
    pub fn tail_start_secs(&self) -> f64 {
        if self.fps_second > 0.0 {
            self.tail_start_frame as f64 / self.fps_second
        } else {
            0.0
        }
    }
}

/// Outcome of a successful render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedJoin {
    /// Measured length of the written output in seconds
    pub duration: f64,
}

/// Materializes the media for a merge.
pub trait JoinRenderer {
    fn render(
        &self,
        first: &Path,
        second: &Path,
        plan: &JoinPlan,
        output: &Path,
    ) -> MediaResult<RenderedJoin>;
}

/// [`JoinRenderer`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegJoinRenderer {
    encoding: EncodingConfig,
    runner: FfmpegRunner,
}

impl FfmpegJoinRenderer {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            runner: FfmpegRunner::new(),
        }
    }

    /// Kill renders that run longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    fn build_command(
        &self,
        first: &Path,
        second: &Path,
        plan: &JoinPlan,
        with_audio: bool,
        output: &Path,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(first, output)
            .add_input(second)
            .filter_complex(build_join_filter(plan, with_audio))
            .map("[v]");
        if with_audio {
            cmd = cmd.map("[a]");
        }
        cmd.video_codec(&self.encoding.codec)
            .preset(&self.encoding.preset)
            .crf(self.encoding.crf)
            .audio_codec(&self.encoding.audio_codec)
            .audio_bitrate(&self.encoding.audio_bitrate)
            .output_args(["-movflags", "+faststart"])
    }
}

impl JoinRenderer for FfmpegJoinRenderer {
    fn render(
        &self,
        first: &Path,
        second: &Path,
        plan: &JoinPlan,
        output: &Path,
    ) -> MediaResult<RenderedJoin> {
        let first_info = probe_video(first)?;
        let second_info = probe_video(second)?;

        let partial = partial_path(output);
        let cmd = if plan.tail_start_secs() >= second_info.duration {
            // The second clip lies entirely inside the first
            info!(
                first = %first.display(),
                second = %second.display(),
                "Second clip fully overlapped, keeping first clip only"
            );
            FfmpegCommand::new(first, &partial).codec_copy()
        } else {
            let with_audio = first_info.has_audio && second_info.has_audio;
            self.build_command(first, second, plan, with_audio, &partial)
        };

        if let Err(e) = self.runner.run(&cmd) {
            remove_partial(&partial);
            return Err(e);
        }

        // Problems with the output are write failures, whatever probe reports
        let rendered = match probe_video(&partial) {
            Ok(info) if info.duration > 0.0 => info,
            Ok(_) => {
                remove_partial(&partial);
                return Err(MediaError::ffmpeg_failed(
                    "rendered join has zero duration",
                    None,
                    None,
                ));
            }
            Err(e) => {
                remove_partial(&partial);
                return Err(MediaError::ffmpeg_failed(
                    format!("rendered join is unreadable: {}", e),
                    None,
                    None,
                ));
            }
        };

        if let Err(e) = fs::rename(&partial, output) {
            remove_partial(&partial);
            return Err(e.into());
        }

        info!(
            output = %output.display(),
            duration = rendered.duration,
            "Rendered joined clip"
        );

        Ok(RenderedJoin {
            duration: rendered.duration,
        })
    }
}

/// Build the filter graph that concatenates the first clip with the second clip's tail.
///
/// The tail is trimmed by frame index so the cut lands exactly on the aligned
/// frame; audio is trimmed by the equivalent timestamp. The second clip is
/// resampled to the first clip's frame rate since `concat` needs matching rates.
pub fn build_join_filter(plan: &JoinPlan, with_audio: bool) -> String {
    let fps = format_fps(plan.fps_first);
    let mut filter = format!(
        "[0:v]setpts=PTS-STARTPTS,fps={fps}[v0];\
         [1:v]trim=start_frame={start},setpts=PTS-STARTPTS,fps={fps}[v1];",
        fps = fps,
        start = plan.tail_start_frame,
    );

    if with_audio {
        filter.push_str(&format!(
            "[0:a]asetpts=PTS-STARTPTS[a0];\
             [1:a]atrim=start={:.6},asetpts=PTS-STARTPTS[a1];\
             [v0][a0][v1][a1]concat=n=2:v=1:a=1[v][a]",
            plan.tail_start_secs()
        ));
    } else {
        filter.push_str("[v0][v1]concat=n=2:v=1:a=0[v]");
    }

    filter
}

fn format_fps(fps: f64) -> String {
    if fps > 0.0 {
        format!("{:.6}", fps)
    } else {
        "30".to_string()
    }
}

/// Sibling path FFmpeg writes to before the output is renamed into place.
fn partial_path(output: &Path) -> PathBuf {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    output.with_extension(format!("partial.{}", ext))
}

fn remove_partial(partial: &Path) {
    if partial.exists() {
        if let Err(e) = fs::remove_file(partial) {
            warn!("Failed to remove partial render {}: {}", partial.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> JoinPlan {
        JoinPlan {
            tail_start_frame: 150,
            fps_first: 30.0,
            fps_second: 30.0,
        }
    }

    #[test]
    fn test_tail_start_secs() {
        assert!((plan().tail_start_secs() - 5.0).abs() < 1e-9);

        let degenerate = JoinPlan {
            fps_second: 0.0,
            ..plan()
        };
        assert_eq!(degenerate.tail_start_secs(), 0.0);
    }

    #[test]
    fn test_join_filter_with_audio() {
        let filter = build_join_filter(&plan(), true);
        assert!(filter.contains("trim=start_frame=150"));
        assert!(filter.contains("atrim=start=5.000000"));
        assert!(filter.ends_with("concat=n=2:v=1:a=1[v][a]"));
    }

    #[test]
    fn test_join_filter_video_only() {
        let filter = build_join_filter(&plan(), false);
        assert!(!filter.contains("[0:a]"));
        assert!(filter.ends_with("concat=n=2:v=1:a=0[v]"));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/clips/x_merged.mp4")),
            PathBuf::from("/clips/x_merged.partial.mp4")
        );
    }

    #[test]
    fn test_render_missing_input_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let renderer = FfmpegJoinRenderer::new(EncodingConfig::default());

        let result = renderer.render(
            &dir.path().join("missing_a.mp4"),
            &dir.path().join("missing_b.mp4"),
            &plan(),
            &output,
        );

        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
        assert!(!output.exists());
    }
}
