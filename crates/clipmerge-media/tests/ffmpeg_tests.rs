//! FFmpeg-backed decoding and rendering tests.

use std::path::{Path, PathBuf};

use clipmerge_media::{
    probe_video, FfmpegCommand, FfmpegFrameDecoder, FfmpegJoinRenderer, FfmpegRunner,
    FrameDecoder, JoinPlan, JoinRenderer,
};
use clipmerge_models::EncodingConfig;

/// Encode `secs` seconds of the lavfi test pattern starting at `start`.
fn test_pattern(dir: &Path, name: &str, start: f64, secs: f64) -> PathBuf {
    let output = dir.join(name);
    let cmd = FfmpegCommand::new("testsrc2=size=64x48:rate=10:duration=10", &output)
        .input_arg("-f")
        .input_arg("lavfi")
        .output_arg("-ss")
        .output_arg(format!("{:.3}", start))
        .output_arg("-t")
        .output_arg(format!("{:.3}", secs))
        .video_codec("libx264")
        .preset("ultrafast")
        .output_args(["-qp", "0", "-pix_fmt", "yuv444p"]);
    FfmpegRunner::new()
        .run(&cmd)
        .expect("Failed to encode test pattern");
    output
}

/// Decode every frame of a short clip and its tail frame.
#[test]
#[ignore = "requires ffmpeg and ffprobe"]
fn test_decode_frames() {
    let dir = tempfile::tempdir().unwrap();
    let clip = test_pattern(dir.path(), "clip.mp4", 0.0, 3.0);
    let decoder = FfmpegFrameDecoder::new();

    let stream = decoder.frames(&clip).expect("Failed to open frame stream");
    assert_eq!((stream.width, stream.height), (64, 48));
    let frames: Vec<_> = stream.frames.collect::<Result<_, _>>().unwrap();
    assert_eq!(frames.len(), 30);

    let tail = decoder.last_frame(&clip).expect("Failed to decode tail");
    assert_eq!(tail.frame.width(), 64);
    assert_eq!(tail.index(), 29);
}

/// Join two overlapping cuts and check the result covers both exactly once.
#[test]
#[ignore = "requires ffmpeg and ffprobe"]
fn test_render_join() {
    let dir = tempfile::tempdir().unwrap();
    let first = test_pattern(dir.path(), "first.mp4", 0.0, 4.0);
    let second = test_pattern(dir.path(), "second.mp4", 3.0, 4.0);
    let output = dir.path().join("joined.mp4");

    // The first clip's last frame (3.9s) is frame 9 of the second clip
    let plan = JoinPlan {
        tail_start_frame: 10,
        fps_first: 10.0,
        fps_second: 10.0,
    };
    let rendered = FfmpegJoinRenderer::new(EncodingConfig::default().with_crf(23))
        .render(&first, &second, &plan, &output)
        .expect("Failed to render join");

    assert!((rendered.duration - 7.0).abs() < 0.2);
    assert!(output.exists());
    let info = probe_video(&output).unwrap();
    assert_eq!((info.width, info.height), (64, 48));
}
