#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for clip deduplication.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a blocking runner
//! - FFprobe stream information
//! - Raw RGB frame decoding behind the [`FrameDecoder`] seam
//! - Rendering of joined clips behind the [`JoinRenderer`] seam

pub mod command;
pub mod error;
pub mod frames;
pub mod join;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegFrameDecoder, Frame, FrameDecoder, FrameStream, TailFrame};
pub use join::{FfmpegJoinRenderer, JoinPlan, JoinRenderer, RenderedJoin};
pub use probe::{probe_video, VideoInfo};
