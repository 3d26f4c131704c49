//! Synthetic media shared by the merge pass tests.
//!
//! A clip is a run of "global" frame numbers from one imaginary recording.
//! Every global frame has a distinct solid colour, so two clips overlap
//! exactly where their frame runs do.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use clipmerge_media::{
    Frame, FrameDecoder, FrameStream, JoinPlan, JoinRenderer, MediaError, MediaResult,
    RenderedJoin, TailFrame,
};
use clipmerge_models::ClipRecord;

pub const FPS: f64 = 10.0;
const SIZE: u32 = 4;

/// Solid frame for a global frame number; distinct for the first 4096 frames.
pub fn frame_for(global: u32) -> Frame {
    let channel = |shift: u32| (((global >> shift) % 16) * 16) as u8;
    Frame::solid(SIZE, SIZE, [channel(0), channel(4), channel(8)])
}

/// Start of the imaginary recording.
pub fn stream_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
}

/// In-memory media keyed by path, shared by the fake decoder and renderer.
#[derive(Clone, Default)]
pub struct MediaLibrary {
    clips: Rc<RefCell<HashMap<PathBuf, Vec<u32>>>>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip covering `seconds` of the recording from `start_secs`,
    /// and create a placeholder file for it.
    pub fn add_clip(&self, path: &Path, start_secs: f64, seconds: f64) {
        let first = (start_secs * FPS).round() as u32;
        let count = (seconds * FPS).round() as u32;
        self.insert(path, (first..first + count).collect());
    }

    pub fn insert(&self, path: &Path, frames: Vec<u32>) {
        fs::write(path, b"placeholder").unwrap();
        self.clips.borrow_mut().insert(path.to_path_buf(), frames);
    }

    pub fn frames_of(&self, path: &Path) -> Option<Vec<u32>> {
        self.clips.borrow().get(path).cloned()
    }

    pub fn decoder(&self) -> LibraryDecoder {
        LibraryDecoder {
            library: self.clone(),
        }
    }

    pub fn renderer(&self) -> LibraryRenderer {
        LibraryRenderer {
            library: self.clone(),
        }
    }

    fn lookup(&self, path: &Path) -> MediaResult<Vec<u32>> {
        self.frames_of(path)
            .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
    }
}

pub struct LibraryDecoder {
    library: MediaLibrary,
}

impl FrameDecoder for LibraryDecoder {
    fn last_frame(&self, path: &Path) -> MediaResult<TailFrame> {
        let frames = self.library.lookup(path)?;
        let last = frames
            .last()
            .copied()
            .ok_or_else(|| MediaError::decode_failed("empty clip"))?;
        Ok(TailFrame {
            frame: frame_for(last),
            fps: FPS,
            frame_count: frames.len() as u64,
        })
    }

    fn frames(&self, path: &Path) -> MediaResult<FrameStream<'_>> {
        let frames = self.library.lookup(path)?;
        Ok(FrameStream {
            fps: FPS,
            width: SIZE,
            height: SIZE,
            frames: Box::new(frames.into_iter().map(|g| Ok(frame_for(g)))),
        })
    }
}

/// Joins frame runs the way the FFmpeg renderer joins media.
pub struct LibraryRenderer {
    library: MediaLibrary,
}

impl JoinRenderer for LibraryRenderer {
    fn render(
        &self,
        first: &Path,
        second: &Path,
        plan: &JoinPlan,
        output: &Path,
    ) -> MediaResult<RenderedJoin> {
        let mut frames = self.library.lookup(first)?;
        let tail = self.library.lookup(second)?;
        frames.extend(tail.into_iter().skip(plan.tail_start_frame as usize));
        let duration = frames.len() as f64 / FPS;
        self.library.insert(output, frames);
        Ok(RenderedJoin { duration })
    }
}

/// A clip cut from recording `video` at `offset` seconds, registered in the library.
pub fn vod_clip(
    library: &MediaLibrary,
    dir: &Path,
    name: &str,
    video: &str,
    offset: f64,
    duration: f64,
) -> ClipRecord {
    let path = dir.join(format!("streamer_{}.mp4", name));
    library.add_clip(&path, offset, duration);
    ClipRecord::new(
        path,
        "1001",
        "streamer",
        stream_start() + Duration::milliseconds((offset * 1000.0) as i64),
        duration,
    )
    .with_vod(video, offset)
    .with_title(&format!("clip {}", name))
}

/// A clip with no known recording, captured `captured_secs` into the stream.
///
/// Its frames still come from `content_start` so overlaps can be staged.
pub fn stream_clip(
    library: &MediaLibrary,
    dir: &Path,
    name: &str,
    captured_secs: i64,
    content_start: f64,
    duration: f64,
) -> ClipRecord {
    let path = dir.join(format!("streamer_{}.mp4", name));
    library.add_clip(&path, content_start, duration);
    ClipRecord::new(
        path,
        "1001",
        "streamer",
        stream_start() + Duration::seconds(captured_secs),
        duration,
    )
}
