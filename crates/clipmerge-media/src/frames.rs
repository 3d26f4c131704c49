//! Raw frame decoding.
//!
//! Frames are decoded by FFmpeg to packed RGB24 and streamed through a pipe,
//! one frame at a time, so a clip is never held in memory as a whole.
//! [`FrameDecoder`] is the seam the aligner depends on; tests substitute
//! in-memory decoders for [`FfmpegFrameDecoder`].

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout};
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner, PIPE_OUTPUT};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Bytes per RGB24 pixel.
const BYTES_PER_PIXEL: usize = 3;

/// How far before the end of a clip to start decoding when looking for its last frame.
const TAIL_WINDOW_SECS: f64 = 2.0;

/// A decoded RGB24 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a packed RGB24 buffer.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = frame_len(width, height);
        if data.len() != expected {
            return Err(MediaError::decode_failed(format!(
                "RGB24 buffer for {}x{} must be {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(frame_len(width, height))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Iterate pixels as RGB triples in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(BYTES_PER_PIXEL)
    }

    /// Overwrite one pixel.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&rgb);
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// The final frame of a clip plus the timing needed to address it.
#[derive(Debug, Clone)]
pub struct TailFrame {
    pub frame: Frame,
    pub fps: f64,
    /// Total frames in the clip; the tail frame's index is `frame_count - 1`
    pub frame_count: u64,
}

impl TailFrame {
    pub fn index(&self) -> u64 {
        self.frame_count.saturating_sub(1)
    }
}

/// Frames of a clip, decoded lazily from the first frame onwards.
pub struct FrameStream<'a> {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frames: Box<dyn Iterator<Item = MediaResult<Frame>> + 'a>,
}

/// Decodes clip media into frames.
pub trait FrameDecoder {
    /// Decode the last frame of a clip.
    fn last_frame(&self, path: &Path) -> MediaResult<TailFrame>;

    /// Stream a clip's frames in presentation order.
    fn frames(&self, path: &Path) -> MediaResult<FrameStream<'_>>;
}

/// [`FrameDecoder`] backed by the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameDecoder {
    runner: FfmpegRunner,
}

impl FfmpegFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for FfmpegFrameDecoder {
    fn last_frame(&self, path: &Path) -> MediaResult<TailFrame> {
        let info = probe_video(path)?;

        // -sseof clamps to the start of the file, so short clips decode in full
        let cmd = FfmpegCommand::new(path, PIPE_OUTPUT)
            .seek_from_end(TAIL_WINDOW_SECS)
            .raw_rgb_frames();
        let child = self.runner.spawn_piped(&cmd)?;
        let reader = RawFrameReader::new(child, info.width, info.height)?;

        let mut last = None;
        for frame in reader {
            last = Some(frame?);
        }

        let frame = last.ok_or_else(|| {
            MediaError::decode_failed(format!("no frames decoded from {}", path.display()))
        })?;

        debug!(
            path = %path.display(),
            fps = info.fps,
            frame_count = info.total_frames(),
            "Decoded tail frame"
        );

        Ok(TailFrame {
            frame,
            fps: info.fps,
            frame_count: info.total_frames(),
        })
    }

    fn frames(&self, path: &Path) -> MediaResult<FrameStream<'_>> {
        let info = probe_video(path)?;

        let cmd = FfmpegCommand::new(path, PIPE_OUTPUT).raw_rgb_frames();
        let child = self.runner.spawn_piped(&cmd)?;
        let reader = RawFrameReader::new(child, info.width, info.height)?;

        Ok(FrameStream {
            fps: info.fps,
            width: info.width,
            height: info.height,
            frames: Box::new(reader),
        })
    }
}

/// Reads fixed-size RGB24 frames from an FFmpeg child's stdout.
///
/// The child is killed when the reader is dropped, so abandoning a scan early
/// does not leave a decoder running.
struct RawFrameReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    finished: bool,
}

impl RawFrameReader {
    fn new(mut child: Child, width: u32, height: u32) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MediaError::invalid_video("stream reports zero frame size"));
        }
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MediaError::ffmpeg_failed(
                    "Failed to capture FFmpeg stdout",
                    None,
                    None,
                ));
            }
        };
        Ok(Self {
            child,
            stdout,
            width,
            height,
            finished: false,
        })
    }

    /// Fill `buf` completely, returning the number of bytes read before EOF.
    fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn finish(&mut self) -> Option<MediaResult<Frame>> {
        self.finished = true;
        match self.child.wait() {
            Ok(status) if status.success() => None,
            Ok(status) => Some(Err(MediaError::ffmpeg_failed(
                "FFmpeg decoder exited with non-zero status",
                None,
                status.code(),
            ))),
            Err(e) => Some(Err(e.into())),
        }
    }
}

impl Iterator for RawFrameReader {
    type Item = MediaResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut buf = vec![0u8; frame_len(self.width, self.height)];
        match self.fill(&mut buf) {
            Ok(0) => self.finish(),
            Ok(n) if n < buf.len() => {
                self.finished = true;
                Some(Err(MediaError::decode_failed(format!(
                    "truncated frame: {} of {} bytes",
                    n,
                    buf.len()
                ))))
            }
            Ok(_) => Some(Frame::new(self.width, self.height, buf)),
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
        }
    }
}

impl Drop for RawFrameReader {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        assert!(Frame::new(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            Frame::new(2, 2, vec![0; 11]),
            Err(MediaError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_solid_and_set_pixel() {
        let mut frame = Frame::solid(3, 2, [10, 20, 30]);
        assert_eq!(frame.pixel_count(), 6);
        assert!(frame.pixels().all(|p| p == [10, 20, 30]));

        frame.set_pixel(2, 1, [1, 2, 3]);
        assert_eq!(frame.pixels().last().unwrap(), [1, 2, 3]);
        assert_eq!(frame.pixels().filter(|p| *p == [10, 20, 30]).count(), 5);
    }

    #[test]
    fn test_tail_frame_index() {
        let tail = TailFrame {
            frame: Frame::solid(1, 1, [0, 0, 0]),
            fps: 30.0,
            frame_count: 900,
        };
        assert_eq!(tail.index(), 899);
    }
}
