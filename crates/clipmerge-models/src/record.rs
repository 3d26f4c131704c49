//! Clip record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single transcribed word with its time span inside the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

/// One captured clip and the metadata needed to deduplicate it.
///
/// A record is "live" while its `location` points at a readable media file.
/// Records produced by a merge replace both of their parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    /// Encoded video file backing this record
    pub location: PathBuf,

    /// Upstream clip identifier (absent for merge products)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Origin channel/feed identifier
    pub source_stream_id: String,

    /// Game or category tag (passthrough)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,

    /// Origin channel/feed display name
    pub source_stream_name: String,

    /// Wall-clock time the clip was produced upstream
    pub captured_at: DateTime<Utc>,

    /// Length in seconds
    pub duration: f64,

    /// Upstream popularity signal (passthrough)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,

    /// Clip title, whitespace-normalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Start offset in seconds into `source_video_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vod_offset: Option<f64>,

    /// Archival recording this clip was cut from, when still resolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_video_id: Option<String>,

    /// Transcript text attached by the transcription stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,

    /// Word-level timings attached by the transcription stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_timings: Option<Vec<WordTiming>>,
}

impl ClipRecord {
    /// Create a record with the always-present fields.
    pub fn new(
        location: impl Into<PathBuf>,
        source_stream_id: impl Into<String>,
        source_stream_name: impl Into<String>,
        captured_at: DateTime<Utc>,
        duration: f64,
    ) -> Self {
        Self {
            location: location.into(),
            id: None,
            source_stream_id: source_stream_id.into(),
            game_id: None,
            source_stream_name: source_stream_name.into(),
            captured_at,
            duration,
            view_count: None,
            title: None,
            vod_offset: None,
            source_video_id: None,
            transcript: None,
            word_timings: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn with_view_count(mut self, view_count: u64) -> Self {
        self.view_count = Some(view_count);
        self
    }

    /// Set the title. Whitespace runs collapse to a single space.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = normalize_title(title);
        self
    }

    /// Attach the archival recording this clip was cut from.
    pub fn with_source_video(mut self, source_video_id: impl Into<String>) -> Self {
        self.source_video_id = Some(source_video_id.into());
        self
    }

    /// Attach the archival recording together with the clip's offset into it.
    pub fn with_vod(mut self, source_video_id: impl Into<String>, vod_offset: f64) -> Self {
        self.source_video_id = Some(source_video_id.into());
        self.vod_offset = Some(vod_offset);
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>, words: Vec<WordTiming>) -> Self {
        self.transcript = Some(transcript.into());
        self.word_timings = Some(words);
        self
    }

    /// Offset into the archival recording where this clip ends.
    pub fn vod_end(&self) -> Option<f64> {
        self.vod_offset.map(|offset| offset + self.duration)
    }

    /// Whether the record can be ordered by its position in a shared recording.
    pub fn has_vod_position(&self) -> bool {
        self.source_video_id.is_some() && self.vod_offset.is_some()
    }

    /// File name prefix used when naming merge products derived from this clip.
    ///
    /// Downloaded clips are named `<channel>_<clip id>.mp4`, so the prefix is
    /// everything before the first underscore of the file stem.
    pub fn file_prefix(&self) -> &str {
        let stem = self
            .location
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip");
        match stem.split_once('_') {
            Some((prefix, _)) if !prefix.is_empty() => prefix,
            _ => stem,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

/// Collapse whitespace runs in a free-text field.
///
/// Returns `None` for titles that are empty after normalization.
pub fn normalize_title(title: &str) -> Option<String> {
    let normalized = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
