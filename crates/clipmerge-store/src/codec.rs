//! Line codec for clip records.
//!
//! The title is the only free-text field. It sits between eight fixed fields
//! on the left and two on the right, so it is recovered by splitting from both
//! ends and may itself contain the delimiter. Other fields never contain it:
//! delimiters and line breaks in them are replaced on encode.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::path::PathBuf;

use clipmerge_models::{normalize_title, ClipRecord};

use crate::error::{StoreError, StoreResult};

/// Field separator.
pub const DELIMITER: char = ',';

/// Number of fields per record.
pub const FIELD_COUNT: usize = 11;

/// Fields before the title.
const LEADING_FIELDS: usize = 8;

/// Fields after the title.
const TRAILING_FIELDS: usize = 2;

/// Legacy writers spelled absent values this way.
const LEGACY_NONE: &str = "None";

/// Serialize a record to a single line (without the terminating newline).
pub fn encode_record(record: &ClipRecord) -> String {
    let fields = [
        fixed(&record.location.to_string_lossy()),
        optional(record.id.as_deref()),
        fixed(&record.source_stream_id),
        optional(record.game_id.as_deref()),
        fixed(&record.source_stream_name),
        record
            .captured_at
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        record.duration.to_string(),
        record.view_count.map(|v| v.to_string()).unwrap_or_default(),
        record
            .title
            .as_deref()
            .and_then(normalize_title)
            .unwrap_or_default(),
        record.vod_offset.map(|v| v.to_string()).unwrap_or_default(),
        optional(record.source_video_id.as_deref()),
    ];
    fields.join(&DELIMITER.to_string())
}

/// Parse a single line into a record.
pub fn decode_record(line: &str) -> StoreResult<ClipRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(StoreError::malformed("empty line"));
    }

    let mut leading: Vec<&str> = line.splitn(LEADING_FIELDS + 1, DELIMITER).collect();
    if leading.len() != LEADING_FIELDS + 1 {
        return Err(StoreError::malformed(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            leading.len()
        )));
    }
    let rest = leading.pop().unwrap_or_default();

    let mut trailing: Vec<&str> = rest.rsplitn(TRAILING_FIELDS + 1, DELIMITER).collect();
    if trailing.len() != TRAILING_FIELDS + 1 {
        return Err(StoreError::malformed(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            LEADING_FIELDS + trailing.len()
        )));
    }
    trailing.reverse();
    let (title, vod_offset, source_video_id) = (trailing[0], trailing[1], trailing[2]);

    let location = leading[0].trim();
    if location.is_empty() {
        return Err(StoreError::malformed("missing location"));
    }

    let duration = parse_f64(leading[6], "duration")?
        .ok_or_else(|| StoreError::malformed("missing duration"))?;
    if duration <= 0.0 {
        return Err(StoreError::malformed(format!(
            "duration must be positive, got {}",
            duration
        )));
    }

    let view_count = match present(leading[7]) {
        Some(v) => Some(
            v.parse::<u64>()
                .map_err(|_| StoreError::malformed(format!("invalid view count '{}'", v)))?,
        ),
        None => None,
    };

    let source_video_id = present(source_video_id).map(str::to_string);
    let vod_offset = match parse_f64(vod_offset, "vod offset")? {
        Some(offset) if offset < 0.0 => {
            return Err(StoreError::malformed(format!(
                "vod offset must not be negative, got {}",
                offset
            )))
        }
        // An offset is meaningless without the recording it points into
        Some(_) if source_video_id.is_none() => None,
        other => other,
    };

    Ok(ClipRecord {
        location: PathBuf::from(location),
        id: present(leading[1]).map(str::to_string),
        source_stream_id: leading[2].trim().to_string(),
        game_id: present(leading[3]).map(str::to_string),
        source_stream_name: leading[4].trim().to_string(),
        captured_at: parse_timestamp(leading[5])?,
        duration,
        view_count,
        title: present(title).and_then(normalize_title),
        vod_offset,
        source_video_id,
        transcript: None,
        word_timings: None,
    })
}

/// Text used to compare records for rewrite purposes.
///
/// Two records are the same store entry when their serialized lines match,
/// so fields that are never persisted do not affect equality.
pub fn canonical_line(line: &str) -> Option<String> {
    decode_record(line).ok().map(|r| encode_record(&r))
}

fn fixed(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == DELIMITER || c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn optional(value: Option<&str>) -> String {
    value.map(fixed).unwrap_or_default()
}

fn present(field: &str) -> Option<&str> {
    let field = field.trim();
    if field.is_empty() || field == LEGACY_NONE {
        None
    } else {
        Some(field)
    }
}

fn parse_f64(field: &str, name: &str) -> StoreResult<Option<f64>> {
    match present(field) {
        Some(v) => match v.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(StoreError::malformed(format!("invalid {} '{}'", name, v))),
        },
        None => Ok(None),
    }
}

/// Parse RFC 3339, falling back to the space-separated form older writers used.
fn parse_timestamp(field: &str) -> StoreResult<DateTime<Utc>> {
    let field = field.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(field) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(field, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(field, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(ts.and_utc());
    }
    Err(StoreError::malformed(format!("invalid timestamp '{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap()
    }

    fn full_record() -> ClipRecord {
        ClipRecord::new("clips/streamer_abc.mp4", "1234", "streamer", captured(), 29.97)
            .with_id("abc")
            .with_game_id("509658")
            .with_view_count(4210)
            .with_title("clutch, then   the\tcomeback , gg")
            .with_vod("v998877", 1234.5)
    }

    #[test]
    fn test_round_trip_full_record() {
        let record = full_record();
        let line = encode_record(&record);
        assert_eq!(line.matches(DELIMITER).count(), FIELD_COUNT - 1 + 2);

        let decoded = decode_record(&line).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.title.as_deref(), Some("clutch, then the comeback , gg"));
    }

    #[test]
    fn test_round_trip_minimal_record() {
        let record = ClipRecord::new("a.mp4", "1", "s", captured(), 12.0);
        let line = encode_record(&record);
        assert_eq!(line, "a.mp4,,1,,s,2024-03-01T18:30:00Z,12,,,,");
        assert_eq!(decode_record(&line).unwrap(), record);
    }

    #[test]
    fn test_round_trip_fractional_values() {
        let record = ClipRecord::new("a.mp4", "1", "s", captured(), 0.1 + 0.2)
            .with_vod("v", 1.0 / 3.0);
        assert_eq!(decode_record(&encode_record(&record)).unwrap(), record);

        let precise = Utc.timestamp_opt(1_709_317_800, 123_456_789).unwrap();
        let record = ClipRecord::new("a.mp4", "1", "s", precise, 1.0);
        assert_eq!(decode_record(&encode_record(&record)).unwrap(), record);
    }

    #[test]
    fn test_title_whitespace_is_normalized() {
        let line = "a.mp4,,1,,s,2024-03-01T18:30:00Z,12,,  so \t  close ,,";
        let record = decode_record(line).unwrap();
        assert_eq!(record.title.as_deref(), Some("so close"));
    }

    #[test]
    fn test_legacy_spacing_and_none() {
        let line = "a.mp4, abc, 1, None, streamer, 2024-03-01 18:30:00+00:00, 30.0, None, None, None, None";
        let record = decode_record(line).unwrap();
        assert_eq!(record.id.as_deref(), Some("abc"));
        assert_eq!(record.source_stream_name, "streamer");
        assert!(record.game_id.is_none());
        assert!(record.view_count.is_none());
        assert!(record.title.is_none());
        assert_eq!(record.captured_at, captured());
    }

    #[test]
    fn test_fixed_fields_never_carry_delimiters() {
        let record = ClipRecord::new("a.mp4", "1", "name, with comma", captured(), 5.0);
        let decoded = decode_record(&encode_record(&record)).unwrap();
        assert_eq!(decoded.source_stream_name, "name  with comma");
    }

    #[test]
    fn test_offset_without_video_is_dropped() {
        let line = "a.mp4,,1,,s,2024-03-01T18:30:00Z,12,,,40,";
        assert!(decode_record(line).unwrap().vod_offset.is_none());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(decode_record("").is_err());
        assert!(decode_record("a.mp4,1,2").is_err());
        assert!(decode_record("a.mp4,,1,,s,not-a-time,12,,,,").is_err());
        assert!(decode_record("a.mp4,,1,,s,2024-03-01T18:30:00Z,0,,,,").is_err());
        assert!(decode_record("a.mp4,,1,,s,2024-03-01T18:30:00Z,NaN,,,,").is_err());
        assert!(decode_record("a.mp4,,1,,s,2024-03-01T18:30:00Z,12,many,,,").is_err());
        assert!(decode_record("a.mp4,,1,,s,2024-03-01T18:30:00Z,12,,,-3,v").is_err());
        assert!(decode_record(",,1,,s,2024-03-01T18:30:00Z,12,,,,").is_err());
    }

    #[test]
    fn test_canonical_line_ignores_spacing() {
        let spaced = "a.mp4, , 1, , s, 2024-03-01T18:30:00Z, 12, , , , ";
        let tight = "a.mp4,,1,,s,2024-03-01T18:30:00Z,12,,,,";
        assert_eq!(canonical_line(spaced), canonical_line(tight));
        assert!(canonical_line("garbage").is_none());
    }
}
