//! File-backed clip store.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use clipmerge_models::ClipRecord;

use crate::codec::{canonical_line, decode_record, encode_record};
use crate::error::{StoreError, StoreResult};

/// Counts from a [`ClipStore::rewrite`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Lines dropped because they matched a removed record
    pub removed: usize,
    /// Records appended
    pub added: usize,
    /// Added records that were already present
    pub already_present: usize,
}

/// A line-oriented clip record collection on disk.
#[derive(Debug, Clone)]
pub struct ClipStore {
    path: PathBuf,
}

impl ClipStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every parsable record in file order.
    ///
    /// A missing or unreadable-as-text file yields no records. Lines that
    /// cannot be parsed are skipped with a warning.
    pub fn load(&self) -> StoreResult<Vec<ClipRecord>> {
        match self.read_content() {
            Ok(content) => Ok(self.parse(&content)),
            Err(StoreError::NotFound(_)) => {
                debug!(store = %self.path.display(), "Store missing, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`load`](Self::load), but a missing file is an error.
    pub fn load_required(&self) -> StoreResult<Vec<ClipRecord>> {
        let content = self.read_content()?;
        Ok(self.parse(&content))
    }

    /// Remove `removed` and append any of `added` not already present, in one atomic write.
    ///
    /// Safe to repeat with the same arguments: records already removed are
    /// skipped and records already added are not duplicated. Lines that do
    /// not parse are carried over untouched.
    pub fn rewrite(
        &self,
        removed: &[ClipRecord],
        added: &[ClipRecord],
    ) -> StoreResult<RewriteSummary> {
        let content = match self.read_content() {
            Ok(content) => content,
            Err(StoreError::NotFound(_)) => String::new(),
            Err(e) => return Err(e),
        };

        let removed_lines: HashSet<String> = removed.iter().map(encode_record).collect();
        let mut summary = RewriteSummary::default();
        let mut kept: Vec<String> = Vec::new();
        let mut present: HashSet<String> = HashSet::new();

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match canonical_line(line) {
                Some(canonical) if removed_lines.contains(&canonical) => summary.removed += 1,
                Some(canonical) => {
                    present.insert(canonical);
                    kept.push(line.to_string());
                }
                None => kept.push(line.to_string()),
            }
        }

        for record in added {
            let line = encode_record(record);
            if present.insert(line.clone()) {
                kept.push(line);
                summary.added += 1;
            } else {
                summary.already_present += 1;
            }
        }

        self.write_lines(&kept)?;

        debug!(
            store = %self.path.display(),
            removed = summary.removed,
            added = summary.added,
            already_present = summary.already_present,
            "Store rewritten"
        );

        Ok(summary)
    }

    /// Append records to the end of the store, creating it if needed.
    pub fn append(&self, records: &[ClipRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let needs_newline = match fs::read(&self.path) {
            Ok(bytes) => bytes.last().is_some_and(|&b| b != b'\n'),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut buf = String::new();
        if needs_newline {
            buf.push('\n');
        }
        for record in records {
            buf.push_str(&encode_record(record));
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Atomically replace the whole store with `records`.
    pub fn replace_all(&self, records: &[ClipRecord]) -> StoreResult<()> {
        let lines: Vec<String> = records.iter().map(encode_record).collect();
        self.write_lines(&lines)
    }

    fn read_content(&self) -> StoreResult<String> {
        match fs::read(&self.path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => Ok(content),
                Err(e) => {
                    warn!(
                        store = %self.path.display(),
                        "Store is not valid UTF-8, decoding lossily: {}", e
                    );
                    Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn parse(&self, content: &str) -> Vec<ClipRecord> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(idx, line)| match decode_record(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        store = %self.path.display(),
                        line = idx + 1,
                        "Skipping unparsable record: {}", e
                    );
                    None
                }
            })
            .collect()
    }

    /// Write through a temporary sibling and rename it over the store.
    fn write_lines(&self, lines: &[String]) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        for line in lines {
            tmp.write_all(line.as_bytes())?;
            tmp.write_all(b"\n")?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}
