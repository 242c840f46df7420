//! Line-oriented `.dat` files.
//!
//! ```text
//! = comment lines start with '='
//! Size=12
//! Locked==12          <- value text starting with '=' is read-only
//! Owner="Pat
//! ```
//!
//! Names in a file are relative to the prefix the file is opened under.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use crate::error::StoreError;

/// Prefix on a stored value text marking it read-only.
pub const READ_ONLY_MARKER: char = '=';

/// One `name=value` entry, with the read-only marker already split off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatafileEntry {
    pub name: String,
    pub value: String,
    pub editable: bool,
}

impl DatafileEntry {
    /// Parse the text to the right of `name=`.
    pub fn from_stored(name: impl Into<String>, stored: &str) -> Self {
        let (value, editable) = split_read_only(stored);
        Self {
            name: name.into(),
            value: value.to_string(),
            editable,
        }
    }

    /// The text written to the right of `name=`.
    pub fn stored_text(&self) -> String {
        stored_text(&self.value, self.editable)
    }
}

pub fn split_read_only(stored: &str) -> (&str, bool) {
    match stored.strip_prefix(READ_ONLY_MARKER) {
        Some(rest) => (rest, false),
        None => (stored, true),
    }
}

pub fn stored_text(value: &str, editable: bool) -> String {
    if editable {
        value.to_string()
    } else {
        format!("{READ_ONLY_MARKER}{value}")
    }
}

/// Read every entry from `reader`. Later duplicates replace earlier ones.
///
/// Lines that are not valid UTF-8 are decoded lossily. `path` only labels
/// errors and warnings.
pub fn read_entries(reader: impl BufRead, path: &Path) -> Result<Vec<DatafileEntry>, StoreError> {
    let mut entries: BTreeMap<String, DatafileEntry> = BTreeMap::new();
    for (index, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes?;
        let line = decode_line(&bytes, path, index + 1);
        if line.starts_with(READ_ONLY_MARKER) || line.trim().is_empty() {
            continue;
        }
        let (name, stored) = line
            .split_once('=')
            .ok_or_else(|| StoreError::InvalidDatafile {
                path: path.to_owned(),
                line: index + 1,
                reason: "missing '='".to_string(),
            })?;
        entries.insert(name.to_string(), DatafileEntry::from_stored(name, stored));
    }
    Ok(entries.into_values().collect())
}

fn decode_line(bytes: &[u8], path: &Path, line: usize) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => {
            warn!(path = %path.display(), line, "replacing invalid UTF-8 in datafile line");
            text
        }
    }
}

/// Write entries sorted by name to a sibling temp file, then rename it over
/// `path` so readers never see a partial file.
pub fn write_entries(path: &Path, entries: &[DatafileEntry]) -> Result<(), StoreError> {
    let mut sorted: Vec<&DatafileEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let temp = temp_path(path);
    {
        let file = std::fs::File::create(&temp)?;
        let mut out = BufWriter::new(file);
        for entry in sorted {
            writeln!(out, "{}={}", entry.name, entry.stored_text())?;
        }
        out.flush()?;
    }
    std::fs::rename(&temp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("tttt_{name}"))
}

/// A `.dat` file opened under a name prefix.
#[derive(Debug)]
pub struct Datafile {
    prefix: String,
    path: PathBuf,
    read_only: bool,
    dirty: AtomicU32,
}

impl Datafile {
    pub fn new(prefix: impl Into<String>, path: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
            read_only,
            dirty: AtomicU32::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Full repository name for a name relative to this file.
    pub fn qualify(&self, relative: &str) -> String {
        format!("{}/{}", self.prefix, relative)
    }

    /// Name relative to this file, if `name` lives under its prefix.
    pub fn relative<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(self.prefix.as_str())?.strip_prefix('/')
    }

    /// Count one modification. Returns true once the count passes
    /// `threshold`, resetting it.
    pub fn mark_modified(&self, threshold: u32) -> bool {
        let count = self.dirty.fetch_add(1, Ordering::AcqRel) + 1;
        if count > threshold {
            self.dirty.store(0, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn dirty_count(&self) -> u32 {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Result<Vec<DatafileEntry>, StoreError> {
        read_entries(text.as_bytes(), Path::new("test.dat"))
    }

    #[test]
    fn reads_entries_and_read_only_marker() {
        let entries = read("Size=12\nLocked==5\nOwner=\"Pat\n").unwrap();
        assert_eq!(entries.len(), 3);
        let locked = entries.iter().find(|e| e.name == "Locked").unwrap();
        assert_eq!(locked.value, "5");
        assert!(!locked.editable);
        let owner = entries.iter().find(|e| e.name == "Owner").unwrap();
        assert_eq!(owner.value, "\"Pat");
        assert!(owner.editable);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let entries = read("= a comment\n\n   \nA=1\n").unwrap();
        assert_eq!(entries, vec![DatafileEntry::from_stored("A", "1")]);
    }

    #[test]
    fn value_may_contain_equals() {
        let entries = read("Expr={[a] = [b]\n").unwrap();
        assert_eq!(entries[0].value, "{[a] = [b]");
    }

    #[test]
    fn missing_equals_reports_line() {
        let err = read("A=1\nbroken line\n").unwrap_err();
        match err {
            StoreError::InvalidDatafile { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_utf8_only_affects_its_line() {
        let bytes: &[u8] = b"A=1\r\nOwner=\"P\xFFt\nB=2\n";
        let entries = read_entries(bytes, Path::new("test.dat")).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], DatafileEntry::from_stored("A", "1"));
        assert_eq!(entries[1], DatafileEntry::from_stored("B", "2"));
        assert_eq!(entries[2].value, "\"P\u{FFFD}t");
    }

    #[test]
    fn later_duplicate_wins() {
        let entries = read("A=1\nA=2\n").unwrap();
        assert_eq!(entries, vec![DatafileEntry::from_stored("A", "2")]);
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proj.dat");
        let entries = vec![
            DatafileEntry::from_stored("B", "=2"),
            DatafileEntry::from_stored("A", "\"x"),
        ];
        write_entries(&path, &entries).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "A=\"x\nB==2\n");
        assert!(!dir.path().join("tttt_proj.dat").exists());
    }

    #[test]
    fn datafile_names() {
        let df = Datafile::new("/Proj", "/tmp/proj.dat", false);
        assert_eq!(df.qualify("Size"), "/Proj/Size");
        assert_eq!(df.relative("/Proj/Size"), Some("Size"));
        assert_eq!(df.relative("/Project/Size"), None);
        assert_eq!(df.relative("/Other/Size"), None);
    }

    #[test]
    fn dirty_threshold() {
        let df = Datafile::new("/P", "/tmp/p.dat", false);
        assert!(!df.mark_modified(2));
        assert!(!df.mark_modified(2));
        assert!(df.mark_modified(2));
        assert_eq!(df.dirty_count(), 0);
    }
}
