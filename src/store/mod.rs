//! On-disk persistence for the clipboard history
//!
//! The history is stored as a pretty-printed JSON manifest plus one PNG
//! file per image entry, named `<timestamp>.png` inside an `images`
//! subdirectory of the cache path. Image bytes never live in the manifest.
//!
//! Every per-entry disk operation is independently fault-tolerant: one
//! unreadable image degrades that entry only, and a malformed manifest
//! degrades the load to an empty history. Nothing here is fatal.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::history::{Entry, EntryKind, History};

/// Manifest filename inside the cache directory.
const MANIFEST_FILE: &str = "history.json";

/// Subdirectory holding externalized image payloads.
const IMAGES_DIR: &str = "images";

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Cache directories could not be created
    #[error("failed to create store directories: {0}")]
    CreateDirs(#[source] io::Error),

    /// Manifest could not be serialized
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Manifest could not be written to disk
    #[error("failed to write manifest: {0}")]
    WriteManifest(#[source] io::Error),
}

/// One entry record in the JSON manifest. Image payloads are referenced
/// through `imagePath`, never embedded.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestRecord {
    #[serde(rename = "type")]
    kind: EntryKind,
    content: Option<String>,
    timestamp: i64,
    #[serde(rename = "imagePath", default)]
    image_path: Option<PathBuf>,
}

impl From<&Entry> for ManifestRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            kind: entry.kind,
            content: entry.content.clone(),
            timestamp: entry.timestamp,
            image_path: entry.image_path.clone(),
        }
    }
}

/// Reads and writes the history manifest and its image files.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    manifest_path: PathBuf,
    images_dir: PathBuf,
}

impl HistoryStore {
    /// Create a store rooted at `cache_dir`. No I/O happens until the
    /// first load or save.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        Self {
            manifest_path: cache_dir.join(MANIFEST_FILE),
            images_dir: cache_dir.join(IMAGES_DIR),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.images_dir)
    }

    /// Load the persisted history, rehydrating image payloads from disk.
    ///
    /// A missing manifest yields an empty history. A malformed manifest is
    /// logged and also yields an empty history rather than an error. An
    /// image entry whose backing file is missing or unreadable keeps its
    /// path but gets an empty payload; one bad file never discards the
    /// rest of the history.
    pub fn load(&self, max_size: usize) -> History {
        let raw = match fs::read(&self.manifest_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return History::new(max_size),
            Err(e) => {
                warn!("failed to read {}: {}", self.manifest_path.display(), e);
                return History::new(max_size);
            }
        };

        let records: Vec<ManifestRecord> = match serde_json::from_slice(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "malformed manifest {}, starting with empty history: {}",
                    self.manifest_path.display(),
                    e
                );
                return History::new(max_size);
            }
        };

        let entries = records.into_iter().map(|r| self.rehydrate(r)).collect();
        History::from_entries(entries, max_size)
    }

    fn rehydrate(&self, record: ManifestRecord) -> Entry {
        let payload = match (record.kind, &record.image_path) {
            (EntryKind::Image, Some(path)) => match fs::read(path) {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    warn!("failed to load image {}: {}", path.display(), e);
                    Bytes::new()
                }
            },
            _ => Bytes::new(),
        };

        Entry {
            kind: record.kind,
            content: record.content,
            payload,
            image_path: record.image_path,
            timestamp: record.timestamp,
        }
    }

    /// Persist the history.
    ///
    /// Image entries without an `image_path` have their payload written to
    /// `images/<timestamp>.png` first and the path recorded on the entry,
    /// so repeated saves never re-write unchanged image files. The
    /// manifest itself is written to a temp file and renamed into place;
    /// a crash mid-write leaves the previous manifest intact.
    ///
    /// A failed image write is logged and that entry is persisted without
    /// a path; only a failed manifest write surfaces as an error, and the
    /// in-memory history stays valid either way.
    pub fn save(&self, history: &mut History) -> Result<(), StoreError> {
        self.ensure_dirs().map_err(StoreError::CreateDirs)?;

        for entry in history.entries_mut() {
            if entry.is_image() && entry.image_path.is_none() && !entry.payload.is_empty() {
                let path = self.images_dir.join(format!("{}.png", entry.timestamp));
                match fs::write(&path, &entry.payload) {
                    Ok(()) => entry.image_path = Some(path),
                    Err(e) => warn!("failed to write image {}: {}", path.display(), e),
                }
            }
        }

        let records: Vec<ManifestRecord> =
            history.entries().iter().map(ManifestRecord::from).collect();
        let json = serde_json::to_vec_pretty(&records)?;

        let tmp_path = self.manifest_path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).map_err(StoreError::WriteManifest)?;
        fs::rename(&tmp_path, &self.manifest_path).map_err(StoreError::WriteManifest)?;

        debug!(
            "saved {} entries to {}",
            records.len(),
            self.manifest_path.display()
        );
        Ok(())
    }

    /// Delete every file in the images directory not referenced by
    /// `history`. Run after [`HistoryStore::save`] at teardown, never
    /// concurrently with it.
    pub fn reconcile_orphans(&self, history: &History) {
        let referenced: HashSet<&Path> = history
            .entries()
            .iter()
            .filter_map(|e| e.image_path.as_deref())
            .collect();

        let reader = match fs::read_dir(&self.images_dir) {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("failed to list {}: {}", self.images_dir.display(), e);
                return;
            }
        };

        for dir_entry in reader.flatten() {
            let path = dir_entry.path();
            if referenced.contains(path.as_path()) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!("removed orphaned image {}", path.display()),
                Err(e) => warn!("failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_record_shape() {
        let entry = Entry::text("hello", 1234);
        let record = ManifestRecord::from(&entry);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["timestamp"], 1234);
        assert_eq!(json["imagePath"], serde_json::Value::Null);
    }

    #[test]
    fn manifest_record_image_shape() {
        let mut entry = Entry::image(Bytes::from_static(b"png"), 99);
        entry.image_path = Some(PathBuf::from("/tmp/images/99.png"));
        let json = serde_json::to_value(ManifestRecord::from(&entry)).unwrap();

        assert_eq!(json["type"], "image");
        assert_eq!(json["content"], serde_json::Value::Null);
        assert_eq!(json["imagePath"], "/tmp/images/99.png");
        // Payload bytes never appear in the manifest.
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn manifest_record_parses_without_image_path() {
        let record: ManifestRecord =
            serde_json::from_str(r#"{"type":"text","content":"x","timestamp":1}"#).unwrap();
        assert_eq!(record.kind, EntryKind::Text);
        assert!(record.image_path.is_none());
    }
}
