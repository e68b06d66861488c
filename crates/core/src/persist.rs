//! Auto-save snapshots
//!
//! A snapshot of editor-layer state (annotations, current page, derived
//! text runs) is written to a local JSON store keyed by the source
//! filename, and offered for recovery the next time the same file is
//! opened. Local-only; nothing leaves the machine.

use crate::annotation::Annotation;
use crate::text_index::TextRun;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Editor state captured for recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub annotations: Vec<Annotation>,
    /// Unix timestamp (seconds) of capture
    pub timestamp: i64,
    /// 1-based page the user was on
    pub page_number: u32,
    /// Derived text runs by page number
    pub text_runs: HashMap<u32, Vec<TextRun>>,
}

impl Snapshot {
    pub fn new(
        annotations: Vec<Annotation>,
        page_number: u32,
        text_runs: HashMap<u32, Vec<TextRun>>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self {
            annotations,
            timestamp,
            page_number,
            text_runs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u32,
    snapshot: Snapshot,
}

/// Filesystem-backed snapshot store
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn from_default_project() -> Result<Self, PersistError> {
        let dirs = ProjectDirs::from("dev", "PdfStudio", "PdfStudio")
            .ok_or(PersistError::NoDataDirectory)?;
        Ok(Self {
            root: dirs.data_local_dir().join("autosave"),
        })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the snapshot for a source filename
    pub fn save(&self, source_name: &str, snapshot: &Snapshot) -> Result<(), PersistError> {
        fs::create_dir_all(&self.root)?;
        let envelope = SnapshotEnvelope {
            version: SNAPSHOT_SCHEMA_VERSION,
            snapshot: snapshot.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.snapshot_path(source_name), bytes)?;
        Ok(())
    }

    /// Read back the snapshot for a source filename, if one exists
    ///
    /// Unreadable or wrong-version snapshots are treated as absent.
    pub fn load(&self, source_name: &str) -> Result<Option<Snapshot>, PersistError> {
        let path = self.snapshot_path(source_name);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path)?;
        let envelope: SnapshotEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!("discarding unreadable auto-save snapshot: {err}");
                return Ok(None);
            }
        };
        if envelope.version != SNAPSHOT_SCHEMA_VERSION {
            return Ok(None);
        }
        Ok(Some(envelope.snapshot))
    }

    /// Remove the snapshot for a source filename
    pub fn clear(&self, source_name: &str) -> Result<(), PersistError> {
        let path = self.snapshot_path(source_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn snapshot_path(&self, source_name: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", sanitize_file_name(source_name)))
    }
}

/// Make a filename safe for use as a store key
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .replace("..", "")
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            _ => ch,
        })
        .collect();
    cleaned.chars().take(255).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, AnnotationKind, Color, Rect};
    use crate::text_index::RunId;

    fn sample_snapshot() -> Snapshot {
        let annotation = Annotation::new(
            1,
            AnnotationKind::Highlight {
                rect: Rect::new(10.0, 10.0, 50.0, 12.0),
                color: Color::YELLOW,
            },
        );
        let run = TextRun {
            id: RunId { page: 1, ordinal: 0 },
            page: 1,
            text: "Hello".to_string(),
            x: 72.0,
            y: 700.0,
            width: 50.0,
            height: 12.0,
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
        };
        let mut text_runs = HashMap::new();
        text_runs.insert(1, vec![run]);
        Snapshot::new(vec![annotation], 1, text_runs)
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SnapshotStore::with_root(temp.path());
        let snapshot = sample_snapshot();

        store.save("report.pdf", &snapshot).expect("save should succeed");
        let loaded = store
            .load("report.pdf")
            .expect("load should succeed")
            .expect("snapshot should exist");

        assert_eq!(loaded.page_number, 1);
        assert_eq!(loaded.annotations.len(), 1);
        assert_eq!(loaded.text_runs[&1][0].text, "Hello");
        assert_eq!(loaded.timestamp, snapshot.timestamp);
    }

    #[test]
    fn test_load_absent_snapshot() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SnapshotStore::with_root(temp.path());

        assert!(store.load("missing.pdf").expect("load should succeed").is_none());
    }

    #[test]
    fn test_snapshots_keyed_by_filename() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SnapshotStore::with_root(temp.path());
        let snapshot = sample_snapshot();

        store.save("a.pdf", &snapshot).unwrap();
        assert!(store.load("a.pdf").unwrap().is_some());
        assert!(store.load("b.pdf").unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_snapshot() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SnapshotStore::with_root(temp.path());

        store.save("a.pdf", &sample_snapshot()).unwrap();
        store.clear("a.pdf").unwrap();
        assert!(store.load("a.pdf").unwrap().is_none());

        // Clearing twice is fine.
        store.clear("a.pdf").unwrap();
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = SnapshotStore::with_root(temp.path());

        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join("bad.pdf.json"), b"{ not json").unwrap();

        assert!(store.load("bad.pdf").unwrap().is_none());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b\\c.pdf"), "a_b_c.pdf");
        assert_eq!(sanitize_file_name("../../etc"), "__etc");
        assert_eq!(sanitize_file_name("plain.pdf"), "plain.pdf");
    }
}
