//! View settings remembered across sessions, one entry per document id.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::{DocumentId, DocumentInfo};
use crate::geometry::Rotation;
use crate::layout::ZoomMode;
use crate::view::{MAX_ZOOM, MIN_ZOOM};

const STATE_FILE: &str = "views.json";

/// Documents remembered; the least recently saved fall off first.
pub const MAX_REMEMBERED: usize = 64;

/// View settings restored when a document is reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedViewState {
    pub page: usize,
    pub zoom: f64,
    pub zoom_mode: ZoomMode,
    pub rotation: Rotation,
}

impl Default for PersistedViewState {
    fn default() -> Self {
        Self {
            page: 0,
            zoom: 1.0,
            zoom_mode: ZoomMode::default(),
            rotation: Rotation::default(),
        }
    }
}

impl PersistedViewState {
    /// Fits a remembered state to a document with `page_count` pages.
    pub fn sanitized(mut self, page_count: usize) -> Self {
        self.page = self.page.min(page_count.saturating_sub(1));
        self.zoom = if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RememberedView {
    id: DocumentId,
    path: PathBuf,
    page_count: usize,
    state: PersistedViewState,
}

/// Most recently saved first.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RememberedViews {
    #[serde(default)]
    views: Vec<RememberedView>,
}

impl RememberedViews {
    fn lookup(&self, doc: &DocumentInfo) -> Option<PersistedViewState> {
        let view = self.views.iter().find(|view| view.id == doc.id)?;
        if view.page_count != doc.page_count {
            debug!(
                id = %doc.id,
                saved = view.page_count,
                current = doc.page_count,
                "page count changed since view state was saved"
            );
        }
        Some(view.state.clone().sanitized(doc.page_count))
    }

    fn remember(&mut self, doc: &DocumentInfo, state: &PersistedViewState) {
        self.views.retain(|view| view.id != doc.id);
        self.views.insert(
            0,
            RememberedView {
                id: doc.id,
                path: doc.path.clone(),
                page_count: doc.page_count,
                state: state.clone(),
            },
        );
        self.views.truncate(MAX_REMEMBERED);
    }
}

pub trait StateStore: Send + Sync {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedViewState>>;
    fn save(&self, doc: &DocumentInfo, state: &PersistedViewState) -> Result<()>;
}

/// Keeps every remembered view in one JSON file under `root`.
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self {
            path: root.join(STATE_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RememberedViews> {
        if !self.path.exists() {
            return Ok(RememberedViews::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read state file {:?}", self.path))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode state file {:?}", self.path))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedViewState>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.lookup(doc))
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedViewState) -> Result<()> {
        let _guard = self.lock.lock();
        let mut views = self.read().unwrap_or_else(|err| {
            warn!(?err, "discarding unreadable view state");
            RememberedViews::default()
        });
        views.remember(doc, state);
        write_json_atomic(&self.path, &views)
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<RememberedViews>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedViewState>> {
        Ok(self.inner.lock().lookup(doc))
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedViewState) -> Result<()> {
        self.inner.lock().remember(doc, state);
        Ok(())
    }
}

/// Writes `value` next to `path` and renames it into place, so readers
/// never see a partial file.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to encode {:?}", path))?;
    let mut file =
        File::create(&tmp).with_context(|| format!("failed to open temp file {:?}", tmp))?;
    file.write_all(payload.as_bytes())?;
    file.flush()?;
    fs::rename(&tmp, path).with_context(|| format!("failed to move {:?} into place", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{document_id_for_path, DocumentMetadata};
    use tempfile::tempdir;

    fn info_for(path: PathBuf, page_count: usize) -> DocumentInfo {
        DocumentInfo {
            id: document_id_for_path(&path),
            path,
            page_count,
            metadata: DocumentMetadata::default(),
        }
    }

    #[test]
    fn file_store_keeps_every_document_in_one_file() {
        let dir = tempdir().unwrap();
        let first = info_for(dir.path().join("a.pdf"), 3);
        let second = info_for(dir.path().join("b.pdf"), 9);

        let store = FileStateStore::new(dir.path().join("state")).unwrap();
        assert!(store.load(&first).unwrap().is_none());

        let state = PersistedViewState {
            page: 2,
            zoom: 1.5,
            zoom_mode: ZoomMode::FitWidth,
            rotation: Rotation::Rotate270,
        };
        store.save(&first, &state).unwrap();
        store
            .save(
                &second,
                &PersistedViewState {
                    page: 8,
                    ..PersistedViewState::default()
                },
            )
            .unwrap();

        let reopened = FileStateStore::new(dir.path().join("state")).unwrap();
        assert_eq!(reopened.load(&first).unwrap(), Some(state));
        assert_eq!(reopened.load(&second).unwrap().map(|s| s.page), Some(8));
        assert!(reopened.path().exists());
        assert!(!reopened.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn restored_state_is_fitted_to_document() {
        let store = MemoryStateStore::new();
        let saved = info_for(PathBuf::from("/tmp/shrunk.pdf"), 10);
        store
            .save(
                &saved,
                &PersistedViewState {
                    page: 9,
                    zoom: 250.0,
                    ..PersistedViewState::default()
                },
            )
            .unwrap();

        let shrunk = DocumentInfo {
            page_count: 4,
            ..saved
        };
        let restored = store.load(&shrunk).unwrap().unwrap();
        assert_eq!(restored.page, 3);
        assert_eq!(restored.zoom, MAX_ZOOM);

        let broken = PersistedViewState {
            zoom: f64::NAN,
            ..PersistedViewState::default()
        };
        assert_eq!(broken.sanitized(1).zoom, 1.0);
    }

    #[test]
    fn oldest_views_are_forgotten() {
        let store = MemoryStateStore::new();
        let docs: Vec<_> = (0..=MAX_REMEMBERED)
            .map(|n| info_for(PathBuf::from(format!("/tmp/doc-{n}.pdf")), 1))
            .collect();
        for doc in &docs {
            store.save(doc, &PersistedViewState::default()).unwrap();
        }
        assert!(store.load(&docs[0]).unwrap().is_none());
        assert!(store.load(&docs[1]).unwrap().is_some());

        // saving again moves a document to the front
        store.save(&docs[1], &PersistedViewState::default()).unwrap();
        store
            .save(
                &info_for(PathBuf::from("/tmp/late.pdf"), 1),
                &PersistedViewState::default(),
            )
            .unwrap();
        assert!(store.load(&docs[1]).unwrap().is_some());
        assert!(store.load(&docs[2]).unwrap().is_none());
    }

    #[test]
    fn corrupt_state_file_is_replaced_on_save() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();
        let doc = info_for(dir.path().join("c.pdf"), 2);

        assert!(store.load(&doc).is_err());
        store.save(&doc, &PersistedViewState::default()).unwrap();
        assert!(store.load(&doc).unwrap().is_some());
    }

    #[test]
    fn state_file_uses_readable_encoding() {
        let encoded = serde_json::to_value(PersistedViewState {
            rotation: Rotation::Rotate90,
            zoom_mode: ZoomMode::FitHeight,
            ..PersistedViewState::default()
        })
        .unwrap();
        assert_eq!(encoded["rotation"], 90);
        assert_eq!(encoded["zoom_mode"], "fit-height");

        let partial: PersistedViewState = serde_json::from_str(r#"{"page": 4}"#).unwrap();
        assert_eq!(partial.page, 4);
        assert_eq!(partial.zoom, 1.0);
    }
}
