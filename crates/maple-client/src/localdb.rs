//! The local database
//!
//! A JSON file tracking what this device knows: per-record versions for
//! reconciliation, the decrypted-name cache (names are ciphertext in the
//! cloud), per-file lock state, sync cursors, and persisted upload
//! intents so a crash mid-upload resumes idempotently.

use crate::{ClientError, Result};
use maple_core::{
    sync::SyncCursor,
    types::{CollectionState, FileState},
    Oid,
};
use maple_crypto::envelope::WrappedKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Local view of a collection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalCollection {
    pub id: Oid,
    pub version: u64,
    pub state: CollectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Oid>,
    /// Decrypted name; only ever stored locally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The owner's key envelope, cached so a tombstoned collection can be
    /// restored with its original key (the cloud strips it on delete).
    /// Ciphertext, so safe at rest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_collection_key: Option<WrappedKey>,
}

/// Local view of a file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalFile {
    pub id: Oid,
    pub collection_id: Oid,
    pub version: u64,
    pub state: FileState,
    /// Decrypted name; only ever stored locally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Locked files keep no plaintext cache on disk
    #[serde(default)]
    pub locked: bool,
    /// Where the decrypted content is cached, when unlocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext_path: Option<PathBuf>,
}

/// A persisted intent to finish an interrupted upload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadIntent {
    pub file_id: Oid,
    pub collection_id: Oid,
    pub source_path: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct LocalState {
    #[serde(default)]
    collections: HashMap<Oid, LocalCollection>,
    #[serde(default)]
    files: HashMap<Oid, LocalFile>,
    #[serde(default)]
    upload_intents: Vec<UploadIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection_cursor: Option<SyncCursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_cursor: Option<SyncCursor>,
}

/// The JSON-file local database
pub struct LocalStore {
    path: PathBuf,
    state: LocalState,
}

impl LocalStore {
    /// Load the database, starting empty when the file is absent
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| ClientError::LocalState(format!("corrupt local database: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocalState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, state })
    }

    /// Persist the database
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==================== Collections ====================

    pub fn collection(&self, id: Oid) -> Option<&LocalCollection> {
        self.state.collections.get(&id)
    }

    pub fn collections(&self) -> impl Iterator<Item = &LocalCollection> {
        self.state.collections.values()
    }

    pub fn upsert_collection(&mut self, collection: LocalCollection) {
        self.state.collections.insert(collection.id, collection);
    }

    pub fn remove_collection(&mut self, id: Oid) {
        self.state.collections.remove(&id);
    }

    // ==================== Files ====================

    pub fn file(&self, id: Oid) -> Option<&LocalFile> {
        self.state.files.get(&id)
    }

    pub fn file_mut(&mut self, id: Oid) -> Option<&mut LocalFile> {
        self.state.files.get_mut(&id)
    }

    pub fn files(&self) -> impl Iterator<Item = &LocalFile> {
        self.state.files.values()
    }

    pub fn upsert_file(&mut self, file: LocalFile) {
        self.state.files.insert(file.id, file);
    }

    pub fn remove_file(&mut self, id: Oid) {
        self.state.files.remove(&id);
    }

    // ==================== Upload intents ====================

    pub fn push_upload_intent(&mut self, intent: UploadIntent) {
        self.state.upload_intents.push(intent);
    }

    pub fn pop_upload_intent(&mut self, file_id: Oid) {
        self.state.upload_intents.retain(|i| i.file_id != file_id);
    }

    pub fn upload_intents(&self) -> &[UploadIntent] {
        &self.state.upload_intents
    }

    // ==================== Cursors ====================

    pub fn collection_cursor(&self) -> Option<SyncCursor> {
        self.state.collection_cursor
    }

    pub fn set_collection_cursor(&mut self, cursor: Option<SyncCursor>) {
        self.state.collection_cursor = cursor;
    }

    pub fn file_cursor(&self) -> Option<SyncCursor> {
        self.state.file_cursor
    }

    pub fn set_file_cursor(&mut self, cursor: Option<SyncCursor>) {
        self.state.file_cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("state.json")).unwrap();
        assert_eq!(store.collections().count(), 0);
        assert!(store.collection_cursor().is_none());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = LocalStore::open(&path).unwrap();
        let id = Oid::new();
        store.upsert_collection(LocalCollection {
            id,
            version: 3,
            state: CollectionState::Active,
            parent_id: None,
            name: Some("Photos".to_string()),
            encrypted_collection_key: None,
        });
        store.set_collection_cursor(Some(SyncCursor {
            last_modified: chrono::Utc::now(),
            last_id: id,
        }));
        store.save().unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.collection(id).unwrap().version, 3);
        assert_eq!(reopened.collection(id).unwrap().name.as_deref(), Some("Photos"));
        assert_eq!(reopened.collection_cursor().unwrap().last_id, id);
    }

    #[test]
    fn test_upload_intents_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = LocalStore::open(&path).unwrap();
        let file_id = Oid::new();
        store.push_upload_intent(UploadIntent {
            file_id,
            collection_id: Oid::new(),
            source_path: PathBuf::from("/tmp/img.jpg"),
            created_at: chrono::Utc::now(),
        });
        store.save().unwrap();

        let mut reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.upload_intents().len(), 1);
        reopened.pop_upload_intent(file_id);
        assert!(reopened.upload_intents().is_empty());
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            LocalStore::open(&path),
            Err(ClientError::LocalState(_))
        ));
    }
}
