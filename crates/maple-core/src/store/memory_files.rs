//! In-memory file-record store

use crate::{
    oid::Oid,
    store::{past_cursor, FileStore},
    sync::SyncCursor,
    types::{FileRecord, FileState},
    tombstone_retention, CoreError, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory file-record store
#[derive(Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<RwLock<HashMap<Oid, FileRecord>>>,
}

impl MemoryFileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, any state
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn touch(file: &mut FileRecord) {
        file.version += 1;
        file.modified_at = Utc::now();
    }

    fn tombstone(file: &mut FileRecord) {
        Self::touch(file);
        file.state = FileState::Deleted;
        file.tombstone_version = file.version;
        file.tombstone_expiry = Some(Utc::now() + tombstone_retention());
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn insert(&self, file: FileRecord) -> Result<FileRecord> {
        let mut files = self.files.write();
        if files.contains_key(&file.id) {
            return Err(CoreError::Conflict(format!(
                "file id {} is already in use",
                file.id
            )));
        }
        files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn insert_many(&self, batch: Vec<FileRecord>) -> Result<Vec<FileRecord>> {
        let mut files = self.files.write();
        if let Some(dup) = batch.iter().find(|f| files.contains_key(&f.id)) {
            return Err(CoreError::Conflict(format!(
                "file id {} is already in use",
                dup.id
            )));
        }
        for file in &batch {
            files.insert(file.id, file.clone());
        }
        Ok(batch)
    }

    async fn get(&self, id: Oid) -> Result<FileRecord> {
        match self.files.read().get(&id) {
            Some(f) if f.visible() => Ok(f.clone()),
            _ => Err(CoreError::NotFound("file".to_string())),
        }
    }

    async fn get_any_state(&self, id: Oid) -> Result<FileRecord> {
        self.files
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound("file".to_string()))
    }

    async fn get_by_ids(&self, ids: &[Oid]) -> Result<Vec<FileRecord>> {
        let files = self.files.read();
        Ok(ids
            .iter()
            .filter_map(|id| files.get(id))
            .filter(|f| f.visible())
            .cloned()
            .collect())
    }

    async fn get_by_collection(&self, collection_id: Oid) -> Result<Vec<FileRecord>> {
        Ok(self
            .files
            .read()
            .values()
            .filter(|f| f.visible() && f.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn get_by_owner(&self, owner_id: Oid) -> Result<Vec<FileRecord>> {
        Ok(self
            .files
            .read()
            .values()
            .filter(|f| f.visible() && f.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn get_by_creator(&self, creator_id: Oid) -> Result<Vec<FileRecord>> {
        Ok(self
            .files
            .read()
            .values()
            .filter(|f| f.visible() && f.created_by_user_id == creator_id)
            .cloned()
            .collect())
    }

    async fn update(&self, mut file: FileRecord) -> Result<FileRecord> {
        let mut files = self.files.write();
        let stored = files
            .get(&file.id)
            .ok_or_else(|| CoreError::NotFound("file".to_string()))?;
        file.version = stored.version + 1;
        file.modified_at = Utc::now();
        files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn soft_delete(&self, id: Oid) -> Result<FileRecord> {
        let mut files = self.files.write();
        let f = files
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound("file".to_string()))?;
        if f.state == FileState::Deleted {
            return Err(CoreError::Conflict("file is already deleted".to_string()));
        }
        Self::tombstone(f);
        Ok(f.clone())
    }

    async fn soft_delete_many(&self, ids: &[Oid]) -> Result<Vec<Oid>> {
        let mut files = self.files.write();
        let mut deleted = Vec::new();
        for id in ids {
            if let Some(f) = files.get_mut(id) {
                if f.state != FileState::Deleted {
                    Self::tombstone(f);
                    deleted.push(*id);
                }
            }
        }
        Ok(deleted)
    }

    async fn hard_delete(&self, id: Oid) -> Result<()> {
        self.files
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound("file".to_string()))
    }

    async fn hard_delete_many(&self, ids: &[Oid]) -> Result<()> {
        let mut files = self.files.write();
        for id in ids {
            files.remove(id);
        }
        Ok(())
    }

    async fn archive(&self, id: Oid) -> Result<FileRecord> {
        let mut files = self.files.write();
        let f = files
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound("file".to_string()))?;
        if f.state != FileState::Active {
            return Err(CoreError::Conflict(
                "only active files can be archived".to_string(),
            ));
        }
        Self::touch(f);
        f.state = FileState::Archived;
        Ok(f.clone())
    }

    async fn restore(&self, id: Oid) -> Result<FileRecord> {
        let mut files = self.files.write();
        let f = files
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound("file".to_string()))?;
        match f.state {
            FileState::Archived => {}
            FileState::Deleted => match f.tombstone_expiry {
                Some(expiry) if expiry > Utc::now() => {}
                _ => {
                    return Err(CoreError::Conflict(
                        "tombstone window has expired".to_string(),
                    ))
                }
            },
            _ => {
                return Err(CoreError::Conflict(
                    "file is neither deleted nor archived".to_string(),
                ))
            }
        }
        Self::touch(f);
        f.state = FileState::Active;
        f.tombstone_version = 0;
        f.tombstone_expiry = None;
        Ok(f.clone())
    }

    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<FileRecord>> {
        Ok(self
            .files
            .read()
            .values()
            .filter(|f| f.state == FileState::Pending && f.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn sync_changes(
        &self,
        collection_ids: &[Oid],
        cursor: Option<SyncCursor>,
        limit: usize,
    ) -> Result<Vec<FileRecord>> {
        let files = self.files.read();
        let mut changed: Vec<FileRecord> = files
            .values()
            .filter(|f| collection_ids.contains(&f.collection_id))
            .filter(|f| f.state != FileState::Pending)
            .filter(|f| past_cursor(&cursor, f.modified_at, f.id))
            .cloned()
            .collect();
        changed.sort_by_key(|f| (f.modified_at, f.id));
        changed.truncate(limit);
        Ok(changed)
    }
}
