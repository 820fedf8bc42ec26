//! File metadata management
//!
//! Files inherit access control from their collection: reads need
//! `ReadOnly` there, mutations need `ReadWrite`. Batch operations check
//! every target before touching any of them.

use crate::{
    oid::Oid,
    store::{CollectionStore, FileStore},
    types::{FileRecord, PermissionLevel},
    CoreError, Result,
};
use std::sync::Arc;

/// File-record operations with their access gates
#[derive(Clone)]
pub struct FileManager {
    files: Arc<dyn FileStore>,
    collections: Arc<dyn CollectionStore>,
}

impl FileManager {
    pub fn new(files: Arc<dyn FileStore>, collections: Arc<dyn CollectionStore>) -> Self {
        Self { files, collections }
    }

    /// The underlying store (sync engine and orchestrator reuse it)
    pub fn store(&self) -> Arc<dyn FileStore> {
        Arc::clone(&self.files)
    }

    async fn gate(&self, caller: Oid, file: &FileRecord, level: PermissionLevel) -> Result<()> {
        let collection = self.collections.get_any_state(file.collection_id).await?;
        if collection.allows(caller, level) {
            Ok(())
        } else if collection.permission_for(caller).is_some() {
            Err(CoreError::Unauthorized(format!(
                "requires {level:?} on collection {}",
                collection.id
            )))
        } else {
            Err(CoreError::NotFound("file".to_string()))
        }
    }

    /// Fetch an active file the caller can read
    pub async fn get(&self, caller: Oid, id: Oid) -> Result<FileRecord> {
        let file = self.files.get(id).await?;
        self.gate(caller, &file, PermissionLevel::ReadOnly).await?;
        Ok(file)
    }

    /// Fetch regardless of state (sync pulls)
    pub async fn get_any_state(&self, caller: Oid, id: Oid) -> Result<FileRecord> {
        let file = self.files.get_any_state(id).await?;
        self.gate(caller, &file, PermissionLevel::ReadOnly).await?;
        Ok(file)
    }

    /// Active files in a collection the caller can read
    pub async fn list_by_collection(&self, caller: Oid, collection_id: Oid) -> Result<Vec<FileRecord>> {
        let collection = self.collections.get(collection_id).await?;
        if !collection.allows(caller, PermissionLevel::ReadOnly) {
            return Err(CoreError::NotFound("collection".to_string()));
        }
        self.files.get_by_collection(collection_id).await
    }

    /// Active files the caller owns
    pub async fn list_by_owner(&self, caller: Oid) -> Result<Vec<FileRecord>> {
        self.files.get_by_owner(caller).await
    }

    /// Soft-delete one file (write gate)
    pub async fn soft_delete(&self, caller: Oid, id: Oid) -> Result<FileRecord> {
        let file = self.files.get_any_state(id).await?;
        self.gate(caller, &file, PermissionLevel::ReadWrite).await?;
        self.files.soft_delete(id).await
    }

    /// Soft-delete a batch; every target is permission-checked before any
    /// is touched
    pub async fn soft_delete_many(&self, caller: Oid, ids: &[Oid]) -> Result<Vec<Oid>> {
        for id in ids {
            let file = self.files.get_any_state(*id).await?;
            self.gate(caller, &file, PermissionLevel::ReadWrite).await?;
        }
        self.files.soft_delete_many(ids).await
    }

    /// Archive one file (write gate)
    pub async fn archive(&self, caller: Oid, id: Oid) -> Result<FileRecord> {
        let file = self.files.get_any_state(id).await?;
        self.gate(caller, &file, PermissionLevel::ReadWrite).await?;
        self.files.archive(id).await
    }

    /// Restore a deleted or archived file (write gate)
    pub async fn restore(&self, caller: Oid, id: Oid) -> Result<FileRecord> {
        let file = self.files.get_any_state(id).await?;
        self.gate(caller, &file, PermissionLevel::ReadWrite).await?;
        self.files.restore(id).await
    }
}
