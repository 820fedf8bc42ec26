//! Persistence capability traits and their in-memory reference backends
//!
//! The traits are the document-store capability set the engine is written
//! against; the memory backends serve tests and single-node deployments.
//! A production document database implements the same traits. Every
//! mutation bumps the entity's monotonic `version` and `modified_at`
//! inside the backend's write lock, so sync order observes each change as
//! one atomic step.

mod memory_accounts;
mod memory_collections;
mod memory_files;

pub use memory_accounts::MemoryAccountStore;
pub use memory_collections::MemoryCollectionStore;
pub use memory_files::MemoryFileStore;

use crate::{
    oid::Oid,
    sync::SyncCursor,
    types::{Account, Collection, FileRecord},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account; duplicate id or email is a conflict
    async fn insert(&self, account: Account) -> Result<Account>;

    /// Fetch by id
    async fn get(&self, id: Oid) -> Result<Account>;

    /// Fetch by email (login entry point)
    async fn get_by_email(&self, email: &str) -> Result<Account>;

    /// Replace an account document, bumping `modified_at`
    async fn update(&self, account: Account) -> Result<Account>;
}

/// Collection persistence and hierarchy queries
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Insert a new collection; duplicate id is a conflict
    async fn insert(&self, collection: Collection) -> Result<Collection>;

    /// Fetch an active collection
    async fn get(&self, id: Oid) -> Result<Collection>;

    /// Fetch regardless of state (admin and sync paths)
    async fn get_any_state(&self, id: Oid) -> Result<Collection>;

    /// Active collections owned by an account
    async fn list_by_owner(&self, owner_id: Oid) -> Result<Vec<Collection>>;

    /// Active collections shared with an account (membership, any level)
    async fn list_shared_with(&self, account_id: Oid) -> Result<Vec<Collection>>;

    /// Active direct children of a parent
    async fn find_by_parent(&self, parent_id: Oid) -> Result<Vec<Collection>>;

    /// Active descendants (any depth) of an ancestor
    async fn find_descendants(&self, ancestor_id: Oid) -> Result<Vec<Collection>>;

    /// Replace a collection document, bumping `version` and `modified_at`
    async fn update(&self, collection: Collection) -> Result<Collection>;

    /// Soft-delete a collection and every descendant
    ///
    /// Sets `state = deleted`, strips confidential fields, stamps
    /// tombstone version/expiry, and applies the same change to all
    /// documents whose `ancestor_ids` contain the id. Returns the ids
    /// affected, root first.
    async fn soft_delete(&self, id: Oid, deleted_by: Oid) -> Result<Vec<Oid>>;

    /// Remove the document and every descendant
    async fn hard_delete(&self, id: Oid) -> Result<Vec<Oid>>;

    /// Transition `Deleted → Active` within the tombstone window
    async fn restore(&self, id: Oid, restored_by: Oid) -> Result<Collection>;

    /// Re-parent a collection, rewriting its own and all descendants'
    /// ancestor paths atomically. The caller has already validated the
    /// ancestor list; the store re-checks that no cycle is introduced.
    async fn move_to(
        &self,
        id: Oid,
        new_parent_id: Option<Oid>,
        updated_ancestor_ids: Vec<Oid>,
        moved_by: Oid,
    ) -> Result<Collection>;

    /// Records changed past the cursor that the account can see
    /// (owner or member), any state, ordered `(modified_at, id)`,
    /// at most `limit`
    async fn sync_changes(
        &self,
        account_id: Oid,
        cursor: Option<SyncCursor>,
        limit: usize,
    ) -> Result<Vec<Collection>>;

    /// Ids of every active collection the account can read
    async fn accessible_ids(&self, account_id: Oid) -> Result<Vec<Oid>>;
}

/// File-record persistence
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Insert a new record; a duplicate id in any state is a conflict
    /// (unified-ID invariant: at most one record per id, pending XOR active)
    async fn insert(&self, file: FileRecord) -> Result<FileRecord>;

    /// Insert a batch; fails wholesale on the first conflict
    async fn insert_many(&self, files: Vec<FileRecord>) -> Result<Vec<FileRecord>>;

    /// Fetch an active record
    async fn get(&self, id: Oid) -> Result<FileRecord>;

    /// Fetch regardless of state
    async fn get_any_state(&self, id: Oid) -> Result<FileRecord>;

    /// Fetch a batch of active records (absent ids are skipped)
    async fn get_by_ids(&self, ids: &[Oid]) -> Result<Vec<FileRecord>>;

    /// Active records in a collection
    async fn get_by_collection(&self, collection_id: Oid) -> Result<Vec<FileRecord>>;

    /// Active records owned by an account
    async fn get_by_owner(&self, owner_id: Oid) -> Result<Vec<FileRecord>>;

    /// Active records created by an account
    async fn get_by_creator(&self, creator_id: Oid) -> Result<Vec<FileRecord>>;

    /// Replace a record, bumping `version` and `modified_at`
    async fn update(&self, file: FileRecord) -> Result<FileRecord>;

    /// Soft-delete one record
    async fn soft_delete(&self, id: Oid) -> Result<FileRecord>;

    /// Soft-delete a batch, returning the ids actually transitioned
    async fn soft_delete_many(&self, ids: &[Oid]) -> Result<Vec<Oid>>;

    /// Remove one record
    async fn hard_delete(&self, id: Oid) -> Result<()>;

    /// Remove a batch
    async fn hard_delete_many(&self, ids: &[Oid]) -> Result<()>;

    /// Transition `Active → Archived`
    async fn archive(&self, id: Oid) -> Result<FileRecord>;

    /// Transition `Deleted | Archived → Active` within the tombstone window
    async fn restore(&self, id: Oid) -> Result<FileRecord>;

    /// Pending records created before the cutoff (upload GC)
    async fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<FileRecord>>;

    /// Records in the given collections changed past the cursor, any
    /// state, ordered `(modified_at, id)`, at most `limit`
    async fn sync_changes(
        &self,
        collection_ids: &[Oid],
        cursor: Option<SyncCursor>,
        limit: usize,
    ) -> Result<Vec<FileRecord>>;
}

/// Cursor predicate shared by the sync queries:
/// `modified_at > last_modified OR (modified_at = last_modified AND id > last_id)`
pub(crate) fn past_cursor(cursor: &Option<SyncCursor>, modified_at: DateTime<Utc>, id: Oid) -> bool {
    match cursor {
        None => true,
        Some(c) => {
            modified_at > c.last_modified || (modified_at == c.last_modified && id > c.last_id)
        }
    }
}
