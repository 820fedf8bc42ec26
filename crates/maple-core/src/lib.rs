//! # Maple Core
//!
//! The domain engine of the MapleFile end-to-end encrypted sync system.
//!
//! Everything the cloud half knows about lives here: accounts with their
//! (opaque) key bundles, hierarchical collections with memberships,
//! encrypted file records, and the services that operate on them:
//!
//! - **Collection manager**: create/update/move/restore with ancestor-path
//!   maintenance and cascading soft delete
//! - **Sharing engine**: root grants with per-descendant inherited
//!   envelopes, permission updates, cascade revocation
//! - **Sync engine**: cursor-paginated change feeds over collections and
//!   files
//! - **Upload orchestrator**: the pending → active three-step protocol
//!   with object verification
//!
//! Stores are capability traits with in-memory reference implementations;
//! a production document database plugs in behind the same traits.

pub mod api;
pub mod collections;
pub mod error;
pub mod files;
pub mod oid;
pub mod sharing;
pub mod store;
pub mod sync;
pub mod types;
pub mod upload;

pub use collections::CollectionManager;
pub use error::{CoreError, Result};
pub use files::FileManager;
pub use oid::Oid;
pub use sharing::ShareEngine;
pub use store::{AccountStore, CollectionStore, FileStore, MemoryAccountStore, MemoryCollectionStore, MemoryFileStore};
pub use sync::{SyncCursor, SyncEngine, SyncPage};
pub use types::{
    Account, Collection, CollectionMembership, CollectionState, CollectionType, FileRecord,
    FileState, PermissionLevel,
};
pub use upload::UploadOrchestrator;

/// Default sync page size
pub const DEFAULT_SYNC_PAGE_SIZE: usize = 5_000;

/// Hard cap on sync page size
pub const MAX_SYNC_PAGE_SIZE: usize = 10_000;

/// How long a soft-deleted record keeps its tombstone
pub const TOMBSTONE_RETENTION_DAYS: i64 = 30;

/// Grace period past presigned-URL expiry before a pending upload is
/// garbage-collected
pub const PENDING_GC_GRACE_SECS: i64 = 60 * 60;

/// Tombstone retention as a duration
pub fn tombstone_retention() -> chrono::Duration {
    chrono::Duration::days(TOMBSTONE_RETENTION_DAYS)
}

/// Pending-upload GC grace as a duration
pub fn pending_gc_grace() -> chrono::Duration {
    chrono::Duration::seconds(PENDING_GC_GRACE_SECS)
}
