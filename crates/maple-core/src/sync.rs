//! Incremental sync feeds
//!
//! Two parallel change feeds, collections and files, both paginated by a
//! `{last_modified, last_id}` cursor over the `(modified_at, id)` order.
//! Items carry just enough for the client to reconcile without fetching
//! bodies; the client pulls full records only where its local version
//! lags.

use crate::{
    oid::Oid,
    store::{CollectionStore, FileStore},
    types::{Collection, CollectionState, FileRecord, FileState},
    Result, DEFAULT_SYNC_PAGE_SIZE, MAX_SYNC_PAGE_SIZE,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Position in a change feed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_modified: DateTime<Utc>,
    pub last_id: Oid,
}

/// One page of a change feed
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncPage<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<SyncCursor>,
    pub has_more: bool,
}

/// Sync projection of a collection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionSyncItem {
    pub id: Oid,
    pub version: u64,
    pub modified_at: DateTime<Utc>,
    pub state: CollectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Oid>,
    #[serde(default)]
    pub tombstone_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone_expiry: Option<DateTime<Utc>>,
}

impl From<&Collection> for CollectionSyncItem {
    fn from(c: &Collection) -> Self {
        Self {
            id: c.id,
            version: c.version,
            modified_at: c.modified_at,
            state: c.state,
            parent_id: c.parent_id,
            tombstone_version: c.tombstone_version,
            tombstone_expiry: c.tombstone_expiry,
        }
    }
}

/// Sync projection of a file record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileSyncItem {
    pub id: Oid,
    pub collection_id: Oid,
    pub version: u64,
    pub modified_at: DateTime<Utc>,
    pub state: FileState,
    #[serde(default)]
    pub tombstone_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone_expiry: Option<DateTime<Utc>>,
}

impl From<&FileRecord> for FileSyncItem {
    fn from(f: &FileRecord) -> Self {
        Self {
            id: f.id,
            collection_id: f.collection_id,
            version: f.version,
            modified_at: f.modified_at,
            state: f.state,
            tombstone_version: f.tombstone_version,
            tombstone_expiry: f.tombstone_expiry,
        }
    }
}

/// Serves the two change feeds
#[derive(Clone)]
pub struct SyncEngine {
    collections: Arc<dyn CollectionStore>,
    files: Arc<dyn FileStore>,
}

impl SyncEngine {
    pub fn new(collections: Arc<dyn CollectionStore>, files: Arc<dyn FileStore>) -> Self {
        Self { collections, files }
    }

    fn clamp_limit(limit: Option<usize>) -> usize {
        limit
            .unwrap_or(DEFAULT_SYNC_PAGE_SIZE)
            .clamp(1, MAX_SYNC_PAGE_SIZE)
    }

    /// The collection change feed for one account
    pub async fn collection_feed(
        &self,
        account_id: Oid,
        cursor: Option<SyncCursor>,
        limit: Option<usize>,
    ) -> Result<SyncPage<CollectionSyncItem>> {
        let limit = Self::clamp_limit(limit);
        let changed = self
            .collections
            .sync_changes(account_id, cursor, limit + 1)
            .await?;
        Ok(Self::paginate(changed.iter().map(CollectionSyncItem::from).collect(), limit))
    }

    /// The file change feed for one account
    ///
    /// Accessible collection ids are computed once per page.
    pub async fn file_feed(
        &self,
        account_id: Oid,
        cursor: Option<SyncCursor>,
        limit: Option<usize>,
    ) -> Result<SyncPage<FileSyncItem>> {
        let limit = Self::clamp_limit(limit);
        let accessible = self.collections.accessible_ids(account_id).await?;
        let changed = self
            .files
            .sync_changes(&accessible, cursor, limit + 1)
            .await?;
        Ok(Self::paginate(changed.iter().map(FileSyncItem::from).collect(), limit))
    }

    fn paginate<T: SyncOrdered>(mut items: Vec<T>, limit: usize) -> SyncPage<T> {
        let has_more = items.len() > limit;
        items.truncate(limit);
        // The cursor always points at the last delivered item, so a
        // client resuming later never sees this page again.
        let next_cursor = items.last().map(|last| SyncCursor {
            last_modified: last.modified_at(),
            last_id: last.id(),
        });
        SyncPage {
            items,
            next_cursor,
            has_more,
        }
    }
}

/// Feed items expose their cursor coordinates
trait SyncOrdered {
    fn id(&self) -> Oid;
    fn modified_at(&self) -> DateTime<Utc>;
}

impl SyncOrdered for CollectionSyncItem {
    fn id(&self) -> Oid {
        self.id
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

impl SyncOrdered for FileSyncItem {
    fn id(&self) -> Oid {
        self.id
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(modified_at: DateTime<Utc>) -> CollectionSyncItem {
        CollectionSyncItem {
            id: Oid::new(),
            version: 1,
            modified_at,
            state: CollectionState::Active,
            parent_id: None,
            tombstone_version: 0,
            tombstone_expiry: None,
        }
    }

    #[test]
    fn test_paginate_exact_page_has_no_more() {
        let now = Utc::now();
        let items: Vec<_> = (0..3).map(|_| item(now)).collect();
        let last = items[2].id;
        let page = SyncEngine::paginate(items, 3);

        assert_eq!(page.items.len(), 3);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor.unwrap().last_id, last);
    }

    #[test]
    fn test_paginate_empty_page_keeps_no_cursor() {
        let page = SyncEngine::paginate(Vec::<CollectionSyncItem>::new(), 3);
        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_paginate_overflow_sets_cursor_to_last_kept() {
        let now = Utc::now();
        let items: Vec<_> = (0..4).map(|_| item(now)).collect();
        let last_kept = items[2].id;
        let page = SyncEngine::paginate(items, 3);

        assert_eq!(page.items.len(), 3);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.unwrap().last_id, last_kept);
    }

    #[test]
    fn test_limit_clamping() {
        assert_eq!(SyncEngine::clamp_limit(None), DEFAULT_SYNC_PAGE_SIZE);
        assert_eq!(SyncEngine::clamp_limit(Some(0)), 1);
        assert_eq!(SyncEngine::clamp_limit(Some(50_000)), MAX_SYNC_PAGE_SIZE);
    }

    #[test]
    fn test_cursor_wire_form() {
        let cursor = SyncCursor {
            last_modified: Utc::now(),
            last_id: Oid::new(),
        };
        let json = serde_json::to_string(&cursor).unwrap();
        assert!(json.contains("last_modified"));
        assert!(json.contains("last_id"));
        let back: SyncCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(cursor, back);
    }
}
