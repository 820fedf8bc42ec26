//! In-memory collection store
//!
//! A single read-write lock over the document map stands in for the
//! document database's transactions: cascade operations mutate root and
//! descendants under one write guard, so sync readers observe the whole
//! cascade as a single atomic step.

use crate::{
    oid::Oid,
    store::{past_cursor, CollectionStore},
    sync::SyncCursor,
    types::{Collection, CollectionState},
    tombstone_retention, CoreError, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory collection store
#[derive(Clone, Default)]
pub struct MemoryCollectionStore {
    collections: Arc<RwLock<HashMap<Oid, Collection>>>,
}

impl MemoryCollectionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents, any state
    pub fn len(&self) -> usize {
        self.collections.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.collections.read().is_empty()
    }

    fn touch(collection: &mut Collection, by: Oid) {
        collection.version += 1;
        collection.modified_at = Utc::now();
        collection.modified_by_user_id = by;
    }

    fn tombstone(collection: &mut Collection, by: Oid) {
        Self::touch(collection, by);
        collection.state = CollectionState::Deleted;
        collection.tombstone_version = collection.version;
        collection.tombstone_expiry = Some(Utc::now() + tombstone_retention());
        // Strip confidential fields. Membership rows survive minus their
        // sealed keys so the tombstone still reaches members' sync feeds.
        collection.encrypted_name.clear();
        collection.encrypted_collection_key = None;
        for member in &mut collection.members {
            member.encrypted_collection_key.clear();
        }
    }
}

#[async_trait]
impl CollectionStore for MemoryCollectionStore {
    async fn insert(&self, collection: Collection) -> Result<Collection> {
        if !collection.ancestors_consistent() {
            return Err(CoreError::validation(
                "ancestor_ids",
                "ancestor path does not match parent",
            ));
        }
        let mut collections = self.collections.write();
        if collections.contains_key(&collection.id) {
            return Err(CoreError::Conflict(format!(
                "collection {} already exists",
                collection.id
            )));
        }
        collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn get(&self, id: Oid) -> Result<Collection> {
        let collections = self.collections.read();
        match collections.get(&id) {
            Some(c) if c.state == CollectionState::Active => Ok(c.clone()),
            _ => Err(CoreError::NotFound("collection".to_string())),
        }
    }

    async fn get_any_state(&self, id: Oid) -> Result<Collection> {
        self.collections
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound("collection".to_string()))
    }

    async fn list_by_owner(&self, owner_id: Oid) -> Result<Vec<Collection>> {
        Ok(self
            .collections
            .read()
            .values()
            .filter(|c| c.state == CollectionState::Active && c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_shared_with(&self, account_id: Oid) -> Result<Vec<Collection>> {
        Ok(self
            .collections
            .read()
            .values()
            .filter(|c| {
                c.state == CollectionState::Active
                    && c.owner_id != account_id
                    && c.member(account_id).is_some()
            })
            .cloned()
            .collect())
    }

    async fn find_by_parent(&self, parent_id: Oid) -> Result<Vec<Collection>> {
        Ok(self
            .collections
            .read()
            .values()
            .filter(|c| c.state == CollectionState::Active && c.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn find_descendants(&self, ancestor_id: Oid) -> Result<Vec<Collection>> {
        Ok(self
            .collections
            .read()
            .values()
            .filter(|c| c.state == CollectionState::Active && c.is_descendant_of(ancestor_id))
            .cloned()
            .collect())
    }

    async fn update(&self, mut collection: Collection) -> Result<Collection> {
        let mut collections = self.collections.write();
        let stored = collections
            .get(&collection.id)
            .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
        collection.version = stored.version + 1;
        collection.modified_at = Utc::now();
        collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn soft_delete(&self, id: Oid, deleted_by: Oid) -> Result<Vec<Oid>> {
        let mut collections = self.collections.write();
        let root = collections
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
        if root.state == CollectionState::Deleted {
            return Err(CoreError::Conflict("collection is already deleted".to_string()));
        }
        Self::tombstone(root, deleted_by);

        let mut affected = vec![id];
        for c in collections.values_mut() {
            if c.is_descendant_of(id) && c.state != CollectionState::Deleted {
                Self::tombstone(c, deleted_by);
                affected.push(c.id);
            }
        }
        Ok(affected)
    }

    async fn hard_delete(&self, id: Oid) -> Result<Vec<Oid>> {
        let mut collections = self.collections.write();
        if !collections.contains_key(&id) {
            return Err(CoreError::NotFound("collection".to_string()));
        }
        let removed: Vec<Oid> = collections
            .values()
            .filter(|c| c.id == id || c.is_descendant_of(id))
            .map(|c| c.id)
            .collect();
        for rid in &removed {
            collections.remove(rid);
        }
        Ok(removed)
    }

    async fn restore(&self, id: Oid, restored_by: Oid) -> Result<Collection> {
        let mut collections = self.collections.write();
        let c = collections
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
        if c.state != CollectionState::Deleted {
            return Err(CoreError::Conflict("collection is not deleted".to_string()));
        }
        match c.tombstone_expiry {
            Some(expiry) if expiry > Utc::now() => {}
            _ => {
                return Err(CoreError::Conflict(
                    "tombstone window has expired".to_string(),
                ))
            }
        }
        Self::touch(c, restored_by);
        c.state = CollectionState::Active;
        c.tombstone_version = 0;
        c.tombstone_expiry = None;
        Ok(c.clone())
    }

    async fn move_to(
        &self,
        id: Oid,
        new_parent_id: Option<Oid>,
        updated_ancestor_ids: Vec<Oid>,
        moved_by: Oid,
    ) -> Result<Collection> {
        let mut collections = self.collections.write();

        {
            let root = collections
                .get(&id)
                .ok_or_else(|| CoreError::NotFound("collection".to_string()))?;
            if root.state != CollectionState::Active {
                return Err(CoreError::Conflict("cannot move a non-active collection".to_string()));
            }
        }

        // No cycles: the new parent may not be the collection itself or
        // anything inside its subtree.
        if let Some(parent_id) = new_parent_id {
            if parent_id == id {
                return Err(CoreError::validation("parent_id", "collection cannot be its own parent"));
            }
            let parent = collections
                .get(&parent_id)
                .ok_or_else(|| CoreError::NotFound("parent collection".to_string()))?;
            if parent.state != CollectionState::Active {
                return Err(CoreError::Conflict("new parent is not active".to_string()));
            }
            if parent.is_descendant_of(id) {
                return Err(CoreError::validation(
                    "parent_id",
                    "new parent is inside the moved subtree",
                ));
            }
            let mut expected = parent.ancestor_ids.clone();
            expected.push(parent_id);
            if updated_ancestor_ids != expected {
                return Err(CoreError::validation(
                    "ancestor_ids",
                    "ancestor list does not match the new parent's path",
                ));
            }
        } else if !updated_ancestor_ids.is_empty() {
            return Err(CoreError::validation(
                "ancestor_ids",
                "root collections have an empty ancestor path",
            ));
        }

        // Rewrite descendants first: their new path is the root's new path,
        // then the root, then whatever followed the root in the old path.
        let descendant_ids: Vec<Oid> = collections
            .values()
            .filter(|c| c.is_descendant_of(id))
            .map(|c| c.id)
            .collect();
        for did in descendant_ids {
            let d = collections.get_mut(&did).expect("descendant id just listed");
            let pos = d
                .ancestor_ids
                .iter()
                .position(|a| *a == id)
                .expect("descendant path contains the moved root");
            let suffix = d.ancestor_ids.split_off(pos + 1);
            let mut path = updated_ancestor_ids.clone();
            path.push(id);
            path.extend(suffix);
            d.ancestor_ids = path;
            Self::touch(d, moved_by);
        }

        let root = collections.get_mut(&id).expect("checked above");
        root.parent_id = new_parent_id;
        root.ancestor_ids = updated_ancestor_ids;
        Self::touch(root, moved_by);
        Ok(root.clone())
    }

    async fn sync_changes(
        &self,
        account_id: Oid,
        cursor: Option<SyncCursor>,
        limit: usize,
    ) -> Result<Vec<Collection>> {
        let collections = self.collections.read();
        let mut changed: Vec<Collection> = collections
            .values()
            .filter(|c| c.owner_id == account_id || c.member(account_id).is_some())
            .filter(|c| past_cursor(&cursor, c.modified_at, c.id))
            .cloned()
            .collect();
        changed.sort_by_key(|c| (c.modified_at, c.id));
        changed.truncate(limit);
        Ok(changed)
    }

    async fn accessible_ids(&self, account_id: Oid) -> Result<Vec<Oid>> {
        Ok(self
            .collections
            .read()
            .values()
            .filter(|c| {
                c.state == CollectionState::Active
                    && (c.owner_id == account_id || c.member(account_id).is_some())
            })
            .map(|c| c.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CollectionType;
    use maple_crypto::{envelope::WrappedKey, keys::SymmetricKey};

    fn collection(owner: Oid, parent: Option<&Collection>) -> Collection {
        let wrapped =
            WrappedKey::wrap(&SymmetricKey::generate(), &SymmetricKey::generate(), 1).unwrap();
        let (parent_id, ancestors) = match parent {
            Some(p) => {
                let mut a = p.ancestor_ids.clone();
                a.push(p.id);
                (Some(p.id), a)
            }
            None => (None, Vec::new()),
        };
        Collection::new(
            Oid::new(),
            owner,
            parent_id,
            ancestors,
            CollectionType::Folder,
            "bmFtZQ==".to_string(),
            wrapped,
        )
    }

    async fn tree(store: &MemoryCollectionStore, owner: Oid) -> (Collection, Collection, Collection) {
        let root = store.insert(collection(owner, None)).await.unwrap();
        let child = store.insert(collection(owner, Some(&root))).await.unwrap();
        let grandchild = store.insert(collection(owner, Some(&child))).await.unwrap();
        (root, child, grandchild)
    }

    #[tokio::test]
    async fn test_ancestor_paths() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, child, grandchild) = tree(&store, owner).await;

        assert_eq!(child.ancestor_ids, vec![root.id]);
        assert_eq!(grandchild.ancestor_ids, vec![root.id, child.id]);

        let descendants = store.find_descendants(root.id).await.unwrap();
        assert_eq!(descendants.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryCollectionStore::new();
        let c = collection(Oid::new(), None);
        store.insert(c.clone()).await.unwrap();
        assert!(matches!(store.insert(c).await, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_soft_delete_cascades_and_strips() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, child, grandchild) = tree(&store, owner).await;

        let affected = store.soft_delete(root.id, owner).await.unwrap();
        assert_eq!(affected.len(), 3);

        for id in [root.id, child.id, grandchild.id] {
            let c = store.get_any_state(id).await.unwrap();
            assert_eq!(c.state, CollectionState::Deleted);
            assert!(c.tombstone_version >= 2);
            assert_eq!(c.tombstone_version, c.version);
            assert!(c.encrypted_name.is_empty());
            assert!(c.encrypted_collection_key.is_none());
            assert!(store.get(id).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_soft_delete_twice_conflicts() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, ..) = tree(&store, owner).await;

        store.soft_delete(root.id, owner).await.unwrap();
        assert!(matches!(
            store.soft_delete(root.id, owner).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_within_window() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, ..) = tree(&store, owner).await;

        store.soft_delete(root.id, owner).await.unwrap();
        let restored = store.restore(root.id, owner).await.unwrap();

        assert_eq!(restored.state, CollectionState::Active);
        assert_eq!(restored.tombstone_version, 0);
        assert!(restored.tombstone_expiry.is_none());
    }

    #[tokio::test]
    async fn test_restore_active_conflicts() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, ..) = tree(&store, owner).await;

        assert!(matches!(
            store.restore(root.id, owner).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_hard_delete_removes_subtree() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, child, grandchild) = tree(&store, owner).await;

        let removed = store.hard_delete(root.id).await.unwrap();
        assert_eq!(removed.len(), 3);
        for id in [root.id, child.id, grandchild.id] {
            assert!(store.get_any_state(id).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_move_rewrites_descendant_paths() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, child, grandchild) = tree(&store, owner).await;
        let other_root = store.insert(collection(owner, None)).await.unwrap();

        // Move `child` (with its grandchild) under `other_root`.
        store
            .move_to(child.id, Some(other_root.id), vec![other_root.id], owner)
            .await
            .unwrap();

        let moved = store.get(child.id).await.unwrap();
        assert_eq!(moved.parent_id, Some(other_root.id));
        assert_eq!(moved.ancestor_ids, vec![other_root.id]);

        let gc = store.get(grandchild.id).await.unwrap();
        assert_eq!(gc.ancestor_ids, vec![other_root.id, child.id]);

        assert!(store.find_descendants(root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_rejected() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, child, grandchild) = tree(&store, owner).await;

        let result = store
            .move_to(
                root.id,
                Some(grandchild.id),
                vec![root.id, child.id, grandchild.id],
                owner,
            )
            .await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_move_validates_ancestor_list() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (_, child, _) = tree(&store, owner).await;
        let other_root = store.insert(collection(owner, None)).await.unwrap();

        let result = store
            .move_to(child.id, Some(other_root.id), vec![Oid::new()], owner)
            .await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_sync_changes_ordering_and_cursor() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, child, grandchild) = tree(&store, owner).await;

        let first = store.sync_changes(owner, None, 2).await.unwrap();
        assert_eq!(first.len(), 2);

        let cursor = SyncCursor {
            last_modified: first[1].modified_at,
            last_id: first[1].id,
        };
        let second = store.sync_changes(owner, Some(cursor), 2).await.unwrap();

        let mut seen: Vec<Oid> = first.iter().chain(second.iter()).map(|c| c.id).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3, "no duplicates across page boundaries");
        for id in [root.id, child.id, grandchild.id] {
            assert!(seen.contains(&id));
        }
    }

    #[tokio::test]
    async fn test_tombstones_visible_in_sync_feed() {
        let store = MemoryCollectionStore::new();
        let owner = Oid::new();
        let (root, ..) = tree(&store, owner).await;

        store.soft_delete(root.id, owner).await.unwrap();
        let changed = store.sync_changes(owner, None, 10).await.unwrap();

        assert_eq!(changed.len(), 3);
        assert!(changed.iter().all(|c| c.state == CollectionState::Deleted));
    }
}
