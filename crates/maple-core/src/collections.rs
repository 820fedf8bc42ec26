//! Collection management
//!
//! Enforces the contracts around collection persistence: parent
//! validation and ancestor-path computation on create, access gates on
//! every read and mutation, restore re-population, move validation, and
//! in-memory hierarchy assembly.

use crate::{
    api::{
        CreateCollectionRequest, HierarchyNode, MoveCollectionRequest, RestoreCollectionRequest,
        UpdateCollectionRequest,
    },
    oid::Oid,
    store::{AccountStore, CollectionStore},
    types::{Collection, CollectionState, PermissionLevel},
    CoreError, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Collection operations with their access gates
#[derive(Clone)]
pub struct CollectionManager {
    store: Arc<dyn CollectionStore>,
    accounts: Arc<dyn AccountStore>,
}

impl CollectionManager {
    pub fn new(store: Arc<dyn CollectionStore>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { store, accounts }
    }

    /// The underlying store (sharing and sync engines reuse it)
    pub fn store(&self) -> Arc<dyn CollectionStore> {
        Arc::clone(&self.store)
    }

    fn gate(collection: &Collection, caller: Oid, level: PermissionLevel) -> Result<()> {
        if collection.allows(caller, level) {
            Ok(())
        } else if collection.permission_for(caller).is_some() {
            Err(CoreError::Unauthorized(format!(
                "requires {level:?} on collection {}",
                collection.id
            )))
        } else {
            // Callers with no grant at all cannot learn the id exists.
            Err(CoreError::NotFound("collection".to_string()))
        }
    }

    /// Create a collection
    ///
    /// With a parent set, the caller needs write access there and the
    /// ancestor path is `[parent.ancestors…, parent.id]`. Children cannot
    /// be created under non-active parents.
    pub async fn create(&self, caller: Oid, req: CreateCollectionRequest) -> Result<Collection> {
        if req.encrypted_name.is_empty() {
            return Err(CoreError::validation("encrypted_name", "must not be empty"));
        }
        req.encrypted_collection_key.validate()?;
        // Unknown owners cannot insert.
        self.accounts.get(caller).await?;

        let (parent_id, ancestor_ids) = match req.parent_id {
            Some(parent_id) => {
                let parent = self.store.get_any_state(parent_id).await?;
                if parent.state != CollectionState::Active {
                    return Err(CoreError::Conflict(
                        "cannot create a child under a non-active collection".to_string(),
                    ));
                }
                Self::gate(&parent, caller, PermissionLevel::ReadWrite)?;
                let mut path = parent.ancestor_ids.clone();
                path.push(parent.id);
                (Some(parent_id), path)
            }
            None => (None, Vec::new()),
        };

        let collection = Collection::new(
            req.id,
            caller,
            parent_id,
            ancestor_ids,
            req.collection_type,
            req.encrypted_name,
            req.encrypted_collection_key,
        );
        debug!(collection_id = %collection.id, parent = ?parent_id, "creating collection");
        self.store.insert(collection).await
    }

    /// Fetch an active collection the caller can read
    pub async fn get(&self, caller: Oid, id: Oid) -> Result<Collection> {
        let collection = self.store.get(id).await?;
        Self::gate(&collection, caller, PermissionLevel::ReadOnly)?;
        Ok(collection)
    }

    /// Fetch regardless of state (sync pulls and admin views)
    pub async fn get_any_state(&self, caller: Oid, id: Oid) -> Result<Collection> {
        let collection = self.store.get_any_state(id).await?;
        Self::gate(&collection, caller, PermissionLevel::ReadOnly)?;
        Ok(collection)
    }

    /// Active collections the caller owns
    pub async fn list_owned(&self, caller: Oid) -> Result<Vec<Collection>> {
        self.store.list_by_owner(caller).await
    }

    /// Active collections shared with the caller
    pub async fn list_shared(&self, caller: Oid) -> Result<Vec<Collection>> {
        self.store.list_shared_with(caller).await
    }

    /// Active children of a collection the caller can read
    pub async fn list_children(&self, caller: Oid, parent_id: Oid) -> Result<Vec<Collection>> {
        let parent = self.store.get(parent_id).await?;
        Self::gate(&parent, caller, PermissionLevel::ReadOnly)?;
        self.store.find_by_parent(parent_id).await
    }

    /// Update collection metadata (admin gate)
    pub async fn update(
        &self,
        caller: Oid,
        id: Oid,
        req: UpdateCollectionRequest,
    ) -> Result<Collection> {
        let mut collection = self.store.get(id).await?;
        Self::gate(&collection, caller, PermissionLevel::Admin)?;

        if let Some(name) = req.encrypted_name {
            if name.is_empty() {
                return Err(CoreError::validation("encrypted_name", "must not be empty"));
            }
            collection.encrypted_name = name;
        }
        if let Some(key) = req.encrypted_collection_key {
            key.validate()?;
            collection.encrypted_collection_key = Some(key);
        }
        collection.modified_by_user_id = caller;
        self.store.update(collection).await
    }

    /// Archive a collection (admin gate); files inside stay reachable
    /// through sync but the collection drops out of active listings
    pub async fn archive(&self, caller: Oid, id: Oid) -> Result<Collection> {
        let mut collection = self.store.get(id).await?;
        Self::gate(&collection, caller, PermissionLevel::Admin)?;
        collection.state = CollectionState::Archived;
        collection.modified_by_user_id = caller;
        self.store.update(collection).await
    }

    /// Soft-delete a collection and its subtree (admin gate)
    pub async fn soft_delete(&self, caller: Oid, id: Oid) -> Result<Vec<Oid>> {
        let collection = self.store.get(id).await?;
        Self::gate(&collection, caller, PermissionLevel::Admin)?;
        self.store.soft_delete(id, caller).await
    }

    /// Remove a collection and its subtree permanently (owner only)
    pub async fn hard_delete(&self, caller: Oid, id: Oid) -> Result<Vec<Oid>> {
        let collection = self.store.get_any_state(id).await?;
        if collection.owner_id != caller {
            return Err(CoreError::Unauthorized(
                "only the owner can permanently delete a collection".to_string(),
            ));
        }
        self.store.hard_delete(id).await
    }

    /// Restore a soft-deleted collection within its tombstone window
    ///
    /// The stripped ciphertext fields come back from the client's cache in
    /// the request.
    pub async fn restore(
        &self,
        caller: Oid,
        id: Oid,
        req: RestoreCollectionRequest,
    ) -> Result<Collection> {
        let collection = self.store.get_any_state(id).await?;
        Self::gate(&collection, caller, PermissionLevel::Admin)?;

        let mut restored = self.store.restore(id, caller).await?;
        if req.encrypted_name.is_some() || req.encrypted_collection_key.is_some() {
            if let Some(name) = req.encrypted_name {
                restored.encrypted_name = name;
            }
            if let Some(key) = req.encrypted_collection_key {
                key.validate()?;
                restored.encrypted_collection_key = Some(key);
            }
            restored.modified_by_user_id = caller;
            restored = self.store.update(restored).await?;
        }
        Ok(restored)
    }

    /// Move a collection under a new parent
    ///
    /// The client submits the pre-computed ancestor list and re-encrypted
    /// path segments; the store validates against cycles and rewrites the
    /// subtree atomically.
    pub async fn move_to(
        &self,
        caller: Oid,
        id: Oid,
        req: MoveCollectionRequest,
    ) -> Result<Collection> {
        let collection = self.store.get(id).await?;
        Self::gate(&collection, caller, PermissionLevel::Admin)?;

        if let Some(parent_id) = req.new_parent_id {
            let parent = self.store.get(parent_id).await?;
            Self::gate(&parent, caller, PermissionLevel::ReadWrite)?;
        }

        let moved = self
            .store
            .move_to(id, req.new_parent_id, req.updated_ancestor_ids, caller)
            .await?;

        // Re-encrypted names only apply inside the moved subtree.
        for segment in req.updated_path_segments {
            if segment.collection_id != id {
                let target = self.store.get(segment.collection_id).await?;
                if !target.is_descendant_of(id) {
                    return Err(CoreError::validation(
                        "updated_path_segments",
                        "segment outside the moved subtree",
                    ));
                }
            }
            let mut target = self.store.get(segment.collection_id).await?;
            target.encrypted_name = segment.encrypted_name;
            target.modified_by_user_id = caller;
            self.store.update(target).await?;
        }

        self.store.get(moved.id).await
    }

    /// Load a full subtree and assemble the tree in memory
    ///
    /// One descendants query, then an O(n) parent → children pass.
    pub async fn hierarchy(&self, caller: Oid, root_id: Oid) -> Result<HierarchyNode> {
        let root = self.get(caller, root_id).await?;
        let descendants = self.store.find_descendants(root_id).await?;

        let mut by_parent: HashMap<Oid, Vec<Collection>> = HashMap::new();
        for d in descendants {
            if let Some(parent) = d.parent_id {
                by_parent.entry(parent).or_default().push(d);
            }
        }
        Ok(Self::assemble(root, &mut by_parent))
    }

    fn assemble(collection: Collection, by_parent: &mut HashMap<Oid, Vec<Collection>>) -> HierarchyNode {
        let children = by_parent
            .remove(&collection.id)
            .unwrap_or_default()
            .into_iter()
            .map(|c| Self::assemble(c, by_parent))
            .collect();
        HierarchyNode {
            collection,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryAccountStore, MemoryCollectionStore};
    use crate::types::{Account, CollectionType};
    use maple_crypto::{bundle::UserKeyBundle, envelope::WrappedKey, keys::SymmetricKey};

    async fn manager_with_account() -> (CollectionManager, Oid) {
        let accounts = Arc::new(MemoryAccountStore::new());
        let (bundle, _) = UserKeyBundle::generate("pw").unwrap();
        let account = accounts
            .insert(Account::new(Oid::new(), "owner@example.com", None, bundle))
            .await
            .unwrap();
        let manager = CollectionManager::new(Arc::new(MemoryCollectionStore::new()), accounts);
        (manager, account.id)
    }

    fn create_request(parent_id: Option<Oid>) -> CreateCollectionRequest {
        CreateCollectionRequest {
            id: Oid::new(),
            parent_id,
            collection_type: CollectionType::Folder,
            encrypted_name: "bmFtZQ==".to_string(),
            encrypted_collection_key: WrappedKey::wrap(
                &SymmetricKey::generate(),
                &SymmetricKey::generate(),
                1,
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_computes_ancestors() {
        let (manager, owner) = manager_with_account().await;
        let root = manager.create(owner, create_request(None)).await.unwrap();
        let child = manager
            .create(owner, create_request(Some(root.id)))
            .await
            .unwrap();

        assert_eq!(child.ancestor_ids, vec![root.id]);
        assert!(child.ancestors_consistent());
    }

    #[tokio::test]
    async fn test_create_keeps_client_id() {
        let (manager, owner) = manager_with_account().await;
        let req = create_request(None);
        let id = req.id;
        let created = manager.create(owner, req).await.unwrap();
        assert_eq!(created.id, id);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_owner() {
        let (manager, _) = manager_with_account().await;
        let result = manager.create(Oid::new(), create_request(None)).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_under_deleted_parent_conflicts() {
        let (manager, owner) = manager_with_account().await;
        let root = manager.create(owner, create_request(None)).await.unwrap();
        manager.soft_delete(owner, root.id).await.unwrap();

        let result = manager.create(owner, create_request(Some(root.id))).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_stranger_sees_not_found() {
        let (manager, owner) = manager_with_account().await;
        let root = manager.create(owner, create_request(None)).await.unwrap();

        let result = manager.get(Oid::new(), root.id).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_restore_repopulates_ciphertext() {
        let (manager, owner) = manager_with_account().await;
        let root = manager.create(owner, create_request(None)).await.unwrap();
        manager.soft_delete(owner, root.id).await.unwrap();

        let key = WrappedKey::wrap(&SymmetricKey::generate(), &SymmetricKey::generate(), 1).unwrap();
        let restored = manager
            .restore(
                owner,
                root.id,
                RestoreCollectionRequest {
                    encrypted_name: Some("cmVzdG9yZWQ=".to_string()),
                    encrypted_collection_key: Some(key),
                },
            )
            .await
            .unwrap();

        assert_eq!(restored.state, CollectionState::Active);
        assert_eq!(restored.encrypted_name, "cmVzdG9yZWQ=");
        assert!(restored.encrypted_collection_key.is_some());
    }

    #[tokio::test]
    async fn test_hierarchy_assembly() {
        let (manager, owner) = manager_with_account().await;
        let root = manager.create(owner, create_request(None)).await.unwrap();
        let a = manager
            .create(owner, create_request(Some(root.id)))
            .await
            .unwrap();
        let b = manager
            .create(owner, create_request(Some(root.id)))
            .await
            .unwrap();
        let a_child = manager
            .create(owner, create_request(Some(a.id)))
            .await
            .unwrap();

        let tree = manager.hierarchy(owner, root.id).await.unwrap();
        assert_eq!(tree.collection.id, root.id);
        assert_eq!(tree.children.len(), 2);

        let a_node = tree
            .children
            .iter()
            .find(|n| n.collection.id == a.id)
            .unwrap();
        assert_eq!(a_node.children.len(), 1);
        assert_eq!(a_node.children[0].collection.id, a_child.id);
        let b_node = tree
            .children
            .iter()
            .find(|n| n.collection.id == b.id)
            .unwrap();
        assert!(b_node.children.is_empty());
    }

    #[tokio::test]
    async fn test_move_applies_path_segments() {
        let (manager, owner) = manager_with_account().await;
        let root = manager.create(owner, create_request(None)).await.unwrap();
        let other = manager.create(owner, create_request(None)).await.unwrap();
        let child = manager
            .create(owner, create_request(Some(root.id)))
            .await
            .unwrap();

        let moved = manager
            .move_to(
                owner,
                child.id,
                MoveCollectionRequest {
                    new_parent_id: Some(other.id),
                    updated_ancestor_ids: vec![other.id],
                    updated_path_segments: vec![crate::api::PathSegmentUpdate {
                        collection_id: child.id,
                        encrypted_name: "bW92ZWQ=".to_string(),
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.parent_id, Some(other.id));
        assert_eq!(moved.encrypted_name, "bW92ZWQ=");
    }
}
