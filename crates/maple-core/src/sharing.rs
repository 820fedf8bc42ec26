//! Collaborative sharing
//!
//! A share is granted at a root collection and propagates to every
//! descendant. The cloud never sees a collection key: the client seals
//! the root key for the recipient, and seals **each descendant's own
//! key** separately - a descendant envelope is never a copy of the
//! root's. Inherited grants record where they came from so revoking the
//! root share removes exactly the derived grants and nothing else.

use crate::{
    api::ShareCollectionRequest,
    oid::Oid,
    store::{AccountStore, CollectionStore},
    types::{Collection, CollectionMembership, PermissionLevel},
    CoreError, Result,
};
use chrono::Utc;
use maple_crypto::SEALED_OVERHEAD;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Membership mutation engine
#[derive(Clone)]
pub struct ShareEngine {
    collections: Arc<dyn CollectionStore>,
    accounts: Arc<dyn AccountStore>,
}

impl ShareEngine {
    pub fn new(collections: Arc<dyn CollectionStore>, accounts: Arc<dyn AccountStore>) -> Self {
        Self {
            collections,
            accounts,
        }
    }

    fn gate_admin(collection: &Collection, caller: Oid) -> Result<()> {
        if collection.allows(caller, PermissionLevel::Admin) {
            Ok(())
        } else if collection.permission_for(caller).is_some() {
            Err(CoreError::Unauthorized(format!(
                "requires Admin on collection {}",
                collection.id
            )))
        } else {
            Err(CoreError::NotFound("collection".to_string()))
        }
    }

    fn check_sealed_key(field: &str, key: &[u8]) -> Result<()> {
        if key.len() < SEALED_OVERHEAD {
            return Err(CoreError::validation(
                field,
                format!("sealed key must be at least {SEALED_OVERHEAD} bytes"),
            ));
        }
        Ok(())
    }

    /// Grant a member access at a root collection and propagate to its
    /// descendants
    ///
    /// Re-adding an existing member updates the permission level in place;
    /// a member never holds two direct grants on one collection.
    pub async fn add_member(
        &self,
        caller: Oid,
        root_id: Oid,
        req: ShareCollectionRequest,
    ) -> Result<Collection> {
        let mut root = self.collections.get(root_id).await?;
        Self::gate_admin(&root, caller)?;

        if req.recipient_id == root.owner_id {
            return Err(CoreError::Conflict(
                "the owner already has full access".to_string(),
            ));
        }
        Self::check_sealed_key("encrypted_collection_key", &req.encrypted_collection_key)?;
        // The recipient must be a real account (and gets looked up by email
        // on their next sync, so both must match).
        let recipient = self.accounts.get(req.recipient_id).await?;
        if !recipient.email.eq_ignore_ascii_case(&req.recipient_email) {
            return Err(CoreError::validation(
                "recipient_email",
                "does not match the recipient account",
            ));
        }

        // Per-descendant envelopes: every active descendant needs a sealed
        // key computed from its own collection key.
        let descendants = self.collections.find_descendants(root_id).await?;
        let mut sealed_by_id: HashMap<Oid, Vec<u8>> = HashMap::new();
        for key in &req.descendant_keys {
            Self::check_sealed_key("descendant_keys", &key.encrypted_collection_key)?;
            sealed_by_id.insert(key.collection_id, key.encrypted_collection_key.clone());
        }
        for d in &descendants {
            if !sealed_by_id.contains_key(&d.id) {
                return Err(CoreError::validation(
                    "descendant_keys",
                    format!("missing sealed key for descendant {}", d.id),
                ));
            }
        }
        for key in &req.descendant_keys {
            if key.collection_id != root_id && !descendants.iter().any(|d| d.id == key.collection_id) {
                return Err(CoreError::validation(
                    "descendant_keys",
                    format!("collection {} is not in the shared subtree", key.collection_id),
                ));
            }
        }

        Self::upsert_member(
            &mut root,
            &req,
            req.encrypted_collection_key.clone(),
            caller,
            false,
            None,
        );
        let root = self.collections.update(root).await?;

        for mut d in descendants {
            let sealed = sealed_by_id
                .get(&d.id)
                .cloned()
                .unwrap_or_default();
            match d.members.iter().position(|m| m.recipient_id == req.recipient_id) {
                // An independent grant lower in the tree is left alone.
                Some(pos) if !d.members[pos].is_inherited => continue,
                Some(pos) => {
                    let member = &mut d.members[pos];
                    member.permission_level = req.permission_level;
                    member.encrypted_collection_key = sealed;
                    member.inherited_from_id = Some(root_id);
                }
                None => {
                    d.members.push(CollectionMembership {
                        id: Oid::new(),
                        collection_id: d.id,
                        recipient_id: req.recipient_id,
                        recipient_email: req.recipient_email.clone(),
                        permission_level: req.permission_level,
                        encrypted_collection_key: sealed,
                        granted_by_id: caller,
                        created_at: Utc::now(),
                        is_inherited: true,
                        inherited_from_id: Some(root_id),
                    });
                }
            }
            d.modified_by_user_id = caller;
            self.collections.update(d).await?;
        }

        debug!(collection_id = %root_id, recipient = %req.recipient_id, "member added");
        Ok(root)
    }

    fn upsert_member(
        collection: &mut Collection,
        req: &ShareCollectionRequest,
        sealed: Vec<u8>,
        granted_by: Oid,
        is_inherited: bool,
        inherited_from_id: Option<Oid>,
    ) {
        match collection
            .members
            .iter_mut()
            .find(|m| m.recipient_id == req.recipient_id)
        {
            Some(member) => {
                // Duplicate grant: update in place. A direct grant also
                // promotes a previously inherited row.
                member.permission_level = req.permission_level;
                member.encrypted_collection_key = sealed;
                member.is_inherited = is_inherited;
                member.inherited_from_id = inherited_from_id;
            }
            None => collection.members.push(CollectionMembership {
                id: Oid::new(),
                collection_id: collection.id,
                recipient_id: req.recipient_id,
                recipient_email: req.recipient_email.clone(),
                permission_level: req.permission_level,
                encrypted_collection_key: sealed,
                granted_by_id: granted_by,
                created_at: Utc::now(),
                is_inherited,
                inherited_from_id,
            }),
        }
    }

    /// Change a member's permission level in place
    pub async fn update_permission(
        &self,
        caller: Oid,
        collection_id: Oid,
        recipient_id: Oid,
        permission_level: PermissionLevel,
    ) -> Result<Collection> {
        let mut collection = self.collections.get(collection_id).await?;
        Self::gate_admin(&collection, caller)?;

        let member = collection
            .members
            .iter_mut()
            .find(|m| m.recipient_id == recipient_id)
            .ok_or_else(|| CoreError::NotFound("membership".to_string()))?;
        member.permission_level = permission_level;
        collection.modified_by_user_id = caller;
        self.collections.update(collection).await
    }

    /// Revoke a member from a root collection and every inherited grant
    /// underneath it
    ///
    /// Grants the member earned independently elsewhere in the tree are
    /// preserved.
    pub async fn remove_member(
        &self,
        caller: Oid,
        root_id: Oid,
        recipient_id: Oid,
    ) -> Result<usize> {
        let mut root = self.collections.get(root_id).await?;
        Self::gate_admin(&root, caller)?;

        let before = root.members.len();
        root.members.retain(|m| m.recipient_id != recipient_id);
        if root.members.len() == before {
            return Err(CoreError::NotFound("membership".to_string()));
        }
        root.modified_by_user_id = caller;
        self.collections.update(root).await?;
        let mut removed = 1;

        for mut d in self.collections.find_descendants(root_id).await? {
            let before = d.members.len();
            d.members.retain(|m| {
                !(m.recipient_id == recipient_id
                    && m.is_inherited
                    && m.inherited_from_id == Some(root_id))
            });
            if d.members.len() != before {
                d.modified_by_user_id = caller;
                self.collections.update(d).await?;
                removed += 1;
            }
        }

        debug!(collection_id = %root_id, recipient = %recipient_id, removed, "member removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DescendantShareKey, ShareCollectionRequest};
    use crate::store::{MemoryAccountStore, MemoryCollectionStore};
    use crate::types::{Account, CollectionType};
    use maple_crypto::{bundle::UserKeyBundle, envelope::WrappedKey, keys::SymmetricKey};

    struct Fixture {
        engine: ShareEngine,
        collections: Arc<MemoryCollectionStore>,
        owner: Oid,
        member: Oid,
        member_email: String,
        root: Oid,
        child: Oid,
        grandchild: Oid,
    }

    async fn fixture() -> Fixture {
        let collections = Arc::new(MemoryCollectionStore::new());
        let accounts = Arc::new(MemoryAccountStore::new());

        let (b1, _) = UserKeyBundle::generate("pw").unwrap();
        let owner = accounts
            .insert(Account::new(Oid::new(), "owner@example.com", None, b1))
            .await
            .unwrap()
            .id;
        let (b2, _) = UserKeyBundle::generate("pw").unwrap();
        let member_account = accounts
            .insert(Account::new(Oid::new(), "member@example.com", None, b2))
            .await
            .unwrap();

        let make = |parent: Option<(&Oid, Vec<Oid>)>| {
            let (parent_id, ancestors) = match parent {
                Some((p, mut a)) => {
                    a.push(*p);
                    (Some(*p), a)
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
                WrappedKey::wrap(&SymmetricKey::generate(), &SymmetricKey::generate(), 1).unwrap(),
            )
        };

        let root = make(None);
        let child = make(Some((&root.id, root.ancestor_ids.clone())));
        let grandchild = make(Some((&child.id, child.ancestor_ids.clone())));
        let (root_id, child_id, grandchild_id) = (root.id, child.id, grandchild.id);
        collections.insert(root).await.unwrap();
        collections.insert(child).await.unwrap();
        collections.insert(grandchild).await.unwrap();

        Fixture {
            engine: ShareEngine::new(Arc::clone(&collections) as Arc<dyn CollectionStore>, accounts),
            collections,
            owner,
            member: member_account.id,
            member_email: member_account.email,
            root: root_id,
            child: child_id,
            grandchild: grandchild_id,
        }
    }

    fn share_request(fx: &Fixture, level: PermissionLevel) -> ShareCollectionRequest {
        ShareCollectionRequest {
            recipient_id: fx.member,
            recipient_email: fx.member_email.clone(),
            permission_level: level,
            encrypted_collection_key: vec![1u8; 80],
            descendant_keys: vec![
                DescendantShareKey {
                    collection_id: fx.child,
                    encrypted_collection_key: vec![2u8; 80],
                },
                DescendantShareKey {
                    collection_id: fx.grandchild,
                    encrypted_collection_key: vec![3u8; 80],
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_share_propagates_with_per_descendant_keys() {
        let fx = fixture().await;
        fx.engine
            .add_member(fx.owner, fx.root, share_request(&fx, PermissionLevel::ReadWrite))
            .await
            .unwrap();

        let root = fx.collections.get(fx.root).await.unwrap();
        let root_grant = root.member(fx.member).unwrap();
        assert!(!root_grant.is_inherited);
        assert_eq!(root_grant.encrypted_collection_key, vec![1u8; 80]);

        let child = fx.collections.get(fx.child).await.unwrap();
        let child_grant = child.member(fx.member).unwrap();
        assert!(child_grant.is_inherited);
        assert_eq!(child_grant.inherited_from_id, Some(fx.root));
        // The descendant envelope is its own sealed key, not the root's.
        assert_eq!(child_grant.encrypted_collection_key, vec![2u8; 80]);

        let grandchild = fx.collections.get(fx.grandchild).await.unwrap();
        assert_eq!(
            grandchild.member(fx.member).unwrap().encrypted_collection_key,
            vec![3u8; 80]
        );
    }

    #[tokio::test]
    async fn test_missing_descendant_key_rejected() {
        let fx = fixture().await;
        let mut req = share_request(&fx, PermissionLevel::ReadOnly);
        req.descendant_keys.pop();

        let result = fx.engine.add_member(fx.owner, fx.root, req).await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_key_outside_subtree_rejected() {
        let fx = fixture().await;
        let mut req = share_request(&fx, PermissionLevel::ReadOnly);
        req.descendant_keys.push(DescendantShareKey {
            collection_id: Oid::new(),
            encrypted_collection_key: vec![9u8; 80],
        });

        let result = fx.engine.add_member(fx.owner, fx.root, req).await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_share_updates_permission() {
        let fx = fixture().await;
        fx.engine
            .add_member(fx.owner, fx.root, share_request(&fx, PermissionLevel::ReadOnly))
            .await
            .unwrap();
        fx.engine
            .add_member(fx.owner, fx.root, share_request(&fx, PermissionLevel::Admin))
            .await
            .unwrap();

        let root = fx.collections.get(fx.root).await.unwrap();
        let grants: Vec<_> = root
            .members
            .iter()
            .filter(|m| m.recipient_id == fx.member)
            .collect();
        assert_eq!(grants.len(), 1, "no duplicate grants");
        assert_eq!(grants[0].permission_level, PermissionLevel::Admin);
    }

    #[tokio::test]
    async fn test_sharing_the_owner_conflicts() {
        let fx = fixture().await;
        let mut req = share_request(&fx, PermissionLevel::ReadOnly);
        req.recipient_id = fx.owner;

        let result = fx.engine.add_member(fx.owner, fx.root, req).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_share() {
        let fx = fixture().await;
        fx.engine
            .add_member(fx.owner, fx.root, share_request(&fx, PermissionLevel::ReadWrite))
            .await
            .unwrap();

        // The read-write member still cannot share.
        let mut req = share_request(&fx, PermissionLevel::ReadOnly);
        req.recipient_id = fx.member;
        let result = fx.engine.add_member(fx.member, fx.root, req).await;
        assert!(matches!(result, Err(CoreError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_remove_member_preserves_independent_grants() {
        let fx = fixture().await;
        fx.engine
            .add_member(fx.owner, fx.root, share_request(&fx, PermissionLevel::ReadWrite))
            .await
            .unwrap();

        // Give the member an independent grant on the grandchild.
        let direct = ShareCollectionRequest {
            recipient_id: fx.member,
            recipient_email: fx.member_email.clone(),
            permission_level: PermissionLevel::Admin,
            encrypted_collection_key: vec![7u8; 80],
            descendant_keys: Vec::new(),
        };
        fx.engine.add_member(fx.owner, fx.grandchild, direct).await.unwrap();

        let removed = fx
            .engine
            .remove_member(fx.owner, fx.root, fx.member)
            .await
            .unwrap();
        assert_eq!(removed, 2, "root and child grants removed");

        assert!(fx.collections.get(fx.root).await.unwrap().member(fx.member).is_none());
        assert!(fx.collections.get(fx.child).await.unwrap().member(fx.member).is_none());

        let surviving = fx.collections.get(fx.grandchild).await.unwrap();
        let grant = surviving.member(fx.member).unwrap();
        assert!(!grant.is_inherited);
        assert_eq!(grant.permission_level, PermissionLevel::Admin);
    }

    #[tokio::test]
    async fn test_update_permission_in_place() {
        let fx = fixture().await;
        fx.engine
            .add_member(fx.owner, fx.root, share_request(&fx, PermissionLevel::ReadOnly))
            .await
            .unwrap();

        let updated = fx
            .engine
            .update_permission(fx.owner, fx.root, fx.member, PermissionLevel::ReadWrite)
            .await
            .unwrap();
        assert_eq!(
            updated.member(fx.member).unwrap().permission_level,
            PermissionLevel::ReadWrite
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_member() {
        let fx = fixture().await;
        let result = fx.engine.remove_member(fx.owner, fx.root, Oid::new()).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
