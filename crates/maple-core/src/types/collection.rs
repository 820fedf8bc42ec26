//! Collection entity and memberships

use crate::oid::Oid;
use chrono::{DateTime, Utc};
use maple_crypto::encoding;
use maple_crypto::envelope::WrappedKey;
use serde::{Deserialize, Serialize};

/// What a collection represents to the user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Folder,
    Album,
}

/// Lifecycle state of a collection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    Active,
    Deleted,
    Archived,
}

/// Access level granted by a membership
///
/// Ordered: `ReadOnly < ReadWrite < Admin`. Owners pass every gate
/// regardless of membership.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    ReadOnly,
    ReadWrite,
    Admin,
}

/// One account's grant on a collection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionMembership {
    pub id: Oid,
    pub collection_id: Oid,
    pub recipient_id: Oid,
    pub recipient_email: String,
    pub permission_level: PermissionLevel,
    /// The collection key sealed to the recipient's public key
    #[serde(with = "encoding::base64_bytes")]
    pub encrypted_collection_key: Vec<u8>,
    pub granted_by_id: Oid,
    pub created_at: DateTime<Utc>,
    /// True when this grant was derived from an ancestor's share
    #[serde(default)]
    pub is_inherited: bool,
    /// Root of the inheritance chain, when inherited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from_id: Option<Oid>,
}

/// A folder or album
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: Oid,
    pub owner_id: Oid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Oid>,
    /// Path root → immediate parent; never contains `id` itself
    #[serde(default)]
    pub ancestor_ids: Vec<Oid>,
    pub collection_type: CollectionType,
    /// `base64(nonce ‖ ciphertext)` under the collection key; emptied on
    /// soft delete
    #[serde(default)]
    pub encrypted_name: String,
    /// Collection key wrapped under the owner's master key; dropped on
    /// soft delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_collection_key: Option<WrappedKey>,
    #[serde(default)]
    pub members: Vec<CollectionMembership>,
    pub state: CollectionState,
    /// Bumped on every persisted change
    pub version: u64,
    /// Set on soft delete; 0 while live
    #[serde(default)]
    pub tombstone_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub created_by_user_id: Oid,
    pub modified_by_user_id: Oid,
}

impl Collection {
    /// Build a new active collection (ancestor path supplied by the caller)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Oid,
        owner_id: Oid,
        parent_id: Option<Oid>,
        ancestor_ids: Vec<Oid>,
        collection_type: CollectionType,
        encrypted_name: String,
        encrypted_collection_key: WrappedKey,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            parent_id,
            ancestor_ids,
            collection_type,
            encrypted_name,
            encrypted_collection_key: Some(encrypted_collection_key),
            members: Vec::new(),
            state: CollectionState::Active,
            version: 1,
            tombstone_version: 0,
            tombstone_expiry: None,
            created_at: now,
            modified_at: now,
            created_by_user_id: owner_id,
            modified_by_user_id: owner_id,
        }
    }

    /// The membership for an account, if any
    pub fn member(&self, account_id: Oid) -> Option<&CollectionMembership> {
        self.members.iter().find(|m| m.recipient_id == account_id)
    }

    /// Effective permission: owners are above `Admin`, members carry their
    /// grant, everyone else has nothing
    pub fn permission_for(&self, account_id: Oid) -> Option<PermissionLevel> {
        if self.owner_id == account_id {
            return Some(PermissionLevel::Admin);
        }
        self.member(account_id).map(|m| m.permission_level)
    }

    /// The access gate: owner, or member holding at least `level`
    pub fn allows(&self, account_id: Oid, level: PermissionLevel) -> bool {
        self.owner_id == account_id
            || self
                .permission_for(account_id)
                .map(|held| held >= level)
                .unwrap_or(false)
    }

    /// Whether `ancestor_id` appears on this collection's path
    pub fn is_descendant_of(&self, ancestor_id: Oid) -> bool {
        self.ancestor_ids.contains(&ancestor_id)
    }

    /// Ancestor-path invariant: the path never contains the collection
    /// itself, and a parented collection ends its path with the parent
    pub fn ancestors_consistent(&self) -> bool {
        if self.ancestor_ids.contains(&self.id) {
            return false;
        }
        match self.parent_id {
            Some(parent) => self.ancestor_ids.last() == Some(&parent),
            None => self.ancestor_ids.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_crypto::keys::SymmetricKey;

    fn sample(owner: Oid) -> Collection {
        let key = SymmetricKey::generate();
        let wrapped = WrappedKey::wrap(&key, &SymmetricKey::generate(), 1).unwrap();
        Collection::new(
            Oid::new(),
            owner,
            None,
            Vec::new(),
            CollectionType::Folder,
            "ZmFrZQ==".to_string(),
            wrapped,
        )
    }

    fn membership(collection: &Collection, recipient: Oid, level: PermissionLevel) -> CollectionMembership {
        CollectionMembership {
            id: Oid::new(),
            collection_id: collection.id,
            recipient_id: recipient,
            recipient_email: "m@example.com".to_string(),
            permission_level: level,
            encrypted_collection_key: vec![0u8; 80],
            granted_by_id: collection.owner_id,
            created_at: Utc::now(),
            is_inherited: false,
            inherited_from_id: None,
        }
    }

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::ReadOnly < PermissionLevel::ReadWrite);
        assert!(PermissionLevel::ReadWrite < PermissionLevel::Admin);
    }

    #[test]
    fn test_owner_passes_every_gate() {
        let owner = Oid::new();
        let c = sample(owner);
        assert!(c.allows(owner, PermissionLevel::Admin));
        assert_eq!(c.permission_for(owner), Some(PermissionLevel::Admin));
    }

    #[test]
    fn test_member_gate() {
        let owner = Oid::new();
        let reader = Oid::new();
        let mut c = sample(owner);
        c.members.push(membership(&c, reader, PermissionLevel::ReadOnly));

        assert!(c.allows(reader, PermissionLevel::ReadOnly));
        assert!(!c.allows(reader, PermissionLevel::ReadWrite));
        assert!(!c.allows(Oid::new(), PermissionLevel::ReadOnly));
    }

    #[test]
    fn test_ancestor_consistency() {
        let owner = Oid::new();
        let mut c = sample(owner);
        assert!(c.ancestors_consistent());

        let parent = Oid::new();
        c.parent_id = Some(parent);
        c.ancestor_ids = vec![Oid::new(), parent];
        assert!(c.ancestors_consistent());

        c.ancestor_ids.push(c.id);
        assert!(!c.ancestors_consistent());
    }

    #[test]
    fn test_state_serde_snake_case() {
        assert_eq!(serde_json::to_string(&CollectionState::Deleted).unwrap(), "\"deleted\"");
        assert_eq!(serde_json::to_string(&CollectionType::Album).unwrap(), "\"album\"");
        assert_eq!(
            serde_json::to_string(&PermissionLevel::ReadWrite).unwrap(),
            "\"read_write\""
        );
    }
}
