//! Hierarchy sharing, client side
//!
//! Sharing a folder means sealing keys, and only this device can do it:
//! the root collection key and **each descendant's own key** are opened
//! locally and sealed to the recipient's public key. Everything is
//! submitted in one request; the service records the root grant plus the
//! derived, per-descendant inherited grants.

use crate::{api::ApiClient, session::Session, ClientError, Result};
use maple_core::api::{DescendantShareKey, HierarchyNode, ShareCollectionRequest};
use maple_core::{
    types::{Collection, PermissionLevel},
    Oid,
};
use maple_crypto::{keys::PublicKey, keys::SymmetricKey, sealed};
use tracing::{info, instrument};

/// Open a collection's key via whichever path the session has
pub fn open_collection_key(session: &Session, record: &Collection) -> Result<SymmetricKey> {
    let account_id = session.saved.account_id;
    if record.owner_id == account_id {
        let wrapped = record.encrypted_collection_key.as_ref().ok_or_else(|| {
            ClientError::LocalState(format!("collection {} has no key envelope", record.id))
        })?;
        Ok(maple_crypto::open_collection_key_as_owner(
            wrapped,
            session.keys().master_key(),
        )?)
    } else {
        let membership = record
            .member(account_id)
            .ok_or(maple_crypto::CryptoError::NotAMember)?;
        Ok(maple_crypto::open_collection_key_as_member(
            &membership.encrypted_collection_key,
            session.keys().keypair(),
        )?)
    }
}

fn collect_descendants<'a>(node: &'a HierarchyNode, out: &mut Vec<&'a Collection>) {
    for child in &node.children {
        out.push(&child.collection);
        collect_descendants(child, out);
    }
}

/// Share a collection subtree with another account
///
/// Fetches the hierarchy, seals the root key and every descendant's key
/// for the recipient, and submits the grant in one request. The request
/// is idempotent server-side, so an interrupted share is simply re-run.
#[instrument(skip(api, session), fields(collection_id = %collection_id))]
pub async fn share_collection(
    api: &ApiClient,
    session: &Session,
    collection_id: Oid,
    recipient_email: &str,
    permission_level: PermissionLevel,
) -> Result<Collection> {
    let recipient = api.lookup_user(recipient_email).await?;
    let recipient_pk: &PublicKey = &recipient.public_key;

    let tree = api.get_hierarchy(collection_id).await?;
    let root_key = open_collection_key(session, &tree.collection)?;
    let sealed_root = sealed::seal(recipient_pk, root_key.as_bytes())?;

    let mut descendants = Vec::new();
    collect_descendants(&tree, &mut descendants);

    // One envelope per descendant, each from that descendant's own key.
    let mut descendant_keys = Vec::with_capacity(descendants.len());
    for d in descendants {
        let key = open_collection_key(session, d)?;
        descendant_keys.push(DescendantShareKey {
            collection_id: d.id,
            encrypted_collection_key: sealed::seal(recipient_pk, key.as_bytes())?,
        });
    }

    let updated = api
        .add_member(
            collection_id,
            &ShareCollectionRequest {
                recipient_id: recipient.account_id,
                recipient_email: recipient.email.clone(),
                permission_level,
                encrypted_collection_key: sealed_root,
                descendant_keys,
            },
        )
        .await?;

    info!(recipient = %recipient.account_id, "collection shared");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SavedSession, Session};
    use chrono::Utc;
    use maple_core::types::{CollectionMembership, CollectionType};
    use maple_crypto::{bundle::UserKeyBundle, envelope::WrappedKey};

    fn session(password: &str) -> Session {
        let (bundle, _) = UserKeyBundle::generate(password).unwrap();
        let saved = SavedSession {
            account_id: Oid::new(),
            email: "me@example.com".to_string(),
            name: None,
            key_bundle: bundle,
            access_token: "t".to_string(),
            refresh_token: "r".to_string(),
            access_expires_at: Utc::now() + chrono::Duration::hours(1),
            refresh_expires_at: Utc::now() + chrono::Duration::days(1),
        };
        Session::unlock(saved, password).unwrap()
    }

    #[test]
    fn test_open_key_as_owner() {
        let session = session("pw");
        let collection_key = SymmetricKey::generate();
        let collection = Collection::new(
            Oid::new(),
            session.saved.account_id,
            None,
            Vec::new(),
            CollectionType::Folder,
            "bmFtZQ==".to_string(),
            WrappedKey::wrap(&collection_key, session.keys().master_key(), 1).unwrap(),
        );

        let opened = open_collection_key(&session, &collection).unwrap();
        assert_eq!(opened.as_bytes(), collection_key.as_bytes());
    }

    #[test]
    fn test_open_key_as_member() {
        let owner = session("owner-pw");
        let member = session("member-pw");
        let collection_key = SymmetricKey::generate();

        let mut collection = Collection::new(
            Oid::new(),
            owner.saved.account_id,
            None,
            Vec::new(),
            CollectionType::Folder,
            "bmFtZQ==".to_string(),
            WrappedKey::wrap(&collection_key, owner.keys().master_key(), 1).unwrap(),
        );
        collection.members.push(CollectionMembership {
            id: Oid::new(),
            collection_id: collection.id,
            recipient_id: member.saved.account_id,
            recipient_email: member.saved.email.clone(),
            permission_level: PermissionLevel::ReadOnly,
            encrypted_collection_key: sealed::seal(
                member.keys().keypair().public_key(),
                collection_key.as_bytes(),
            )
            .unwrap(),
            granted_by_id: owner.saved.account_id,
            created_at: Utc::now(),
            is_inherited: false,
            inherited_from_id: None,
        });

        let opened = open_collection_key(&member, &collection).unwrap();
        assert_eq!(opened.as_bytes(), collection_key.as_bytes());
    }

    #[test]
    fn test_non_member_cannot_open() {
        let owner = session("owner-pw");
        let stranger = session("stranger-pw");
        let collection = Collection::new(
            Oid::new(),
            owner.saved.account_id,
            None,
            Vec::new(),
            CollectionType::Folder,
            "bmFtZQ==".to_string(),
            WrappedKey::wrap(&SymmetricKey::generate(), owner.keys().master_key(), 1).unwrap(),
        );

        let result = open_collection_key(&stranger, &collection);
        assert!(matches!(
            result,
            Err(ClientError::Crypto(maple_crypto::CryptoError::NotAMember))
        ));
    }

    #[test]
    fn test_descendant_collection() {
        let session = session("pw");
        let make = |name: &str| {
            Collection::new(
                Oid::new(),
                session.saved.account_id,
                None,
                Vec::new(),
                CollectionType::Folder,
                name.to_string(),
                WrappedKey::wrap(&SymmetricKey::generate(), session.keys().master_key(), 1).unwrap(),
            )
        };

        let tree = HierarchyNode {
            collection: make("cm9vdA=="),
            children: vec![HierarchyNode {
                collection: make("Y2hpbGQ="),
                children: vec![HierarchyNode {
                    collection: make("Z3JhbmQ="),
                    children: Vec::new(),
                }],
            }],
        };

        let mut out = Vec::new();
        collect_descendants(&tree, &mut out);
        assert_eq!(out.len(), 2);
    }
}
