//! Sync reconciliation
//!
//! The feeds deliver `(id, version, tombstone_version)` projections; the
//! local database holds this device's versions. Four rules decide what
//! happens, in this order:
//!
//! 1. cloud tombstone newer than local → delete locally
//! 2. cloud version newer than local → fetch the full record, overwrite
//! 3. local version newer than cloud → the local change needs uploading
//! 4. equal → nothing

use crate::{
    api::ApiClient,
    localdb::{LocalCollection, LocalFile, LocalStore},
    session::Session,
    Result,
};
use maple_core::{
    types::{Collection, FileRecord},
    Oid,
};
use maple_crypto::{aead, keys::SymmetricKey};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// What reconciliation decided for one record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    FetchAndOverwrite,
    DeleteLocal,
    UploadLocal,
    Noop,
}

/// Apply the version rules to one feed item
pub fn decide(cloud_version: u64, cloud_tombstone_version: u64, local_version: u64) -> Action {
    if cloud_tombstone_version > local_version {
        Action::DeleteLocal
    } else if cloud_version > local_version {
        Action::FetchAndOverwrite
    } else if local_version > cloud_version {
        Action::UploadLocal
    } else {
        Action::Noop
    }
}

/// Totals from one reconciliation run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub fetched: usize,
    pub deleted: usize,
    /// Records where this device is ahead; the caller pushes them
    pub to_upload: Vec<Oid>,
}

/// Drives the two feeds against the local database
pub struct Reconciler<'a> {
    api: &'a ApiClient,
    session: &'a Session,
    /// Collection keys opened during this run
    keys: HashMap<Oid, SymmetricKey>,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a ApiClient, session: &'a Session) -> Self {
        Self {
            api,
            session,
            keys: HashMap::new(),
        }
    }

    /// Open a collection's key via whichever path this account has
    fn open_collection_key(&mut self, record: &Collection) -> Option<SymmetricKey> {
        if let Some(key) = self.keys.get(&record.id) {
            return Some(key.clone());
        }
        let account_id = self.session.saved.account_id;
        let opened = if record.owner_id == account_id {
            record.encrypted_collection_key.as_ref().and_then(|wrapped| {
                maple_crypto::open_collection_key_as_owner(wrapped, self.session.keys().master_key())
                    .ok()
            })
        } else {
            record.member(account_id).and_then(|m| {
                maple_crypto::open_collection_key_as_member(
                    &m.encrypted_collection_key,
                    self.session.keys().keypair(),
                )
                .ok()
            })
        };
        if let Some(key) = &opened {
            self.keys.insert(record.id, key.clone());
        }
        opened
    }

    fn decrypt_collection_name(&mut self, record: &Collection) -> Option<String> {
        if record.encrypted_name.is_empty() {
            return None;
        }
        let key = self.open_collection_key(record)?;
        match aead::decrypt_string_field(&key, &record.encrypted_name) {
            Ok(bytes) => String::from_utf8(bytes).ok(),
            Err(e) => {
                warn!(collection_id = %record.id, error = %e, "could not decrypt collection name");
                None
            }
        }
    }

    fn decrypt_file_name(&mut self, collection: &Collection, record: &FileRecord) -> Option<String> {
        let collection_key = self.open_collection_key(collection)?;
        let file_key =
            maple_crypto::open_file_key(&record.encrypted_file_key, &collection_key).ok()?;
        let metadata_json = aead::decrypt_string_field(&file_key, &record.encrypted_metadata).ok()?;
        let metadata: crate::upload::FileMetadata = serde_json::from_slice(&metadata_json).ok()?;
        Some(metadata.name)
    }

    /// Walk the collection feed to the end, applying every page
    #[instrument(skip_all)]
    pub async fn sync_collections(&mut self, local: &mut LocalStore) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        let mut cursor = local.collection_cursor();

        loop {
            let page = self.api.sync_collections(cursor.as_ref(), None).await?;
            for item in &page.items {
                let local_version = local.collection(item.id).map(|c| c.version).unwrap_or(0);
                match decide(item.version, item.tombstone_version, local_version) {
                    Action::DeleteLocal => {
                        local.remove_collection(item.id);
                        outcome.deleted += 1;
                    }
                    Action::FetchAndOverwrite => {
                        let record = self.api.get_collection(item.id).await?;
                        let name = self.decrypt_collection_name(&record);
                        let cached_envelope = record.encrypted_collection_key.clone().or_else(|| {
                            local
                                .collection(item.id)
                                .and_then(|c| c.encrypted_collection_key.clone())
                        });
                        local.upsert_collection(LocalCollection {
                            id: record.id,
                            version: record.version,
                            state: record.state,
                            parent_id: record.parent_id,
                            name,
                            encrypted_collection_key: cached_envelope,
                        });
                        outcome.fetched += 1;
                    }
                    Action::UploadLocal => outcome.to_upload.push(item.id),
                    Action::Noop => {}
                }
            }
            if let Some(next) = page.next_cursor {
                cursor = Some(next);
            }
            if !page.has_more {
                break;
            }
        }

        local.set_collection_cursor(cursor);
        local.save()?;
        debug!(fetched = outcome.fetched, deleted = outcome.deleted, "collection sync pass done");
        Ok(outcome)
    }

    /// Walk the file feed to the end, applying every page
    #[instrument(skip_all)]
    pub async fn sync_files(&mut self, local: &mut LocalStore) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        let mut cursor = local.file_cursor();
        let mut collections: HashMap<Oid, Collection> = HashMap::new();

        loop {
            let page = self.api.sync_files(cursor.as_ref(), None).await?;
            for item in &page.items {
                let local_version = local.file(item.id).map(|f| f.version).unwrap_or(0);
                match decide(item.version, item.tombstone_version, local_version) {
                    Action::DeleteLocal => {
                        local.remove_file(item.id);
                        outcome.deleted += 1;
                    }
                    Action::FetchAndOverwrite => {
                        let record = self.api.get_file(item.id).await?;
                        if !collections.contains_key(&record.collection_id) {
                            let c = self.api.get_collection(record.collection_id).await?;
                            collections.insert(c.id, c);
                        }
                        let collection = &collections[&record.collection_id];
                        let name = self.decrypt_file_name(collection, &record);
                        let locked = local.file(item.id).map(|f| f.locked).unwrap_or(false);
                        local.upsert_file(LocalFile {
                            id: record.id,
                            collection_id: record.collection_id,
                            version: record.version,
                            state: record.state,
                            name,
                            locked,
                            plaintext_path: local
                                .file(item.id)
                                .and_then(|f| f.plaintext_path.clone()),
                        });
                        outcome.fetched += 1;
                    }
                    Action::UploadLocal => outcome.to_upload.push(item.id),
                    Action::Noop => {}
                }
            }
            if let Some(next) = page.next_cursor {
                cursor = Some(next);
            }
            if !page.has_more {
                break;
            }
        }

        local.set_file_cursor(cursor);
        local.save()?;
        debug!(fetched = outcome.fetched, deleted = outcome.deleted, "file sync pass done");
        Ok(outcome)
    }
}
