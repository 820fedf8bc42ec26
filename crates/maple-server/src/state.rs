//! Application state shared across handlers

use crate::auth::{OttEntry, TokenService};
use crate::config::ServerConfig;
use chrono::Duration;
use dashmap::DashMap;
use maple_core::{
    store::{AccountStore, CollectionStore, FileStore},
    CollectionManager, FileManager, MemoryAccountStore, MemoryCollectionStore, MemoryFileStore,
    ShareEngine, SyncEngine, UploadOrchestrator,
};
use maple_crypto::keys::SymmetricKey;
use maple_store::{MemoryObjectStore, ObjectStore, UrlSigner};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

/// Everything a handler can reach
pub struct AppState {
    pub config: ServerConfig,
    pub accounts: Arc<dyn AccountStore>,
    pub collections: CollectionManager,
    pub files: FileManager,
    pub sharing: ShareEngine,
    pub sync: SyncEngine,
    pub uploads: UploadOrchestrator,
    /// The bundled object store, also serving the `/storage` byte surface
    pub objects: Arc<MemoryObjectStore>,
    pub tokens: TokenService,
    /// Pending login codes by lowercased email
    pub login_otts: DashMap<String, OttEntry>,
    /// Banned-country set; read-mostly
    pub blocklist: RwLock<HashSet<String>>,
}

impl AppState {
    /// Build the state with the bundled in-memory backends
    pub fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
        let collection_store: Arc<dyn CollectionStore> = Arc::new(MemoryCollectionStore::new());
        let file_store: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());

        let signer = UrlSigner::with_random_secret(config.public_url.clone());
        let objects = Arc::new(MemoryObjectStore::new(signer));
        info!("storage mode: in-memory (single-node deployment)");

        let token_key = match &config.token_key {
            Some(encoded) => SymmetricKey::from_base64(encoded)
                .map_err(|e| anyhow::anyhow!("invalid token key: {e}"))?,
            None => {
                warn!("no token key configured; sessions will not survive a restart");
                SymmetricKey::generate()
            }
        };
        let tokens = TokenService::new(
            token_key,
            Duration::seconds(config.access_ttl_secs as i64),
            Duration::seconds(config.refresh_ttl_secs as i64),
        );

        let collections = CollectionManager::new(Arc::clone(&collection_store), Arc::clone(&accounts));
        let files = FileManager::new(Arc::clone(&file_store), Arc::clone(&collection_store));
        let sharing = ShareEngine::new(Arc::clone(&collection_store), Arc::clone(&accounts));
        let sync = SyncEngine::new(Arc::clone(&collection_store), Arc::clone(&file_store));
        let uploads = UploadOrchestrator::new(
            file_store,
            collection_store,
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
        )
        .with_ttls(
            StdDuration::from_secs(config.upload_url_ttl_secs),
            StdDuration::from_secs(config.download_url_ttl_secs),
        );

        let blocklist: HashSet<String> = config
            .banned_countries
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        if !blocklist.is_empty() {
            info!(countries = ?blocklist, "country blocklist active");
        }

        Ok(Arc::new(Self {
            config,
            accounts,
            collections,
            files,
            sharing,
            sync,
            uploads,
            objects,
            tokens,
            login_otts: DashMap::new(),
            blocklist: RwLock::new(blocklist),
        }))
    }

    /// Whether requests tagged with this country code are refused
    pub fn is_country_blocked(&self, code: &str) -> bool {
        self.blocklist.read().contains(&code.trim().to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocklist_normalization() {
        let state = AppState::new(ServerConfig {
            banned_countries: vec!["kp ".to_string(), "IR".to_string()],
            ..Default::default()
        })
        .unwrap();

        assert!(state.is_country_blocked("KP"));
        assert!(state.is_country_blocked("ir"));
        assert!(!state.is_country_blocked("CA"));
    }
}
