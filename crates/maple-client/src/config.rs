//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

/// Desktop agent configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Service base URL (no trailing slash)
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Where the keystore and local database live
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_dir = std::env::var_os("MAPLE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs_fallback_home()
                    .join(".maplefile")
            });
        Self {
            base_url: std::env::var("MAPLE_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            timeout: Duration::from_secs(30),
            data_dir,
        }
    }
}

impl ClientConfig {
    /// Create a config for a given endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Override the data directory (tests use a temp dir)
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Path of the keystore file
    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Path of the local database file
    pub fn localdb_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

fn dirs_fallback_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
