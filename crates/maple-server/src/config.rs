//! Service configuration

use serde::{Deserialize, Serialize};

/// Cloud service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL presigned links are minted under
    pub public_url: String,
    /// Token key, base64 of 32 bytes; generated at startup when unset
    pub token_key: Option<String>,
    /// Access-token lifetime in seconds
    pub access_ttl_secs: u64,
    /// Refresh-token lifetime in seconds
    pub refresh_ttl_secs: u64,
    /// Presigned upload-URL lifetime in seconds
    pub upload_url_ttl_secs: u64,
    /// Presigned download-URL lifetime in seconds
    pub download_url_ttl_secs: u64,
    /// Login one-time-token lifetime in seconds
    pub ott_ttl_secs: u64,
    /// Rate limit (requests per second per account)
    pub rate_limit_rps: u32,
    /// ISO country codes refused at the edge
    pub banned_countries: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_url: "http://localhost:8000".to_string(),
            token_key: None,
            access_ttl_secs: 30 * 60,
            refresh_ttl_secs: 14 * 24 * 60 * 60,
            upload_url_ttl_secs: 60 * 60,
            download_url_ttl_secs: 15 * 60,
            ott_ttl_secs: 10 * 60,
            rate_limit_rps: 100,
            banned_countries: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9999,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:9999");
    }
}
