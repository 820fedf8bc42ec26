//! # Maple Server
//!
//! The MapleFile cloud service: a stateless request handler over the
//! domain stores, speaking HTTPS+JSON for control and handing out
//! presigned URLs for bulk bytes.
//!
//! The service stores only ciphertext, wrapped keys, and routing/access
//! metadata. It can verify sizes and enforce permissions; it can never
//! read a name, a file, or a key.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{Session, TokenService};
pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{run_server, run_server_with_shutdown};
pub use state::AppState;
