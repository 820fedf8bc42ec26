//! # Maple Store
//!
//! Object-storage layer for the MapleFile sync system.
//!
//! The control plane never touches bulk bytes: clients stream ciphertext
//! directly to object storage through presigned URLs, and the service only
//! verifies existence and size afterwards. This crate provides:
//!
//! - **`ObjectStore` trait**: the capability set the rest of the system is
//!   written against (`put`, `get`, `delete`, `presign`, `exists`, `size`)
//! - **Deterministic object paths**: `{owner_id}/{file_id}` for content,
//!   `{owner_id}/{file_id}.thumb` for thumbnails
//! - **`MemoryObjectStore`**: in-memory backend used by tests and
//!   single-node deployments, minting verifiable presigned URLs
//!
//! Bytes are opaque to every implementation; nothing here ever interprets
//! or decrypts them.

pub mod error;
pub mod memory;
pub mod object;
pub mod presign;

pub use error::{Result, StoreError};
pub use memory::MemoryObjectStore;
pub use object::{object_path, thumbnail_path, ObjectStore, PresignedUrl};
pub use presign::UrlSigner;

use std::time::Duration;

/// Ceiling for any presigned URL lifetime (24 h)
pub const MAX_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default lifetime of a presigned download URL (15 min)
pub const DEFAULT_DOWNLOAD_TTL: Duration = Duration::from_secs(15 * 60);

/// Default lifetime of a presigned upload URL (1 h)
pub const DEFAULT_UPLOAD_TTL: Duration = Duration::from_secs(60 * 60);
