//! # Maple Client
//!
//! The MapleFile desktop agent: everything the cloud must never do
//! happens here. The client derives keys from the password, encrypts
//! names, metadata, and bytes before they leave the machine, drives the
//! three-step upload protocol, and reconciles local state against the
//! cloud's version-cursor sync feeds.
//!
//! Modules:
//!
//! - [`api`] - typed HTTP client with transient-error backoff
//! - [`session`] - the on-disk keystore and the unlocked session
//! - [`localdb`] - local record versions, plaintext-name cache, and
//!   persisted upload intents
//! - [`reconciler`] - the version rules that decide fetch / delete /
//!   upload / no-op
//! - [`upload`] - client half of the three-step protocol, bounded
//!   concurrency, fresh-URL resume
//! - [`share`] - hierarchy sharing with per-descendant sealed envelopes

pub mod api;
pub mod config;
pub mod error;
pub mod localdb;
pub mod reconciler;
pub mod session;
pub mod share;
pub mod upload;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use localdb::LocalStore;
pub use reconciler::{Reconciler, SyncOutcome};
pub use session::{Keystore, Session};
pub use upload::UploadScheduler;

/// Default bound on concurrent file uploads
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
