//! Secret vault for sidegate.
//!
//! This module provides:
//! - Token-gated storage of opaque JSON secrets
//! - Inheritance between records of the same CID, snapshotted at write time
//! - The deep-merge rule used to flatten inherited payloads
//!
//! # Architecture
//! The vault sits on top of one cache adapter (the remote store in
//! production). It never deletes or rewrites a record: every save mints a
//! new key and token.

pub mod keys;
pub mod merge;
pub mod record;
pub mod store;

pub use keys::{derive_key, generate_token, storage_key, tokens_match, RECORD_PREFIX};
pub use merge::deep_merge;
pub use record::VaultRecord;
pub use store::{RevealedSecret, SavedSecret, SecretVault, VaultOptions};
