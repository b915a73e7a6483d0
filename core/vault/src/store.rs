//! Token-gated secret storage on top of a cache adapter.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::keys::{storage_key, tokens_match};
use crate::record::VaultRecord;
use sidegate_common::{Cid, Error, Result, SecretToken};
use sidegate_storage::CacheAdapter;

/// Vault tuning.
#[derive(Debug, Clone, Default)]
pub struct VaultOptions {
    /// TTL for stored records. `None` keeps them until the store evicts.
    pub ttl: Option<Duration>,
}

/// Result of a save: where the record lives and how to read it back.
#[derive(Debug, Clone, Serialize)]
pub struct SavedSecret {
    pub key: String,
    pub token: SecretToken,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevealedSecret {
    /// Payload with the inherited snapshot merged in.
    pub data: Value,
    /// Key of the immediate ancestor, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit: Option<String>,
}

/// Secret vault.
///
/// Anyone may write; reading a record requires the token minted when it
/// was saved.
pub struct SecretVault {
    store: Arc<dyn CacheAdapter>,
    options: VaultOptions,
}

impl SecretVault {
    /// Create a vault over `store`.
    pub fn new(store: Arc<dyn CacheAdapter>) -> Self {
        Self::with_options(store, VaultOptions::default())
    }

    /// Create with custom options.
    pub fn with_options(store: Arc<dyn CacheAdapter>, options: VaultOptions) -> Self {
        Self { store, options }
    }

    /// Store a secret, optionally inheriting from an existing record.
    ///
    /// # Postconditions
    /// - A new record exists under the returned key; existing records are
    ///   untouched
    ///
    /// # Errors
    /// - `NotFound` if `inherit` names no record
    /// - `AccessDenied` if `inherit` belongs to another CID; nothing is
    ///   written
    /// - `Configuration` if the backing store is not set up
    pub async fn save(&self, cid: &Cid, data: Value, inherit: Option<&str>) -> Result<SavedSecret> {
        let record = match inherit {
            None => VaultRecord::root(cid.clone(), data),
            Some(ancestor_key) => {
                let ancestor = self.load(ancestor_key).await?.ok_or_else(|| {
                    Error::NotFound(format!("inherit target not found: {}", ancestor_key))
                })?;
                VaultRecord::inheriting(cid.clone(), data, &ancestor, ancestor_key).map_err(
                    |err| {
                        warn!(cid = %cid, inherit = ancestor_key, "rejected cross-cid inheritance");
                        err
                    },
                )?
            }
        };

        let key = record.key()?;
        let location = storage_key(&key).ok_or_else(|| {
            Error::Serialization(format!("derived an invalid record key: {}", key))
        })?;
        self.store
            .set(&location, &record.to_value()?, self.options.ttl)
            .await?;

        info!(cid = %cid, key = %key, inherit = ?inherit, "vault record saved");
        Ok(SavedSecret {
            key,
            token: record.token.clone(),
        })
    }

    /// Read a secret.
    ///
    /// # Errors
    /// - `NotFound` if no record exists under `key`
    /// - `AccessDenied` if `token` does not match; nothing of the record is
    ///   revealed
    pub async fn fetch(&self, key: &str, token: &str) -> Result<RevealedSecret> {
        let record = self
            .load(key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("vault record not found: {}", key)))?;

        if !tokens_match(&record.token, token) {
            warn!(key, "vault token mismatch");
            return Err(Error::AccessDenied("invalid token".to_string()));
        }

        debug!(key, "vault record revealed");
        Ok(RevealedSecret {
            data: record.resolved_data(),
            inherit: record.inherit.clone(),
        })
    }

    async fn load(&self, key: &str) -> Result<Option<VaultRecord>> {
        let Some(location) = storage_key(key) else {
            debug!(key, "not a vault record key");
            return Ok(None);
        };
        match self.store.get(&location).await? {
            Some(value) => Ok(Some(VaultRecord::from_value(value)?)),
            None => Ok(None),
        }
    }
}
