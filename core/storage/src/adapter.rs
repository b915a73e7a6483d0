//! Cache adapter trait definition.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use sidegate_common::Result;

/// A storage tier that can hold cached JSON values by key.
///
/// Implementations decide on their own persisted encoding. Only the remote
/// tier honors a TTL; the others keep entries until the tier itself goes
/// away.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Get the adapter name (e.g., "memory", "fs", "redis").
    fn name(&self) -> &str;

    /// Look up a cached value.
    ///
    /// # Returns
    /// - `Ok(Some(value))` on a hit
    /// - `Ok(None)` on a miss
    ///
    /// # Errors
    /// - Configuration missing (remote tier)
    /// - Key escapes the storage root (filesystem tier)
    /// - Network/I/O errors
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value.
    ///
    /// # Postconditions
    /// - A following `get` on the same tier observes the value (until the
    ///   TTL elapses, for tiers that honor it)
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()>;
}
