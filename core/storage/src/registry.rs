//! Adapter kinds and their resolution from configuration.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::CacheAdapter;
use crate::local::LocalAdapter;
use crate::memory::MemoryAdapter;
use crate::remote::{RemoteAdapter, RemoteConfig};
use sidegate_common::{Error, Result};

/// The closed set of cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Process memory, private to one memoizer.
    Memory,
    /// Files below the storage root.
    Fs,
    /// Remote key-value store.
    Redis,
}

impl AdapterKind {
    /// Configuration name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::Memory => "memory",
            AdapterKind::Fs => "fs",
            AdapterKind::Redis => "redis",
        }
    }

    /// Parse a comma separated chain such as `"fs,redis"`.
    ///
    /// # Errors
    /// - Unknown adapter name
    /// - Empty chain
    pub fn parse_chain(chain: &str) -> Result<Vec<AdapterKind>> {
        let kinds = chain
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse::<AdapterKind>)
            .collect::<Result<Vec<_>>>()?;

        if kinds.is_empty() {
            return Err(Error::InvalidInput(
                "adapter chain cannot be empty".to_string(),
            ));
        }
        Ok(kinds)
    }
}

impl FromStr for AdapterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(AdapterKind::Memory),
            "fs" => Ok(AdapterKind::Fs),
            "redis" => Ok(AdapterKind::Redis),
            other => Err(Error::InvalidInput(format!(
                "unknown cache adapter '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves adapter kinds to adapter instances.
///
/// The filesystem and remote tiers are shared by every chain resolved from
/// one registry. The memory tier is fresh per resolution, so each memoizer
/// owns its own map.
pub struct AdapterRegistry {
    local: Arc<LocalAdapter>,
    remote: Arc<RemoteAdapter>,
}

impl AdapterRegistry {
    /// Create a registry.
    ///
    /// # Postconditions
    /// - Storage root exists
    /// - Remote tier is connected if `remote` is given, and otherwise fails
    ///   every call with a configuration error
    pub fn new(storage_root: impl AsRef<Path>, remote: Option<RemoteConfig>) -> Result<Self> {
        Ok(Self {
            local: Arc::new(LocalAdapter::new(storage_root)?),
            remote: Arc::new(RemoteAdapter::from_config(remote)?),
        })
    }

    /// Resolve one adapter.
    pub fn resolve(&self, kind: AdapterKind) -> Arc<dyn CacheAdapter> {
        match kind {
            AdapterKind::Memory => Arc::new(MemoryAdapter::new()) as Arc<dyn CacheAdapter>,
            AdapterKind::Fs => self.local.clone() as Arc<dyn CacheAdapter>,
            AdapterKind::Redis => self.remote.clone() as Arc<dyn CacheAdapter>,
        }
    }

    /// Resolve an ordered chain of adapters.
    ///
    /// # Errors
    /// - Empty chain
    pub fn resolve_chain(&self, kinds: &[AdapterKind]) -> Result<Vec<Arc<dyn CacheAdapter>>> {
        if kinds.is_empty() {
            return Err(Error::InvalidInput(
                "adapter chain cannot be empty".to_string(),
            ));
        }
        Ok(kinds.iter().map(|kind| self.resolve(*kind)).collect())
    }

    /// The shared remote tier.
    pub fn remote(&self) -> Arc<RemoteAdapter> {
        self.remote.clone()
    }
}
