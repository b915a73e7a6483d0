//! Local filesystem cache adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

use crate::adapter::CacheAdapter;
use sidegate_common::{Error, Result};

/// Local filesystem cache adapter.
///
/// Each key maps to a file below the storage root holding the JSON text of
/// the cached value. Keys may contain `/` to form subdirectories
/// (`ipfs/<cid>`), but every resolved path must stay inside the root.
pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    /// Create a new local adapter with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    /// - The stored root is canonical, so containment checks compare real
    ///   paths
    ///
    /// # Errors
    /// - Invalid path
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(root)?;
        }

        let root = std::fs::canonicalize(root)?;
        Ok(Self { root })
    }

    /// Canonical storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the candidate path for a key.
    ///
    /// Rejects keys that could name anything outside the root before the
    /// filesystem is touched.
    fn candidate_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::Security("empty cache key".to_string()));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    warn!(key, "rejected cache key escaping storage root");
                    return Err(Error::Security(format!("malformed key: {}", key)));
                }
            }
        }

        Ok(self.root.join(relative))
    }

    /// Resolve an existing path and verify it stays inside the root.
    async fn resolve_within_root(&self, path: &Path, key: &str) -> Result<PathBuf> {
        let resolved = fs::canonicalize(path).await?;
        if !resolved.starts_with(&self.root) {
            warn!(
                key,
                resolved = %resolved.display(),
                "cache key resolved outside storage root"
            );
            return Err(Error::Security(format!("malformed key: {}", key)));
        }
        Ok(resolved)
    }

    /// Closest ancestor of `path` that already exists on disk.
    async fn nearest_existing_ancestor(&self, path: &Path) -> Result<PathBuf> {
        let mut current = path;
        loop {
            if fs::try_exists(current).await? {
                return Ok(current.to_path_buf());
            }
            current = match current.parent() {
                Some(parent) => parent,
                None => return Ok(self.root.clone()),
            };
        }
    }
}

#[async_trait]
impl CacheAdapter for LocalAdapter {
    fn name(&self) -> &str {
        "fs"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let candidate = self.candidate_path(key)?;

        // A miss still has to be a miss inside the root
        let existing = self.nearest_existing_ancestor(&candidate).await?;
        let resolved = self.resolve_within_root(&existing, key).await?;
        if existing != candidate {
            return Ok(None);
        }
        if resolved.is_dir() {
            return Err(Error::InvalidInput(format!(
                "cache key names a directory: {}",
                key
            )));
        }

        let raw = fs::read_to_string(&resolved).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(&self, key: &str, value: &Value, _ttl: Option<Duration>) -> Result<()> {
        let candidate = self.candidate_path(key)?;
        let parent = candidate
            .parent()
            .ok_or_else(|| Error::Security(format!("malformed key: {}", key)))?;

        // Check before creating anything, then again once the directories exist
        let existing = self.nearest_existing_ancestor(parent).await?;
        self.resolve_within_root(&existing, key).await?;
        fs::create_dir_all(parent).await?;
        self.resolve_within_root(parent, key).await?;

        // A dangling symlink does not "exist" but would still be followed
        if fs::symlink_metadata(&candidate).await.is_ok() {
            if !fs::try_exists(&candidate).await? {
                warn!(key, "rejected dangling symlink in storage root");
                return Err(Error::Security(format!("malformed key: {}", key)));
            }
            self.resolve_within_root(&candidate, key).await?;
        }

        fs::write(&candidate, serde_json::to_vec(value)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_set_get() {
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();

        adapter
            .set("ipfs/QmCode", &json!("export default 1"), None)
            .await
            .unwrap();

        assert_eq!(
            adapter.get("ipfs/QmCode").await.unwrap(),
            Some(json!("export default 1"))
        );
        assert!(temp.path().join("ipfs").join("QmCode").is_file());
    }

    #[tokio::test]
    async fn test_local_missing_is_miss() {
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();

        assert_eq!(adapter.get("abis/0xdead").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("storage");
        let adapter = LocalAdapter::new(&root).unwrap();

        assert!(root.is_dir());
        assert!(adapter.root().is_absolute());
    }

    #[tokio::test]
    async fn test_local_traversal_get_fails_closed() {
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path().join("storage")).unwrap();

        let err = adapter.get("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[tokio::test]
    async fn test_local_traversal_set_fails_closed() {
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path().join("storage")).unwrap();

        let err = adapter
            .set("../escaped", &json!(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
        assert!(!temp.path().join("escaped").exists());
    }

    #[tokio::test]
    async fn test_local_absolute_key_rejected() {
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();

        let err = adapter.get("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[tokio::test]
    async fn test_local_empty_key_rejected() {
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();

        assert!(matches!(
            adapter.get("").await.unwrap_err(),
            Error::Security(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_symlink_escape_fails_closed() {
        let outside = TempDir::new().unwrap();
        let secret = outside.path().join("secret.json");
        std::fs::write(&secret, "\"top secret\"").unwrap();

        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();
        std::os::unix::fs::symlink(&secret, temp.path().join("link")).unwrap();

        let err = adapter.get("link").await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));

        let err = adapter.set("link", &json!("overwrite"), None).await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
        assert_eq!(std::fs::read_to_string(&secret).unwrap(), "\"top secret\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_symlinked_directory_escape_fails_closed() {
        let outside = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("ipfs")).unwrap();

        let err = adapter
            .set("ipfs/QmCode", &json!("code"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Security(_)));
        assert!(!outside.path().join("QmCode").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_get_below_escaping_directory_fails_closed() {
        let outside = TempDir::new().unwrap();
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("ipfs")).unwrap();

        // Nothing exists at the target, but the lookup must not report a miss
        let err = adapter.get("ipfs/QmCode").await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_dangling_symlink_not_followed() {
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("planted.json");
        let temp = TempDir::new().unwrap();
        let adapter = LocalAdapter::new(temp.path()).unwrap();
        std::os::unix::fs::symlink(&target, temp.path().join("link")).unwrap();

        assert_eq!(adapter.get("link").await.unwrap(), None);
        let err = adapter.set("link", &json!("x"), None).await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
        assert!(!target.exists());
    }
}
