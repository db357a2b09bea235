//! Versioned object stores.

use crate::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// A keyed, versioned store of opaque byte values.
///
/// Every `put` creates a new version; existing versions are never
/// rewritten, so readers always observe a consistent value.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores a new version under `key`, returning the version number
    /// (1-based, monotonically increasing per key).
    async fn put(&self, key: &str, value: &[u8]) -> RegistryResult<u64>;

    /// Returns the latest version of `key` and its version number.
    async fn get(&self, key: &str) -> RegistryResult<(Vec<u8>, u64)>;

    /// Returns a specific version of `key`.
    async fn get_version(&self, key: &str, version: u64) -> RegistryResult<Vec<u8>>;

    /// Lists the stored versions of `key`, ascending.
    async fn versions(&self, key: &str) -> RegistryResult<Vec<u64>>;

    /// Returns true if any version exists under `key`.
    async fn contains(&self, key: &str) -> RegistryResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(RegistryError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Removes every version of `key`.
    async fn delete(&self, key: &str) -> RegistryResult<()>;

    /// Lists all stored keys.
    async fn keys(&self) -> RegistryResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Process-local object store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, value: &[u8]) -> RegistryResult<u64> {
        let mut objects = self.objects.write();
        let versions = objects.entry(key.to_string()).or_default();
        versions.push(value.to_vec());
        Ok(versions.len() as u64)
    }

    async fn get(&self, key: &str) -> RegistryResult<(Vec<u8>, u64)> {
        let objects = self.objects.read();
        let versions = objects
            .get(key)
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))?;
        let latest = versions
            .last()
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))?;
        Ok((latest.clone(), versions.len() as u64))
    }

    async fn get_version(&self, key: &str, version: u64) -> RegistryResult<Vec<u8>> {
        let objects = self.objects.read();
        let versions = objects
            .get(key)
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))?;
        versions
            .get(version.checked_sub(1).unwrap_or(u64::MAX) as usize)
            .cloned()
            .ok_or(RegistryError::VersionNotFound {
                key: key.to_string(),
                version,
            })
    }

    async fn versions(&self, key: &str) -> RegistryResult<Vec<u64>> {
        let objects = self.objects.read();
        let versions = objects
            .get(key)
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))?;
        Ok((1..=versions.len() as u64).collect())
    }

    async fn delete(&self, key: &str) -> RegistryResult<()> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))
    }

    async fn keys(&self) -> RegistryResult<Vec<String>> {
        Ok(self.objects.read().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Filesystem implementation
// ---------------------------------------------------------------------------

/// Filesystem-backed object store.
///
/// Layout: `<root>/<encoded key>/<version>.bin`. The encoding keeps keys
/// like `worker:name` path-safe and reversible. Writes serialise on one
/// mutex so concurrent puts to the same key get distinct versions.
pub struct FsObjectStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsObjectStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }

    async fn list_versions(&self, dir: &Path) -> RegistryResult<Vec<u64>> {
        let mut versions = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".bin") {
                if let Ok(version) = stem.parse::<u64>() {
                    versions.push(version);
                }
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, value: &[u8]) -> RegistryResult<u64> {
        let _guard = self.write_lock.lock().await;

        let dir = self.key_dir(key);
        tokio::fs::create_dir_all(&dir).await?;

        let next = self.list_versions(&dir).await?.last().copied().unwrap_or(0) + 1;
        let tmp = dir.join(format!("{}.tmp", next));
        let path = dir.join(format!("{}.bin", next));

        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(key = key, version = next, "Stored object version");
        Ok(next)
    }

    async fn get(&self, key: &str) -> RegistryResult<(Vec<u8>, u64)> {
        let dir = self.key_dir(key);
        if !dir.is_dir() {
            return Err(RegistryError::KeyNotFound(key.to_string()));
        }
        let latest = self
            .list_versions(&dir)
            .await?
            .last()
            .copied()
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))?;
        let bytes = tokio::fs::read(dir.join(format!("{}.bin", latest))).await?;
        Ok((bytes, latest))
    }

    async fn get_version(&self, key: &str, version: u64) -> RegistryResult<Vec<u8>> {
        let dir = self.key_dir(key);
        if !dir.is_dir() {
            return Err(RegistryError::KeyNotFound(key.to_string()));
        }
        match tokio::fs::read(dir.join(format!("{}.bin", version))).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::VersionNotFound {
                    key: key.to_string(),
                    version,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn versions(&self, key: &str) -> RegistryResult<Vec<u64>> {
        let dir = self.key_dir(key);
        if !dir.is_dir() {
            return Err(RegistryError::KeyNotFound(key.to_string()));
        }
        self.list_versions(&dir).await
    }

    async fn delete(&self, key: &str) -> RegistryResult<()> {
        let dir = self.key_dir(key);
        if !dir.is_dir() {
            return Err(RegistryError::KeyNotFound(key.to_string()));
        }
        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }

    async fn keys(&self) -> RegistryResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(decode_key(name)?);
                }
            }
        }
        Ok(keys)
    }
}

/// Percent-encode a key into a path-safe directory name.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                encoded.push(byte as char)
            }
            other => {
                let _ = write!(encoded, "%{:02x}", other);
            }
        }
    }
    encoded
}

/// Reverse of [`encode_key`].
fn decode_key(encoded: &str) -> RegistryResult<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut chars = encoded.bytes();
    while let Some(byte) = chars.next() {
        if byte == b'%' {
            let hi = chars.next();
            let lo = chars.next();
            let (Some(hi), Some(lo)) = (hi, lo) else {
                return Err(RegistryError::Corrupt(format!(
                    "truncated key encoding '{}'",
                    encoded
                )));
            };
            let hex = [hi, lo];
            let hex = std::str::from_utf8(&hex)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    RegistryError::Corrupt(format!("invalid key encoding '{}'", encoded))
                })?;
            bytes.push(hex);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes)
        .map_err(|_| RegistryError::Corrupt(format!("non-utf8 key encoding '{}'", encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_encoding_round_trip() {
        for key in ["worker:echoworker", "plain", "a/b:c d", "worker:v1.2-x_y"] {
            assert_eq!(decode_key(&encode_key(key)).unwrap(), key);
        }
    }

    #[tokio::test]
    async fn test_memory_store_versions() {
        let store = MemoryObjectStore::new();
        assert_eq!(store.put("k", b"one").await.unwrap(), 1);
        assert_eq!(store.put("k", b"two").await.unwrap(), 2);

        let (latest, version) = store.get("k").await.unwrap();
        assert_eq!(latest, b"two");
        assert_eq!(version, 2);
        assert_eq!(store.get_version("k", 1).await.unwrap(), b"one");
        assert_eq!(store.versions("k").await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_memory_store_missing_key() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(RegistryError::KeyNotFound(_))
        ));
        assert!(!store.contains("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();

        assert_eq!(store.put("worker:echo", b"v1").await.unwrap(), 1);
        assert_eq!(store.put("worker:echo", b"v2").await.unwrap(), 2);

        let (latest, version) = store.get("worker:echo").await.unwrap();
        assert_eq!(latest, b"v2");
        assert_eq!(version, 2);
        assert_eq!(store.get_version("worker:echo", 1).await.unwrap(), b"v1");

        assert_eq!(store.keys().await.unwrap(), vec!["worker:echo".to_string()]);
    }

    #[tokio::test]
    async fn test_fs_store_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();

        store.put("worker:echo", b"v1").await.unwrap();
        store.delete("worker:echo").await.unwrap();
        assert!(!store.contains("worker:echo").await.unwrap());
        assert!(store.delete("worker:echo").await.is_err());
    }

    #[tokio::test]
    async fn test_fs_store_missing_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();

        store.put("k", b"v1").await.unwrap();
        assert!(matches!(
            store.get_version("k", 9).await,
            Err(RegistryError::VersionNotFound { version: 9, .. })
        ));
    }
}
