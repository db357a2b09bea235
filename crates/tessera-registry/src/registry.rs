//! Worker-type registry over an object store.

use crate::bundle::WorkerBundle;
use crate::error::RegistryResult;
use crate::store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Key prefix for worker bundles.
const WORKER_PREFIX: &str = "worker:";

/// Credentials a node needs to read bundles out of the backing store.
///
/// Returned by the cluster's `register_node` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    /// Store endpoint.
    pub endpoint: String,
    /// Access key.
    pub access_key: String,
    /// Secret key.
    pub secret_key: String,
    /// Bucket holding the bundles.
    pub bucket: String,
}

/// Content-addressed store of worker-type bundles.
///
/// Bundles live under `worker:<name>`. Saving under an existing name
/// creates a new version; readers always see the latest consistent one.
#[derive(Clone)]
pub struct WorkerTypeRegistry {
    store: Arc<dyn ObjectStore>,
}

impl WorkerTypeRegistry {
    /// Creates a registry over the given store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{}{}", WORKER_PREFIX, name)
    }

    /// Saves a bundle under `worker:<name>`, returning the stored version.
    pub async fn save(&self, name: &str, bundle: &WorkerBundle) -> RegistryResult<u64> {
        let body = serde_json::to_vec(bundle)?;
        let version = self.store.put(&Self::key(name), &body).await?;
        info!(worker_type = name, version, "Saved worker bundle");
        Ok(version)
    }

    /// Loads the latest bundle saved under `worker:<name>`.
    pub async fn load(&self, name: &str) -> RegistryResult<WorkerBundle> {
        let (body, _version) = self.store.get(&Self::key(name)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Returns true if a bundle exists under `worker:<name>`.
    pub async fn contains(&self, name: &str) -> RegistryResult<bool> {
        self.store.contains(&Self::key(name)).await
    }

    /// Lists registered worker-type names.
    pub async fn names(&self) -> RegistryResult<Vec<String>> {
        let keys = self.store.keys().await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(WORKER_PREFIX).map(str::to_string))
            .collect())
    }

    /// Removes every version of `worker:<name>`.
    pub async fn delete(&self, name: &str) -> RegistryResult<()> {
        self.store.delete(&Self::key(name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use serde_json::json;

    fn registry() -> WorkerTypeRegistry {
        WorkerTypeRegistry::new(Arc::new(MemoryObjectStore::new()))
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let registry = registry();
        let bundle = WorkerBundle::new("workers.echo.EchoWorker", json!({"delay": 2}));

        let version = registry.save("echoworker", &bundle).await.unwrap();
        assert_eq!(version, 1);

        let loaded = registry.load("echoworker").await.unwrap();
        assert_eq!(loaded, bundle);
        assert!(registry.contains("echoworker").await.unwrap());
    }

    #[tokio::test]
    async fn test_resave_creates_new_version() {
        let registry = registry();
        let first = WorkerBundle::new("workers.echo.EchoWorker", json!({"delay": 1}));
        let second = WorkerBundle::new("workers.echo.EchoWorker", json!({"delay": 9}));

        assert_eq!(registry.save("echoworker", &first).await.unwrap(), 1);
        assert_eq!(registry.save("echoworker", &second).await.unwrap(), 2);

        // Latest wins for readers.
        let loaded = registry.load("echoworker").await.unwrap();
        assert_eq!(loaded.worker_params["delay"], 9);
    }

    #[tokio::test]
    async fn test_names_strip_prefix() {
        let registry = registry();
        registry
            .save("echoworker", &WorkerBundle::new("a", json!({})))
            .await
            .unwrap();
        registry
            .save("resizer", &WorkerBundle::new("b", json!({})))
            .await
            .unwrap();

        let mut names = registry.names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["echoworker", "resizer"]);
    }

    #[tokio::test]
    async fn test_missing_bundle() {
        let registry = registry();
        assert!(!registry.contains("ghost").await.unwrap());
        assert!(registry.load("ghost").await.is_err());
    }
}
