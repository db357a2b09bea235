//! The node agent.

use crate::error::{NodeError, NodeResult};
use crate::factory::{FactoryContext, WorkerFactoryRegistry};
use crate::fetch::fetch_source;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use tessera_registry::WorkerTypeRegistry;
use tessera_worker::{serve_worker, WorkerRuntime, WorkerServer};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Per-host supervisor that launches and tracks worker processes.
pub struct NodeAgent {
    registry: WorkerTypeRegistry,
    factories: WorkerFactoryRegistry,
    scratch_dir: PathBuf,
    workers: Mutex<Vec<WorkerServer>>,
}

impl NodeAgent {
    /// Creates a node agent.
    ///
    /// `registry` reads bundles out of the store the cluster's
    /// registration credentials point at; `factories` is this process's
    /// constructor table; `scratch_dir` hosts source checkouts.
    pub fn new(
        registry: WorkerTypeRegistry,
        factories: WorkerFactoryRegistry,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            factories,
            scratch_dir: scratch_dir.into(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Number of workers currently tracked.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Launch a worker of `worker_type` and bind its surface to
    /// `worker_url`'s socket address.
    pub async fn launch_worker(&self, worker_type: &str, worker_url: &str) -> NodeResult<()> {
        let bundle = self.registry.load(worker_type).await?;

        let source_dir = match &bundle.source_fetch_spec {
            Some(spec) => Some(fetch_source(spec, &self.scratch_dir).await?),
            None => None,
        };

        let processor = self.factories.create(
            &bundle.worker_type,
            &FactoryContext {
                params: bundle.worker_params.clone(),
                source_dir,
            },
        )?;

        let addr = socket_addr_from_url(worker_url)?;
        let runtime = WorkerRuntime::new(processor);
        let server = serve_worker(runtime, addr).await?;

        info!(
            worker_type,
            worker_url,
            worker_id = server.runtime().worker_id(),
            "Launched worker"
        );
        self.workers.lock().await.push(server);
        Ok(())
    }

    /// Shut down every tracked worker (failures logged, not propagated),
    /// then forget them.
    pub async fn shutdown(&self) {
        let workers: Vec<WorkerServer> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            let worker_id = worker.runtime().worker_id().to_string();
            worker.shutdown().await;
            info!(worker_id = %worker_id, "Worker stopped");
        }
    }
}

impl Drop for NodeAgent {
    fn drop(&mut self) {
        if let Ok(workers) = self.workers.try_lock() {
            if !workers.is_empty() {
                warn!(count = workers.len(), "Node dropped with workers still running");
            }
        }
    }
}

/// Resolve `http://host:port` to a bindable socket address.
fn socket_addr_from_url(url: &str) -> NodeResult<SocketAddr> {
    let stripped = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let authority = stripped.split('/').next().unwrap_or(stripped);

    authority
        .to_socket_addrs()
        .map_err(|_| NodeError::InvalidWorkerUrl(url.to_string()))?
        .next()
        .ok_or_else(|| NodeError::InvalidWorkerUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tessera_registry::{MemoryObjectStore, WorkerBundle};
    use tessera_worker::{WorkerProcessor, WorkerResult};

    struct Echo;

    #[async_trait]
    impl WorkerProcessor for Echo {
        async fn process(&self, payload: Value) -> WorkerResult<Value> {
            Ok(json!({"echoed": payload["message"]}))
        }
    }

    fn factories() -> WorkerFactoryRegistry {
        let factories = WorkerFactoryRegistry::new();
        factories.register("workers.echo.EchoWorker", |_ctx| {
            Ok(Arc::new(Echo) as Arc<dyn WorkerProcessor>)
        });
        factories
    }

    async fn seeded_registry() -> WorkerTypeRegistry {
        let registry = WorkerTypeRegistry::new(Arc::new(MemoryObjectStore::new()));
        registry
            .save(
                "echoworker",
                &WorkerBundle::new("workers.echo.EchoWorker", json!({})),
            )
            .await
            .unwrap();
        registry
    }

    #[test]
    fn test_socket_addr_from_url() {
        assert_eq!(
            socket_addr_from_url("http://127.0.0.1:8004").unwrap(),
            "127.0.0.1:8004".parse::<SocketAddr>().unwrap()
        );
        assert!(socket_addr_from_url("http://127.0.0.1:8004/path").is_ok());
        assert!(socket_addr_from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_launch_and_shutdown_worker() {
        let scratch = tempfile::tempdir().unwrap();
        let node = NodeAgent::new(seeded_registry().await, factories(), scratch.path());

        node.launch_worker("echoworker", "http://127.0.0.1:0")
            .await
            .unwrap();
        assert_eq!(node.worker_count().await, 1);

        node.shutdown().await;
        assert_eq!(node.worker_count().await, 0);
    }

    #[tokio::test]
    async fn test_launch_unknown_bundle_errors() {
        let scratch = tempfile::tempdir().unwrap();
        let node = NodeAgent::new(seeded_registry().await, factories(), scratch.path());

        assert!(node
            .launch_worker("ghostworker", "http://127.0.0.1:0")
            .await
            .is_err());
        assert_eq!(node.worker_count().await, 0);
    }

    #[tokio::test]
    async fn test_launch_unknown_factory_errors() {
        let scratch = tempfile::tempdir().unwrap();
        let registry = seeded_registry().await;
        registry
            .save(
                "strange",
                &WorkerBundle::new("workers.unknown.Unknown", json!({})),
            )
            .await
            .unwrap();
        let node = NodeAgent::new(registry, factories(), scratch.path());

        assert!(matches!(
            node.launch_worker("strange", "http://127.0.0.1:0").await,
            Err(NodeError::UnknownWorkerType(_))
        ));
    }
}
