//! Component wiring for cluster and node processes.

use std::future::Future;
use std::sync::Arc;
use tessera_cluster::{cluster_router, ClusterManager, ClusterManagerConfig, ClusterStores};
use tessera_config::{AppConfig, StoreBackend};
use tessera_core::{TesseraError, TesseraResult};
use tessera_jobs::{AmqpClient, LocalClient, Orchestrator, QueueBackend, RedisClient};
use tessera_node::{serve_node, NodeAgent, WorkerFactoryRegistry};
use tessera_registry::{FsObjectStore, RegistryCredentials, WorkerTypeRegistry};
use tracing::info;

/// Build the queue backend selected by the configured URI.
pub async fn build_queue_backend(uri: &str, pool_size: usize) -> TesseraResult<Arc<dyn QueueBackend>> {
    if uri == "none" {
        info!("Using in-process queue backend");
        return Ok(Arc::new(LocalClient::new()));
    }
    if uri.starts_with("redis://") {
        info!("Using Redis queue backend");
        let client = RedisClient::connect(uri, pool_size)
            .await
            .map_err(TesseraError::from)?;
        return Ok(Arc::new(client));
    }
    if uri.starts_with("amqp://") {
        info!("Using AMQP queue backend");
        let client = AmqpClient::connect(uri).await.map_err(TesseraError::from)?;
        return Ok(Arc::new(client));
    }
    Err(TesseraError::Configuration(format!(
        "Unsupported queue backend URI: {}",
        uri
    )))
}

/// Build the status stores selected by the configuration.
pub async fn build_stores(config: &AppConfig) -> TesseraResult<ClusterStores> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory cluster stores");
            Ok(ClusterStores::memory())
        }
        StoreBackend::Redis => {
            info!("Using Redis cluster stores");
            let pool = tessera_jobs::redis::create_pool(
                &config.store.redis_url,
                config.store.pool_size,
            )
            .await
            .map_err(TesseraError::from)?;
            Ok(ClusterStores::redis(pool, config.store.key_prefix.clone()))
        }
    }
}

/// Assemble a cluster manager from the configuration.
pub async fn build_cluster_manager(config: &AppConfig) -> TesseraResult<Arc<ClusterManager>> {
    let backend = build_queue_backend(&config.queue.uri, config.store.pool_size).await?;
    let orchestrator = Arc::new(Orchestrator::new(backend));
    let stores = build_stores(config).await?;

    let store = FsObjectStore::open(&config.registry.dir)
        .await
        .map_err(TesseraError::from)?;
    let registry = WorkerTypeRegistry::new(Arc::new(store));

    let manager = Arc::new(
        ClusterManager::new(
            ClusterManagerConfig {
                base_url: config.server.base_url.clone(),
                registry_credentials: RegistryCredentials {
                    endpoint: config.registry.endpoint.clone(),
                    access_key: config.registry.access_key.clone(),
                    secret_key: config.registry.secret_key.clone(),
                    bucket: config.registry.bucket.clone(),
                },
            },
            orchestrator,
            stores,
            registry,
        )
        .map_err(TesseraError::from)?,
    );

    manager.restore_routing().await.map_err(TesseraError::from)?;
    Ok(manager)
}

/// Interval between worker liveness sweeps.
const RECONCILE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Serve the cluster manager until the shutdown future resolves.
pub async fn run_cluster_manager(
    config: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> TesseraResult<()> {
    let manager = build_cluster_manager(&config).await?;

    // Periodically mark workers that stopped answering heartbeats.
    let sweeper = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = manager.reconcile_workers().await {
                    tracing::warn!(error = %e, "Worker reconciliation sweep failed");
                }
            }
        })
    };

    let router = cluster_router(manager);

    let addr = config.server.bind_addr();
    info!("Starting cluster manager on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TesseraError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await;
    sweeper.abort();
    served.map_err(|e| TesseraError::Internal(format!("Server error: {}", e)))?;

    info!("Cluster manager shutdown complete");
    Ok(())
}

/// Serve a node agent until the shutdown future resolves.
///
/// The factory table starts empty; embedders register their constructors
/// through [`tessera_node::WorkerFactoryRegistry`] before launching
/// workers. Binaries built off this crate are expected to add their own.
pub async fn run_node(
    config: AppConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> TesseraResult<()> {
    let store = FsObjectStore::open(&config.registry.dir)
        .await
        .map_err(TesseraError::from)?;
    let registry = WorkerTypeRegistry::new(Arc::new(store));

    let scratch = std::path::Path::new(&config.registry.dir).join("scratch");
    let agent = Arc::new(NodeAgent::new(
        registry,
        WorkerFactoryRegistry::new(),
        scratch,
    ));

    let addr: std::net::SocketAddr = config
        .server
        .bind_addr()
        .parse()
        .map_err(|e| TesseraError::Configuration(format!("Invalid bind address: {}", e)))?;

    info!("Starting node agent on http://{}", addr);
    let server = serve_node(agent, addr)
        .await
        .map_err(|e| TesseraError::Internal(format!("Failed to bind node: {}", e)))?;

    shutdown.await;
    server.shutdown().await;
    info!("Node shutdown complete");
    Ok(())
}
