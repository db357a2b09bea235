//! Worker constructor registry.
//!
//! Bundles carry a stable factory identifier rather than executable code;
//! each node process registers the constructors it can build at startup
//! and resolves identifiers against that table when launching.

use crate::error::{NodeError, NodeResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_worker::WorkerProcessor;
use tracing::info;

/// What a factory gets to work with.
#[derive(Debug, Clone)]
pub struct FactoryContext {
    /// Constructor parameters from the bundle.
    pub params: Value,

    /// Materialised source checkout, when the bundle carried a fetch spec.
    pub source_dir: Option<PathBuf>,
}

/// Builds a processor from a factory context.
pub type WorkerFactory =
    Arc<dyn Fn(&FactoryContext) -> NodeResult<Arc<dyn WorkerProcessor>> + Send + Sync>;

/// Table of worker constructors keyed by factory identifier.
#[derive(Default, Clone)]
pub struct WorkerFactoryRegistry {
    factories: Arc<RwLock<HashMap<String, WorkerFactory>>>,
}

impl WorkerFactoryRegistry {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `identifier`, replacing any prior one.
    pub fn register<F>(&self, identifier: &str, factory: F)
    where
        F: Fn(&FactoryContext) -> NodeResult<Arc<dyn WorkerProcessor>> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(identifier.to_string(), Arc::new(factory));
        info!(identifier, "Registered worker factory");
    }

    /// Builds a processor for `identifier`.
    pub fn create(
        &self,
        identifier: &str,
        context: &FactoryContext,
    ) -> NodeResult<Arc<dyn WorkerProcessor>> {
        let factory = self
            .factories
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| NodeError::UnknownWorkerType(identifier.to_string()))?;
        factory(context)
    }

    /// Registered identifiers.
    pub fn identifiers(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }
}
