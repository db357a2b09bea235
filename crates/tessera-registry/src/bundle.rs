//! Worker-type bundles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where to fetch a worker's supporting source tree from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFetchSpec {
    /// Git URL to clone.
    pub url: String,

    /// Branch to check out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Commit to check out (takes precedence over `branch`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    /// Subdirectory within the checkout to expose to the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory: Option<String>,
}

/// A stored recipe for instantiating a worker on a node.
///
/// `worker_type` is a stable factory identifier, not executable code; node
/// agents resolve it against their registered constructor table. Bundles
/// are immutable once saved under a name; re-saving creates a new version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerBundle {
    /// Fully-qualified factory identifier.
    pub worker_type: String,

    /// Constructor parameters handed to the factory.
    #[serde(default)]
    pub worker_params: Value,

    /// Optional source tree to materialise before construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_fetch_spec: Option<SourceFetchSpec>,
}

impl WorkerBundle {
    /// Creates a bundle without a source fetch spec.
    pub fn new(worker_type: impl Into<String>, worker_params: Value) -> Self {
        Self {
            worker_type: worker_type.into(),
            worker_params,
            source_fetch_spec: None,
        }
    }

    /// Attaches a source fetch spec.
    pub fn with_source(mut self, spec: SourceFetchSpec) -> Self {
        self.source_fetch_spec = Some(spec);
        self
    }
}
