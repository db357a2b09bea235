//! # Tessera Node
//!
//! Per-host supervisor. A node agent loads worker bundles out of the
//! worker-type registry, resolves their factory identifiers against the
//! constructor table registered at process start, optionally materialises
//! a source checkout, and serves each launched worker on its own socket
//! until shutdown.

pub mod error;
pub mod factory;
pub mod fetch;
pub mod http;
pub mod node;

pub use error::{NodeError, NodeResult};
pub use factory::{FactoryContext, WorkerFactory, WorkerFactoryRegistry};
pub use http::{node_router, serve_node, NodeServer};
pub use node::NodeAgent;
