//! # Tessera Registry
//!
//! Versioned, byte-addressable content store plus the worker-type bundle
//! registry layered on top of it. The cluster manager writes worker
//! bundles here; node agents read them back with credentials handed out at
//! node registration.

pub mod bundle;
pub mod error;
pub mod registry;
pub mod store;

pub use bundle::{SourceFetchSpec, WorkerBundle};
pub use error::{RegistryError, RegistryResult};
pub use registry::{RegistryCredentials, WorkerTypeRegistry};
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore};
