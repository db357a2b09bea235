//! # Tessera Core
//!
//! Core types, traits, and error definitions for the Tessera job cluster.
//! Everything here is shared by every other layer: the unified error enum,
//! result aliases, and telemetry initialization.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::*;
