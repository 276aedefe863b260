//! Keystone core — shared foundations for the resilience engine.
//!
//! Holds everything the engine and storage crates agree on: error enums,
//! configuration, the dense rank index, the CSR sparse-matrix kernel, the
//! graph-source boundary trait, cancellation, and tracing setup.

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod observability;
pub mod rank;
pub mod source;
pub mod sparse;

pub use cancellation::{Cancellable, CancellationToken};
pub use config::{EngineConfig, KeystoneConfig, PolicyConfig, RankerConfig};
pub use errors::{ConfigError, DataError, KeystoneErrorCode, SimulationError, StorageError};
pub use rank::RankIndex;
pub use source::{ContributionSnapshot, DependencySnapshot, GraphSource, MemoryGraphSource};
pub use sparse::CsrMatrix;
