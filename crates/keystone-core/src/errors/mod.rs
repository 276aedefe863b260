//! Error handling for Keystone.
//! One error enum per subsystem, `thiserror` only, zero `anyhow`.

pub mod config_error;
pub mod data_error;
pub mod error_code;
pub mod simulation_error;
pub mod storage_error;

pub use config_error::ConfigError;
pub use data_error::DataError;
pub use error_code::KeystoneErrorCode;
pub use simulation_error::SimulationError;
pub use storage_error::StorageError;
