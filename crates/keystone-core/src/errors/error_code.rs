//! Stable error codes for every subsystem error.

pub const CONFIG_ERROR: &str = "KS-CONFIG";
pub const DATA_ERROR: &str = "KS-DATA";
pub const STORAGE_ERROR: &str = "KS-STORAGE";
pub const WORKER_ERROR: &str = "KS-WORKER";
pub const CANCELLED: &str = "KS-CANCELLED";

/// Maps an error to a stable, machine-readable code.
///
/// Codes are part of the public contract: reporting layers key off them,
/// so they must never change once released.
pub trait KeystoneErrorCode {
    /// The stable code for this error.
    fn error_code(&self) -> &'static str;
}
