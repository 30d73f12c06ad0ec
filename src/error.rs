//! Centralized error types for the client
//!
//! All client errors are represented by the `Error` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, Error>`.
//!
//! Decode-level failures (`CodecError`) are normally absorbed by the
//! connection manager and only logged; they appear here so that callers of
//! the pure codec functions can propagate them with `?`.

use crate::codec::CodecError;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of a firmware update at which a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStage {
    Check,
    Download,
    Transfer,
    Apply,
}

impl std::fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Check => "check",
            Self::Download => "download",
            Self::Transfer => "transfer",
            Self::Apply => "apply",
        };
        f.write_str(name)
    }
}

/// All client errors
#[derive(Debug, Error)]
pub enum Error {
    // === Connection ===
    /// The transport could not be opened (or was lost while connecting)
    #[error("Transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    /// The device did not answer the inventory query in time
    #[error("No inventory response from device within {timeout_ms} ms")]
    DeviceTimeout { timeout_ms: u64 },

    /// Target selection was abandoned by the caller
    #[error("Connection cancelled by user")]
    UserCancelled,

    /// Operator rejected the device during the identity check
    #[error("Device rejected during identity check")]
    IdentityRejected,

    /// Operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Operation is not valid in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    // === Protocol ===
    /// Inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    Frame(#[from] CodecError),

    // === Firmware update ===
    /// Manifest fetch or version comparison failed
    #[error("Update check failed: {reason}")]
    UpdateCheckFailed { reason: String },

    /// Download, transfer or apply failed
    #[error("Update failed during {stage}: {reason}")]
    UpdateTransferFailed { stage: UpdateStage, reason: String },

    /// Update was cancelled by the operator
    #[error("Update aborted")]
    UpdateAborted,

    // === Config ===
    /// Config file could not be read
    #[error("Cannot read config {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file content is invalid
    #[error("Invalid config {}: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    // === Runtime ===
    /// The client task has stopped and no longer accepts commands
    #[error("Client stopped")]
    ClientClosed,
}

impl Error {
    /// Shorthand for a transport failure with a formatted reason
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            reason: reason.into(),
        }
    }
}

/// Alias for Result with the crate error
pub type Result<T> = std::result::Result<T, Error>;
