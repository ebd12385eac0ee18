//! # Error Types
//!
//! Custom error types for Relay Pilot using `thiserror`.

use thiserror::Error;

use crate::controller::actions::ActionKey;

/// Main error type for Relay Pilot
#[derive(Debug, Error)]
pub enum RelayPilotError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested input device is not visible
    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    /// Action key does not name a catalog entry
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Axis configuration rejected
    #[error("Invalid axis configuration: {0}")]
    InvalidAxisConfig(String),

    /// Axis-only operation on an action that is not bound to an axis
    #[error("Action {0} is not mapped to an axis")]
    NotAxisMapped(ActionKey),

    /// Persisted mapping table has the wrong shape
    #[error("Malformed mappings for device {device}: {reason}")]
    MalformedMappings { device: String, reason: String },

    /// Relay transport errors
    #[error("Relay error: {0}")]
    Relay(String),
}

/// Result type alias for Relay Pilot
pub type Result<T> = std::result::Result<T, RelayPilotError>;
