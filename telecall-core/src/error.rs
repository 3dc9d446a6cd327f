//! Error types for telecall

use thiserror::Error;

/// Why the platform refused access to a capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MediaAccessKind {
    /// The user (or policy) denied the permission prompt
    PermissionDenied,
    /// No device matches the requested constraints
    DeviceNotFound,
    /// The device is already held by another capture
    DeviceBusy,
}

impl std::fmt::Display for MediaAccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaAccessKind::PermissionDenied => write!(f, "permission denied"),
            MediaAccessKind::DeviceNotFound => write!(f, "device not found"),
            MediaAccessKind::DeviceBusy => write!(f, "device busy"),
        }
    }
}

/// Main error type for call session operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// The platform refused to list media devices
    #[error("Device enumeration failed: {reason}")]
    DeviceEnumeration {
        /// Reason reported by the platform
        reason: String,
    },

    /// Camera, microphone or display capture could not be opened
    #[error("Media access failed ({kind}): {reason}")]
    MediaAccess {
        /// Failure classification
        kind: MediaAccessKind,
        /// Reason reported by the platform
        reason: String,
    },

    /// Offer/answer or candidate exchange failed
    #[error("Negotiation failed: {reason}")]
    Negotiation {
        /// Reason for the failure
        reason: String,
    },

    /// The transport failed or dropped after negotiation
    #[error("Connection lost: {reason}")]
    Connection {
        /// Reason for the failure
        reason: String,
    },

    /// Recording could not be started or captured
    #[error("Recording failed: {reason}")]
    Recording {
        /// Reason for the failure
        reason: String,
    },

    /// The signaling channel rejected or lost a message
    #[error("Signaling error: {reason}")]
    Signaling {
        /// Reason for the failure
        reason: String,
    },

    /// Configuration is missing a required value or is malformed
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Operation is not valid in the current state
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The session ended while the operation was in flight
    #[error("Operation cancelled: {operation}")]
    Cancelled {
        /// Operation that was abandoned
        operation: String,
    },
}

/// Result alias used across the workspace
pub type CallResult<T> = Result<T, CallError>;

impl CallError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CallError::DeviceEnumeration { .. } => "DEVICE_ENUMERATION_FAILED",
            CallError::MediaAccess { .. } => "MEDIA_ACCESS_FAILED",
            CallError::Negotiation { .. } => "NEGOTIATION_FAILED",
            CallError::Connection { .. } => "CONNECTION_LOST",
            CallError::Recording { .. } => "RECORDING_FAILED",
            CallError::Signaling { .. } => "SIGNALING_ERROR",
            CallError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            CallError::InvalidState { .. } => "INVALID_STATE",
            CallError::Cancelled { .. } => "CANCELLED",
        }
    }

    /// Whether the session can continue in place after this error.
    ///
    /// Anything that leaves the peer connection usable is recoverable; failures that
    /// close it need a full `end_call` / `start_call` cycle.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CallError::Recording { .. } => true,
            CallError::DeviceEnumeration { .. } => true,
            CallError::InvalidState { .. } => true,
            CallError::Cancelled { .. } => true,
            CallError::MediaAccess { .. } => false,
            CallError::Negotiation { .. } => false,
            CallError::Connection { .. } => false,
            CallError::Signaling { .. } => false,
            CallError::InvalidConfiguration { .. } => false,
        }
    }

    /// Shorthand for a permission-denied media access error
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        CallError::MediaAccess {
            kind: MediaAccessKind::PermissionDenied,
            reason: reason.into(),
        }
    }

    /// Shorthand for a negotiation error
    pub fn negotiation(reason: impl Into<String>) -> Self {
        CallError::Negotiation {
            reason: reason.into(),
        }
    }

    /// Shorthand for a cancelled operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        CallError::Cancelled {
            operation: operation.into(),
        }
    }
}
