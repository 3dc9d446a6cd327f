//! Media error types and handling
//!
//! Errors raised by device enumeration, capture, gain control and recording. They convert
//! into [`CallError`] at the session boundary.

use telecall_core::{CallError, MediaAccessKind};
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// The platform refused to list devices
    #[error("Device enumeration failed: {reason}")]
    DeviceEnumerationFailed {
        /// Failure reason
        reason: String,
    },

    /// The user or policy denied access to a capture source
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// No device matches the request
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// The device is held by another capture
    #[error("Device busy: {device_id}")]
    DeviceBusy {
        /// Device identifier
        device_id: String,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The recorder failed to capture or encode a slice
    #[error("Recording failed: {reason}")]
    Recording {
        /// Failure reason
        reason: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::DeviceEnumerationFailed { .. } => true,
            MediaError::Recording { .. } => true,
            MediaError::InvalidState { .. } => true,
            MediaError::DeviceBusy { .. } => false,
            MediaError::PermissionDenied { .. } => false,
            MediaError::DeviceNotFound { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::DeviceEnumerationFailed { .. } => ErrorCategory::Device,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceBusy { .. } => ErrorCategory::Device,
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::Recording { .. } => ErrorCategory::Recording,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Camera/microphone/display availability
    Device,
    /// Permission prompts and policy
    Permission,
    /// Configuration and parameter errors
    Configuration,
    /// State management errors
    State,
    /// Recorder errors
    Recording,
}

impl From<MediaError> for CallError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::DeviceEnumerationFailed { reason } => CallError::DeviceEnumeration { reason },
            MediaError::PermissionDenied { operation } => CallError::MediaAccess {
                kind: MediaAccessKind::PermissionDenied,
                reason: operation,
            },
            MediaError::DeviceNotFound { device_id } => CallError::MediaAccess {
                kind: MediaAccessKind::DeviceNotFound,
                reason: device_id,
            },
            MediaError::DeviceBusy { device_id } => CallError::MediaAccess {
                kind: MediaAccessKind::DeviceBusy,
                reason: device_id,
            },
            MediaError::InvalidConfiguration { message } => {
                CallError::InvalidConfiguration { reason: message }
            }
            MediaError::InvalidState { expected, actual } => {
                CallError::InvalidState { expected, actual }
            }
            MediaError::Recording { reason } => CallError::Recording { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let busy = MediaError::DeviceBusy {
            device_id: "cam-1".to_string(),
        };
        assert_eq!(busy.category(), ErrorCategory::Device);
        assert!(!busy.is_recoverable());

        let recording = MediaError::Recording {
            reason: "encoder stalled".to_string(),
        };
        assert_eq!(recording.category(), ErrorCategory::Recording);
        assert!(recording.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = MediaError::DeviceNotFound {
            device_id: "cam-9".to_string(),
        };
        assert_eq!(error.to_string(), "Device not found: cam-9");
    }

    #[test]
    fn test_conversion_into_call_error() {
        let call: CallError = MediaError::PermissionDenied {
            operation: "camera".to_string(),
        }
        .into();

        match call {
            CallError::MediaAccess { kind, .. } => assert_eq!(kind, MediaAccessKind::PermissionDenied),
            _ => panic!("Expected MediaAccess error variant"),
        }

        let call: CallError = MediaError::DeviceEnumerationFailed {
            reason: "blocked".to_string(),
        }
        .into();
        assert_eq!(call.error_code(), "DEVICE_ENUMERATION_FAILED");
    }
}
