//! Signaling error types

use telecall_core::CallError;
use thiserror::Error;

/// Errors raised by signaling channels
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalingError {
    /// The channel was closed
    #[error("Signaling channel closed")]
    ChannelClosed,

    /// A message could not be delivered
    #[error("Send failed: {reason}")]
    SendFailed {
        /// Failure reason
        reason: String,
    },

    /// A message could not be encoded or decoded
    #[error("Invalid message: {reason}")]
    InvalidMessage {
        /// Failure reason
        reason: String,
    },
}

/// Result type alias for signaling operations
pub type SignalingResult<T> = Result<T, SignalingError>;

impl From<serde_json::Error> for SignalingError {
    fn from(err: serde_json::Error) -> Self {
        SignalingError::InvalidMessage {
            reason: err.to_string(),
        }
    }
}

impl From<SignalingError> for CallError {
    fn from(err: SignalingError) -> Self {
        CallError::Signaling {
            reason: err.to_string(),
        }
    }
}
