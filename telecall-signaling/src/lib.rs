//! # telecall signaling
//!
//! Offer/answer/candidate messages exchanged between the two participants of a call and
//! the channel abstraction that carries them.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod protocol;

// Re-export main types
pub use channel::{LoopbackSignaling, SignalingChannel};
pub use error::{SignalingError, SignalingResult};
pub use protocol::{SignalingMessage, SignalingPayload};
