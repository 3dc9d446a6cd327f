//! # telecall core
//!
//! Shared building blocks of the telecall media session stack: the error taxonomy,
//! live media tracks and streams, session descriptions and ICE configuration, and the
//! peer connection manager that owns the platform connection for one call.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod media;
pub mod negotiation;
pub mod peer;
pub mod simulated;

// Re-export main types
pub use error::{CallError, CallResult, MediaAccessKind};
pub use media::{EndReason, MediaStream, MediaTrack, TrackKind, TrackSource};
pub use negotiation::{IceCandidate, IceServer, RtcConfiguration, SdpKind, SessionDescription};
pub use peer::{
    ConnectionState, PeerConnectionBackend, PeerConnectionFactory, PeerConnectionManager,
    PeerEvent, SenderId, TransportEvent, TransportState,
};
pub use simulated::{SimulatedPeerConfig, SimulatedPeerConnection, SimulatedPeerFactory};
