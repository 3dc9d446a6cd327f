//! # telecall - Two-party telemedicine call sessions
//!
//! telecall manages the real-time media side of a doctor/patient video visit: it
//! acquires camera and microphone, negotiates a peer connection over an external
//! signaling channel, controls live tracks (mute, camera switch, screen share),
//! records the local stream and tracks the connection lifecycle.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use telecall::{LoopbackSignaling, Role, TeleCall};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), telecall::CallError> {
//!     let telecall = TeleCall::init()?;
//!     let (doctor_channel, _patient_channel) = LoopbackSignaling::pair();
//!
//!     let session = telecall
//!         .session("visit-42")
//!         .role(Role::Initiator)
//!         .enable_video()
//!         .enable_audio()
//!         .signaling(doctor_channel)
//!         .build()?;
//!
//!     let mut events = session.events();
//!     session.start_call().await?;
//!     while let Some(event) = events.next().await {
//!         println!("Session event: {}", event.event_type());
//!     }
//!     session.end_call();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

// Re-export core types for easy access
pub use telecall_core::{
    CallError, CallResult, ConnectionState, EndReason, IceCandidate, IceServer,
    MediaAccessKind, MediaStream, MediaTrack, PeerConnectionFactory, RtcConfiguration,
    SessionDescription, SimulatedPeerConfig, SimulatedPeerConnection, SimulatedPeerFactory,
    TrackKind, TrackSource, TransportState,
};
pub use telecall_diagnostics::{CallReport, CallTimeline, DebugLogger, TimelineEvent};
pub use telecall_media::{
    CameraDevice, MediaDevices, RecorderBackend, RecordingArtifact, RecordingConfig,
    SimulatedDevices, SimulatedRecorder,
};
pub use telecall_signaling::{
    LoopbackSignaling, SignalingChannel, SignalingMessage, SignalingPayload,
};

// Public API modules
pub mod config;
pub mod event;
pub mod participant;
pub mod session;

// Re-export main API types
pub use config::{GlobalConfig, SessionConfig};
pub use event::{EventFilter, EventStream, FilteredEventStream, SessionEvent};
pub use participant::Role;
pub use session::{Session, SessionBuilder, SessionSnapshot};

/// Platform services a session runs on: capture devices, peer connections and the
/// recording encoder
#[derive(Clone)]
pub struct Platform {
    /// Camera, microphone and display capture
    pub devices: Arc<dyn MediaDevices>,
    /// Peer connection factory
    pub peers: Arc<dyn PeerConnectionFactory>,
    /// Recording encoder
    pub recorder: Arc<dyn RecorderBackend>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

impl Platform {
    /// In-process devices, connections and encoder. Two cameras and a microphone;
    /// connections report `Connected` two seconds after negotiation completes.
    pub fn simulated() -> Self {
        Self {
            devices: Arc::new(SimulatedDevices::default()),
            peers: Arc::new(SimulatedPeerFactory::new(SimulatedPeerConfig::auto_connect(
                std::time::Duration::from_secs(2),
            ))),
            recorder: Arc::new(SimulatedRecorder::new()),
        }
    }

    /// Enumerate real cameras through the host capture API; `capture` still opens the
    /// streams and lists the other devices
    #[cfg(feature = "native-devices")]
    pub fn with_native_cameras<D: MediaDevices + 'static>(self, capture: D) -> Self {
        Self {
            devices: Arc::new(telecall_media::NativeCameraDevices::new(capture)),
            ..self
        }
    }
}

/// Main entry point for telecall
#[derive(Debug, Clone)]
pub struct TeleCall {
    inner: Arc<TeleCallInner>,
}

#[derive(Debug)]
struct TeleCallInner {
    config: GlobalConfig,
    platform: Platform,
}

impl TeleCall {
    /// Initialize with default settings on the simulated platform
    ///
    /// # Example
    /// ```rust,no_run
    /// use telecall::TeleCall;
    ///
    /// let telecall = TeleCall::init()?;
    /// # Ok::<(), telecall::CallError>(())
    /// ```
    pub fn init() -> CallResult<Self> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration on the simulated platform
    pub fn init_with(config: GlobalConfig) -> CallResult<Self> {
        Self::with_platform(config, Platform::simulated())
    }

    /// Initialize on a specific platform
    pub fn with_platform(config: GlobalConfig, platform: Platform) -> CallResult<Self> {
        if config.debug_logging {
            DebugLogger::init_logging();
        }
        config.validate()?;
        tracing::info!(
            "🚀 telecall initialized ({} ICE server(s))",
            config.rtc.ice_servers.len()
        );

        Ok(Self {
            inner: Arc::new(TeleCallInner { config, platform }),
        })
    }

    /// Global configuration
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Platform services
    pub fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    /// Create a session builder for the given session ID
    ///
    /// # Example
    /// ```rust,no_run
    /// use telecall::{LoopbackSignaling, TeleCall};
    ///
    /// # fn example() -> Result<(), telecall::CallError> {
    /// let telecall = TeleCall::init()?;
    /// let session = telecall
    ///     .session("visit-42")
    ///     .as_doctor(false)
    ///     .enable_audio()
    ///     .signaling(LoopbackSignaling::unconnected())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn session(&self, id: &str) -> SessionBuilder {
        SessionBuilder::new(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_rejects_configuration_without_stun() {
        let config = GlobalConfig {
            rtc: RtcConfiguration {
                ice_servers: vec![IceServer::turn("turn:relay.example.org:3478", "u", "p")],
            },
            ..GlobalConfig::default()
        };
        assert!(matches!(
            TeleCall::init_with(config),
            Err(CallError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_builder_requires_signaling() {
        let telecall = TeleCall::init().unwrap();
        let result = telecall.session("visit-1").enable_video().build();
        assert!(matches!(
            result,
            Err(CallError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_builder_requires_some_media() {
        let telecall = TeleCall::init().unwrap();
        let result = telecall
            .session("visit-1")
            .signaling(LoopbackSignaling::unconnected())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_built_session_starts_idle() {
        let telecall = TeleCall::init().unwrap();
        let session = telecall
            .session("visit-1")
            .as_doctor(true)
            .enable_video()
            .enable_audio()
            .volume(150)
            .signaling(LoopbackSignaling::unconnected())
            .build()
            .unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Idle);
        assert_eq!(snapshot.role, Role::Initiator);
        assert_eq!(snapshot.output_volume, 100);
        assert!(snapshot.is_video_enabled);
        assert!(!snapshot.has_local_stream);
        assert!(snapshot.error.is_none());
    }
}
