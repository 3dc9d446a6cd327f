//! # telecall media
//!
//! Local media for a call: the camera inventory, camera/microphone acquisition with an
//! output gain stage, live track control (mute, camera switch, screen share) and session
//! recording. Platform access sits behind [`MediaDevices`] and [`RecorderBackend`]; the
//! crate ships simulated implementations of both.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod acquisition;
pub mod capture;
pub mod controller;
pub mod devices;
pub mod error;
pub mod recording;

// Re-export main types
pub use acquisition::{AcquireConfig, GainControl, LocalMedia, MediaAcquisition, MAX_VOLUME};
#[cfg(feature = "native-devices")]
pub use capture::native::NativeCameraDevices;
pub use capture::simulated::SimulatedDevices;
pub use capture::{
    AudioConstraints, DeviceInfo, DeviceKind, DisplayConstraints, MediaConstraints, MediaDevices,
    VideoConstraints,
};
pub use controller::TrackController;
pub use devices::{CameraDevice, DeviceInventory};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use recording::{
    RecordedChunk, Recorder, RecorderBackend, RecordingArtifact, RecordingConfig, RecordingEvent,
    SimulatedRecorder,
};
