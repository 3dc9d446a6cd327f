//! Platform media access
//!
//! [`MediaDevices`] is the seam to the platform's capture stack: device enumeration,
//! camera/microphone capture and display capture. Tracks handed out by a backend are
//! live until stopped; stopping a track releases its device.

#[cfg(feature = "native-devices")]
pub mod native;
pub mod simulated;

use crate::error::MediaResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use telecall_core::MediaStream;

/// Kind of media device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Camera
    VideoInput,
    /// Microphone
    AudioInput,
    /// Speaker/headset
    AudioOutput,
}

/// One enumerated device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable platform identifier
    pub device_id: String,
    /// Human readable name; may be empty before permission is granted
    pub label: String,
    /// Device kind
    pub kind: DeviceKind,
}

impl DeviceInfo {
    /// Create a camera entry
    pub fn camera(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    /// Create a microphone entry
    pub fn microphone(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::AudioInput,
        }
    }
}

/// Camera request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    /// Exact device to open; `None` lets the platform choose
    pub device_id: Option<String>,
    /// Preferred width
    pub ideal_width: u32,
    /// Preferred height
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// Microphone request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    /// Remove far-end echo
    pub echo_cancellation: bool,
    /// Suppress background noise
    pub noise_suppression: bool,
    /// Normalize input level
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Camera/microphone capture request; `None` means "do not capture this kind"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Video request
    pub video: Option<VideoConstraints>,
    /// Audio request
    pub audio: Option<AudioConstraints>,
}

impl MediaConstraints {
    /// Whether nothing is requested
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// Display capture request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayConstraints {
    /// Capture system/tab audio alongside the screen
    pub audio: bool,
}

/// Platform capture stack
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// List every media device in platform order
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceInfo>>;

    /// Open camera and/or microphone
    async fn get_user_media(&self, constraints: &MediaConstraints) -> MediaResult<MediaStream>;

    /// Ask the user to pick a screen or window to share
    async fn get_display_media(&self, constraints: &DisplayConstraints)
        -> MediaResult<MediaStream>;
}
