//! Configuration types for telecall

use serde::{Deserialize, Serialize};
use telecall_core::{CallError, CallResult, RtcConfiguration};
use telecall_media::{AcquireConfig, RecordingConfig, MAX_VOLUME};

/// Global configuration for telecall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Install the `tracing` subscriber on init
    pub debug_logging: bool,
    /// STUN/TURN servers used by every session unless overridden
    pub rtc: RtcConfiguration,
    /// Recorder settings used by every session unless overridden
    pub recording: RecordingConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            rtc: RtcConfiguration::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Defaults with logging turned on
    pub fn development() -> Self {
        Self {
            debug_logging: true,
            ..Self::default()
        }
    }

    /// Check the ICE server list and recorder settings
    pub fn validate(&self) -> CallResult<()> {
        self.rtc.validate()?;
        self.recording.validate()?;
        Ok(())
    }
}

/// Per-session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture the camera when the call starts
    pub video_enabled: bool,
    /// Capture the microphone when the call starts
    pub audio_enabled: bool,
    /// Output volume, 0-100
    pub initial_volume: u8,
    /// Camera to open first; `None` lets the platform choose
    pub camera_id: Option<String>,
    /// STUN/TURN servers
    pub rtc: RtcConfiguration,
    /// Recorder settings
    pub recording: RecordingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video_enabled: true,
            audio_enabled: true,
            initial_volume: MAX_VOLUME,
            camera_id: None,
            rtc: RtcConfiguration::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Session defaults inheriting the global ICE and recorder settings
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            rtc: global.rtc.clone(),
            recording: global.recording.clone(),
            ..Self::default()
        }
    }

    /// Microphone only
    pub fn audio_only() -> Self {
        Self {
            video_enabled: false,
            ..Self::default()
        }
    }

    /// Reject configurations that could never start a call
    pub fn validate(&self) -> CallResult<()> {
        if !self.video_enabled && !self.audio_enabled {
            return Err(CallError::InvalidConfiguration {
                reason: "enable video, audio or both".to_string(),
            });
        }
        if self.initial_volume > MAX_VOLUME {
            return Err(CallError::InvalidConfiguration {
                reason: format!(
                    "initial volume {} is above {}",
                    self.initial_volume, MAX_VOLUME
                ),
            });
        }
        self.rtc.validate()?;
        self.recording.validate()?;
        Ok(())
    }

    pub(crate) fn acquire_config(&self) -> AcquireConfig {
        AcquireConfig {
            video_enabled: self.video_enabled,
            audio_enabled: self.audio_enabled,
            camera_id: self.camera_id.clone(),
            output_volume: self.initial_volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecall_core::IceServer;

    #[test]
    fn test_session_defaults_capture_both() {
        let config = SessionConfig::default();
        assert!(config.video_enabled);
        assert!(config.audio_enabled);
        assert_eq!(config.initial_volume, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nothing_to_capture_is_rejected() {
        let config = SessionConfig {
            video_enabled: false,
            audio_enabled: false,
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CallError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_session_inherits_global_servers() {
        let global = GlobalConfig {
            rtc: RtcConfiguration::with_stun("stun:stun.example.org:3478"),
            ..GlobalConfig::default()
        };
        let session = SessionConfig::from_global(&global);
        assert_eq!(
            session.rtc.ice_servers,
            vec![IceServer::stun("stun:stun.example.org:3478")]
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"video_enabled": false, "initial_volume": 40}"#).unwrap();
        assert!(!config.video_enabled);
        assert!(config.audio_enabled);
        assert_eq!(config.initial_volume, 40);
        assert_eq!(config.acquire_config().output_volume, 40);
    }
}
