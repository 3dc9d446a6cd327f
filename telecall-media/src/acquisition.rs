//! Local media acquisition
//!
//! Opens camera/microphone with the session's constraints, attaches an output gain
//! control to the microphone, and re-opens the camera on a different device without
//! ever holding two camera handles at once.

use crate::capture::{
    AudioConstraints, DisplayConstraints, MediaConstraints, MediaDevices, VideoConstraints,
};
use crate::error::{MediaError, MediaResult};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use telecall_core::{MediaStream, MediaTrack, TrackKind};
use tracing::{debug, info, warn};

/// Highest output volume
pub const MAX_VOLUME: u8 = 100;

/// What to capture when a call starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireConfig {
    /// Capture the camera
    pub video_enabled: bool,
    /// Capture the microphone
    pub audio_enabled: bool,
    /// Exact camera to open; `None` lets the platform choose
    pub camera_id: Option<String>,
    /// Initial output volume, 0-100
    pub output_volume: u8,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            video_enabled: true,
            audio_enabled: true,
            camera_id: None,
            output_volume: MAX_VOLUME,
        }
    }
}

impl AcquireConfig {
    fn constraints(&self) -> MediaConstraints {
        MediaConstraints {
            video: self.video_enabled.then(|| VideoConstraints {
                device_id: self.camera_id.clone(),
                ..VideoConstraints::default()
            }),
            audio: self.audio_enabled.then(AudioConstraints::default),
        }
    }
}

/// Gain stage fed by the local microphone
#[derive(Debug)]
pub struct GainControl {
    source_track: String,
    volume: AtomicU8,
    gain_bits: AtomicU32,
    closed: AtomicBool,
}

impl GainControl {
    fn new(source: &MediaTrack, volume: u8) -> Self {
        let control = Self {
            source_track: source.id().to_string(),
            volume: AtomicU8::new(0),
            gain_bits: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        };
        control.apply(volume);
        control
    }

    fn apply(&self, volume: u8) -> u8 {
        let volume = volume.min(MAX_VOLUME);
        let gain = f32::from(volume) / f32::from(MAX_VOLUME);
        self.volume.store(volume, Ordering::SeqCst);
        self.gain_bits.store(gain.to_bits(), Ordering::SeqCst);
        volume
    }

    /// Set output volume (clamped to 0-100); returns the applied value
    pub fn set_volume(&self, volume: u8) -> MediaResult<u8> {
        if self.is_closed() {
            return Err(MediaError::InvalidState {
                expected: "open audio graph".to_string(),
                actual: "closed".to_string(),
            });
        }
        let applied = self.apply(volume);
        debug!("🔊 Gain for {} set to {}", self.source_track, self.gain());
        Ok(applied)
    }

    /// Current volume, 0-100
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    /// Current linear gain, `volume / 100`
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::SeqCst))
    }

    /// Track feeding this gain stage
    pub fn source_track_id(&self) -> &str {
        &self.source_track
    }

    /// Tear down the audio graph. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Audio graph for {} closed", self.source_track);
        }
    }

    /// Whether the graph has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The capture-backed local stream and its audio graph
#[derive(Debug, Clone)]
pub struct LocalMedia {
    stream: MediaStream,
    gain: Option<Arc<GainControl>>,
}

impl LocalMedia {
    /// The local stream; clones observe in-place track swaps
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Output gain, present when audio was captured
    pub fn gain(&self) -> Option<&Arc<GainControl>> {
        self.gain.as_ref()
    }

    /// Stop every track and close the audio graph; returns how many tracks were live
    pub fn release(&self) -> usize {
        let stopped = self.stream.stop_all();
        if let Some(gain) = &self.gain {
            gain.close();
        }
        if stopped > 0 {
            info!("🛑 Released {} local track(s)", stopped);
        }
        stopped
    }
}

/// Opens local capture through the platform backend
#[derive(Clone)]
pub struct MediaAcquisition {
    devices: Arc<dyn MediaDevices>,
}

impl std::fmt::Debug for MediaAcquisition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAcquisition").finish_non_exhaustive()
    }
}

impl MediaAcquisition {
    /// Create an acquisition front for a backend
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self { devices }
    }

    /// Open the local stream. With audio, a gain control is attached at
    /// `config.output_volume`.
    pub async fn acquire(&self, config: &AcquireConfig) -> MediaResult<LocalMedia> {
        let constraints = config.constraints();
        if constraints.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "both audio and video are disabled".to_string(),
            });
        }

        info!(
            "🎥 Acquiring local media (video: {}, audio: {}, camera: {:?})",
            config.video_enabled, config.audio_enabled, config.camera_id
        );
        let stream = self.devices.get_user_media(&constraints).await.map_err(|e| {
            warn!("Local media acquisition failed: {}", e);
            e
        })?;

        let gain = stream
            .audio_track()
            .map(|track| Arc::new(GainControl::new(&track, config.output_volume)));

        Ok(LocalMedia { stream, gain })
    }

    /// Open `camera_id` as a replacement for `previous`. The previous track is stopped
    /// first so its device handle is released before the new one is opened.
    pub async fn reacquire_video(
        &self,
        previous: Option<&MediaTrack>,
        camera_id: &str,
    ) -> MediaResult<MediaTrack> {
        if let Some(previous) = previous {
            previous.stop();
        }

        let constraints = MediaConstraints {
            video: Some(VideoConstraints {
                device_id: Some(camera_id.to_string()),
                ..VideoConstraints::default()
            }),
            audio: None,
        };
        let stream = self.devices.get_user_media(&constraints).await?;
        let track = stream.video_track().ok_or_else(|| MediaError::DeviceNotFound {
            device_id: camera_id.to_string(),
        })?;
        for extra in stream.tracks().iter().filter(|t| !t.same_track(&track)) {
            extra.stop();
        }

        info!("📷 Re-acquired camera {}", camera_id);
        Ok(track)
    }

    /// Ask the user for a screen to share; returns its video track
    pub async fn acquire_display(&self) -> MediaResult<MediaTrack> {
        let stream = self
            .devices
            .get_display_media(&DisplayConstraints::default())
            .await?;
        let mut screen = None;
        for track in stream.tracks() {
            if track.kind() == TrackKind::Video && screen.is_none() {
                screen = Some(track);
            } else {
                track.stop();
            }
        }
        screen.ok_or_else(|| MediaError::InvalidState {
            expected: "a display video track".to_string(),
            actual: "display capture without video".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::SimulatedDevices;

    fn acquisition(devices: &SimulatedDevices) -> MediaAcquisition {
        MediaAcquisition::new(Arc::new(devices.clone()))
    }

    #[tokio::test]
    async fn test_acquire_attaches_gain() {
        let devices = SimulatedDevices::default();
        let local = acquisition(&devices)
            .acquire(&AcquireConfig {
                output_volume: 40,
                ..AcquireConfig::default()
            })
            .await
            .unwrap();

        assert!(local.stream().video_track().is_some());
        let gain = local.gain().unwrap();
        assert_eq!(gain.volume(), 40);
        assert!((gain.gain() - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_video_only_has_no_gain() {
        let devices = SimulatedDevices::default();
        let local = acquisition(&devices)
            .acquire(&AcquireConfig {
                audio_enabled: false,
                ..AcquireConfig::default()
            })
            .await
            .unwrap();
        assert!(local.gain().is_none());
        assert!(local.stream().audio_track().is_none());
    }

    #[tokio::test]
    async fn test_nothing_requested_is_rejected() {
        let devices = SimulatedDevices::default();
        let result = acquisition(&devices)
            .acquire(&AcquireConfig {
                video_enabled: false,
                audio_enabled: false,
                ..AcquireConfig::default()
            })
            .await;
        assert!(matches!(result, Err(MediaError::InvalidConfiguration { .. })));
        assert_eq!(devices.user_media_requests(), 0);
    }

    #[test]
    fn test_volume_is_clamped() {
        let track = MediaTrack::new(TrackKind::Audio, telecall_core::TrackSource::Microphone, "mic");
        let gain = GainControl::new(&track, 100);
        assert_eq!(gain.set_volume(250).unwrap(), 100);
        assert_eq!(gain.set_volume(0).unwrap(), 0);
        assert_eq!(gain.gain(), 0.0);

        gain.close();
        assert!(gain.set_volume(50).is_err());
    }

    #[tokio::test]
    async fn test_reacquire_releases_previous_handle_first() {
        let devices = SimulatedDevices::default();
        let acq = acquisition(&devices);
        let local = acq.acquire(&AcquireConfig::default()).await.unwrap();
        let front = local.stream().video_track().unwrap();

        let back = acq.reacquire_video(Some(&front), "camera-back").await.unwrap();
        assert!(!front.is_live());
        assert_eq!(back.device_id(), Some("camera-back"));
        assert_eq!(devices.peak_camera_handles(), 1);

        let again = acq.reacquire_video(Some(&back), "camera-back").await.unwrap();
        assert!(again.is_live());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let devices = SimulatedDevices::default();
        let local = acquisition(&devices)
            .acquire(&AcquireConfig::default())
            .await
            .unwrap();

        assert_eq!(local.release(), 2);
        assert_eq!(local.release(), 0);
        assert!(local.gain().unwrap().is_closed());
        assert_eq!(devices.open_camera_handles(), 0);
    }
}
