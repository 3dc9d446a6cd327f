//! Live track control: mute, camera switch and screen-share substitution
//!
//! Every change swaps tracks in place inside the local stream and on the peer sender, so
//! the peer connection is never renegotiated and a recorder attached to the stream keeps
//! running across switches.

use crate::acquisition::MediaAcquisition;
use crate::devices::{CameraDevice, DeviceInventory};
use parking_lot::Mutex;
use telecall_core::{
    CallError, CallResult, MediaStream, MediaTrack, PeerConnectionManager, TrackKind, TrackSource,
};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct ScreenShare {
    screen: MediaTrack,
    /// Camera track taken out of the stream while sharing; kept live for the restore
    parked_camera: Option<MediaTrack>,
}

#[derive(Debug)]
struct ControllerState {
    selected_camera: Option<String>,
    sharing: Option<ScreenShare>,
    released: bool,
}

impl ControllerState {
    fn camera_track(&self, stream: &MediaStream) -> Option<MediaTrack> {
        match &self.sharing {
            Some(share) => share.parked_camera.clone(),
            None => stream
                .tracks_of(TrackKind::Video)
                .into_iter()
                .find(|t| t.source() == TrackSource::Camera),
        }
    }
}

/// Controls the tracks of one local stream
#[derive(Debug)]
pub struct TrackController {
    stream: MediaStream,
    state: Mutex<ControllerState>,
}

impl TrackController {
    /// Take control of a freshly acquired local stream
    pub fn new(stream: MediaStream) -> Self {
        let selected_camera = stream
            .video_track()
            .and_then(|t| t.device_id().map(str::to_string));
        Self {
            stream,
            state: Mutex::new(ControllerState {
                selected_camera,
                sharing: None,
                released: false,
            }),
        }
    }

    /// The controlled stream
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Camera currently in use (parked or sent)
    pub fn selected_camera(&self) -> Option<String> {
        self.state.lock().selected_camera.clone()
    }

    /// Whether the screen replaces the camera
    pub fn is_screen_sharing(&self) -> bool {
        self.state.lock().sharing.is_some()
    }

    /// Screen track being shared
    pub fn screen_track(&self) -> Option<MediaTrack> {
        self.state
            .lock()
            .sharing
            .as_ref()
            .map(|share| share.screen.clone())
    }

    /// Camera track, whether sent or parked behind a screen share
    pub fn camera_track(&self) -> Option<MediaTrack> {
        self.state.lock().camera_track(&self.stream)
    }

    /// Whether the video track being sent (camera or screen) is enabled; false without
    /// video
    pub fn is_video_enabled(&self) -> bool {
        self.stream
            .video_track()
            .map(|t| t.is_enabled())
            .unwrap_or(false)
    }

    /// Whether the microphone is enabled; false without a microphone
    pub fn is_audio_enabled(&self) -> bool {
        self.stream
            .audio_track()
            .map(|t| t.is_enabled())
            .unwrap_or(false)
    }

    /// Flip the enabled flag of the video track being sent, the screen while sharing.
    /// A parked camera follows the same flag. Returns the new flag, or `None` without
    /// video.
    pub fn toggle_video(&self) -> Option<bool> {
        let state = self.state.lock();
        let track = self.stream.video_track()?;
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        if let Some(camera) = state.sharing.as_ref().and_then(|s| s.parked_camera.as_ref()) {
            camera.set_enabled(enabled);
        }
        info!("📹 Video {}", if enabled { "enabled" } else { "disabled" });
        Some(enabled)
    }

    /// Flip the microphone's enabled flag; returns the new flag, or `None` without a
    /// microphone.
    pub fn toggle_audio(&self) -> Option<bool> {
        let track = self.stream.audio_track()?;
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        info!("🎤 Audio {}", if enabled { "enabled" } else { "disabled" });
        Some(enabled)
    }

    /// Move to the next camera in the inventory.
    ///
    /// Returns `Ok(None)` when there is nothing to switch between. On failure to open
    /// the next camera the previous one is re-opened and the error is returned.
    pub async fn switch_camera(
        &self,
        inventory: &DeviceInventory,
        acquisition: &MediaAcquisition,
        peer: &PeerConnectionManager,
    ) -> CallResult<Option<CameraDevice>> {
        if !inventory.can_switch() {
            debug!("Camera switch unavailable: fewer than two cameras");
            return Ok(None);
        }

        let (current, previous_id) = {
            let state = self.state.lock();
            self.ensure_active(&state, "switch_camera")?;
            let Some(current) = state.camera_track(&self.stream) else {
                debug!("Camera switch unavailable: no camera track");
                return Ok(None);
            };
            let previous_id = current
                .device_id()
                .map(str::to_string)
                .or_else(|| state.selected_camera.clone());
            (current, previous_id)
        };

        let Some(next) = inventory.next_camera_after(previous_id.as_deref()) else {
            return Ok(None);
        };
        if previous_id.as_deref() == Some(next.device_id.as_str()) {
            return Ok(None);
        }

        let enabled = current.is_enabled();
        info!("🔄 Switching camera to {} ({})", next.label, next.device_id);

        let err = match acquisition.reacquire_video(Some(&current), &next.device_id).await {
            Ok(track) => {
                track.set_enabled(enabled);
                match self.install_camera(track, &next.device_id, peer).await {
                    Ok(()) => return Ok(Some(next)),
                    Err(err @ CallError::Cancelled { .. }) => return Err(err),
                    Err(err) => {
                        warn!("Peer refused camera {}: {}", next.device_id, err);
                        err
                    }
                }
            }
            Err(err) => {
                warn!("Could not open camera {}: {}", next.device_id, err);
                err.into()
            }
        };

        if let Some(previous_id) = previous_id {
            self.fall_back_to(&previous_id, enabled, acquisition, peer)
                .await;
        }
        Err(err)
    }

    /// Re-open the camera that was in use before a failed switch
    async fn fall_back_to(
        &self,
        device_id: &str,
        enabled: bool,
        acquisition: &MediaAcquisition,
        peer: &PeerConnectionManager,
    ) {
        let track = match acquisition.reacquire_video(None, device_id).await {
            Ok(track) => track,
            Err(e) => {
                warn!("Fallback to camera {} failed: {}", device_id, e);
                return;
            }
        };
        track.set_enabled(enabled);
        match self.install_camera(track, device_id, peer).await {
            Ok(()) => info!("Fell back to camera {}", device_id),
            Err(e) => warn!("Fallback to camera {} failed: {}", device_id, e),
        }
    }

    /// Put a freshly opened camera in place. The peer sender is switched first; the
    /// local stream only changes once the peer accepted the track, and a refused track
    /// is stopped.
    async fn install_camera(
        &self,
        track: MediaTrack,
        device_id: &str,
        peer: &PeerConnectionManager,
    ) -> CallResult<()> {
        {
            let mut state = self.state.lock();
            if state.released {
                track.stop();
                return Err(CallError::cancelled("switch_camera"));
            }
            if let Some(share) = state.sharing.as_mut() {
                debug!("Screen share active; camera {} parked for restore", device_id);
                share.parked_camera = Some(track);
                state.selected_camera = Some(device_id.to_string());
                return Ok(());
            }
        }

        if let Err(err) = peer.replace_outgoing_track(track.clone()).await {
            track.stop();
            return Err(err);
        }

        let mut state = self.state.lock();
        if state.released {
            track.stop();
            return Err(CallError::cancelled("switch_camera"));
        }
        state.selected_camera = Some(device_id.to_string());
        self.stream.replace_track(track);
        Ok(())
    }

    /// Send `screen` instead of the camera. The camera is parked, still live.
    ///
    /// If the peer refuses the new track the screen track is stopped, the camera keeps
    /// flowing and the error is returned. Sharing needs a video sender: in an audio-only
    /// call it fails with `InvalidState`, since adding a sender would mean renegotiating.
    pub async fn start_screen_share(
        &self,
        screen: MediaTrack,
        peer: &PeerConnectionManager,
    ) -> CallResult<()> {
        {
            let state = self.state.lock();
            if let Err(e) = self.ensure_active(&state, "start_screen_share") {
                screen.stop();
                return Err(e);
            }
            if state.sharing.is_some() {
                screen.stop();
                return Err(CallError::InvalidState {
                    expected: "not screen sharing".to_string(),
                    actual: "screen sharing".to_string(),
                });
            }
        }

        if peer.outgoing_track(TrackKind::Video).is_none() {
            screen.stop();
            return Err(CallError::InvalidState {
                expected: "a call sending video".to_string(),
                actual: "audio-only call".to_string(),
            });
        }

        if let Err(err) = peer.replace_outgoing_track(screen.clone()).await {
            warn!("Screen track rejected, keeping camera: {}", err);
            screen.stop();
            return Err(err);
        }

        let mut state = self.state.lock();
        if state.released {
            screen.stop();
            return Err(CallError::cancelled("start_screen_share"));
        }
        let parked_camera = self.stream.replace_track(screen.clone());
        info!("🖥️ Screen sharing started ({})", screen.label());
        state.sharing = Some(ScreenShare {
            screen,
            parked_camera,
        });
        Ok(())
    }

    /// Restore the parked camera. Returns false when not sharing.
    pub async fn stop_screen_share(&self, peer: &PeerConnectionManager) -> CallResult<bool> {
        let share = {
            let mut state = self.state.lock();
            let Some(share) = state.sharing.take() else {
                return Ok(false);
            };
            match &share.parked_camera {
                Some(camera) => {
                    self.stream.replace_track(camera.clone());
                }
                None => {
                    self.stream.remove_track(share.screen.id());
                }
            }
            share
        };

        let restored = match share.parked_camera {
            Some(camera) => peer.replace_outgoing_track(camera).await,
            None => Ok(()),
        };
        share.screen.stop();
        info!("🖥️ Screen sharing stopped");
        restored.map(|_| true)
    }

    /// Stop the screen and parked camera tracks; later operations are cancelled
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.released = true;
        if let Some(share) = state.sharing.take() {
            share.screen.stop();
            if let Some(camera) = share.parked_camera {
                camera.stop();
            }
        }
        self.stream.stop_all();
    }

    fn ensure_active(&self, state: &ControllerState, operation: &str) -> CallResult<()> {
        if state.released {
            Err(CallError::cancelled(operation))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> MediaStream {
        MediaStream::new(vec![
            MediaTrack::with_device(TrackKind::Video, TrackSource::Camera, "Front", "camera-1"),
            MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, "Mic"),
        ])
    }

    #[test]
    fn test_toggle_parity() {
        let controller = TrackController::new(stream());
        let mut last = None;
        for _ in 0..5 {
            last = controller.toggle_video();
        }
        assert_eq!(last, Some(false));
        assert_eq!(controller.stream().tracks().len(), 2);

        assert_eq!(controller.toggle_audio(), Some(false));
        assert_eq!(controller.toggle_audio(), Some(true));
        assert!(controller.is_audio_enabled());
    }

    #[test]
    fn test_toggle_without_track() {
        let controller = TrackController::new(MediaStream::new(vec![]));
        assert_eq!(controller.toggle_video(), None);
        assert_eq!(controller.toggle_audio(), None);
        assert!(!controller.is_video_enabled());
    }

    #[test]
    fn test_selected_camera_from_stream() {
        let controller = TrackController::new(stream());
        assert_eq!(controller.selected_camera().as_deref(), Some("camera-1"));
    }

    #[test]
    fn test_release_stops_everything() {
        let controller = TrackController::new(stream());
        let tracks = controller.stream().tracks();
        controller.release();
        assert!(tracks.iter().all(|t| !t.is_live()));
        assert!(!controller.is_screen_sharing());
    }
}
