//! Simulated capture stack for tests, demos and headless hosts
//!
//! Behaves like a browser's media devices: a fixed camera/microphone list, permission
//! prompts that can be denied, a display picker, and exclusive camera handles (opening a
//! camera whose previous track is still live fails with `DeviceBusy`).

use super::{DeviceInfo, DeviceKind, DisplayConstraints, MediaConstraints, MediaDevices};
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telecall_core::{MediaStream, MediaTrack, TrackKind, TrackSource};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Permissions {
    camera_denied: bool,
    microphone_denied: bool,
    display_denied: bool,
    enumeration_denied: bool,
}

#[derive(Debug)]
struct SimulatedInner {
    devices: RwLock<Vec<DeviceInfo>>,
    permissions: RwLock<Permissions>,
    broken_devices: Mutex<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
    camera_handles: Mutex<Vec<MediaTrack>>,
    display_tracks: Mutex<Vec<MediaTrack>>,
    peak_camera_handles: AtomicUsize,
    user_media_requests: AtomicUsize,
    display_requests: AtomicUsize,
    display_audio: AtomicBool,
}

/// In-process [`MediaDevices`] implementation
#[derive(Debug, Clone)]
pub struct SimulatedDevices {
    inner: Arc<SimulatedInner>,
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new(vec![
            DeviceInfo::camera("camera-front", "Front Camera"),
            DeviceInfo::camera("camera-back", "Back Camera"),
            DeviceInfo::microphone("microphone-default", "Built-in Microphone"),
        ])
    }
}

impl SimulatedDevices {
    /// Create a device set
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            inner: Arc::new(SimulatedInner {
                devices: RwLock::new(devices),
                permissions: RwLock::new(Permissions::default()),
                broken_devices: Mutex::new(HashSet::new()),
                latency: RwLock::new(None),
                camera_handles: Mutex::new(Vec::new()),
                display_tracks: Mutex::new(Vec::new()),
                peak_camera_handles: AtomicUsize::new(0),
                user_media_requests: AtomicUsize::new(0),
                display_requests: AtomicUsize::new(0),
                display_audio: AtomicBool::new(false),
            }),
        }
    }

    /// A machine with the given number of cameras and one microphone
    pub fn with_cameras(count: usize) -> Self {
        let mut devices: Vec<DeviceInfo> = (1..=count)
            .map(|i| DeviceInfo::camera(format!("camera-{}", i), format!("Camera {}", i)))
            .collect();
        devices.push(DeviceInfo::microphone("microphone-default", "Built-in Microphone"));
        Self::new(devices)
    }

    /// Plug in a device
    pub fn add_device(&self, device: DeviceInfo) {
        self.inner.devices.write().push(device);
    }

    /// Unplug a device; a live track on it ends as if the hardware vanished
    pub fn remove_device(&self, device_id: &str) {
        self.inner.devices.write().retain(|d| d.device_id != device_id);
        for track in self.inner.camera_handles.lock().iter() {
            if track.device_id() == Some(device_id) {
                track.end_from_platform();
            }
        }
    }

    /// Answer camera permission prompts with "deny"
    pub fn deny_camera(&self, denied: bool) {
        self.inner.permissions.write().camera_denied = denied;
    }

    /// Answer microphone permission prompts with "deny"
    pub fn deny_microphone(&self, denied: bool) {
        self.inner.permissions.write().microphone_denied = denied;
    }

    /// Cancel the display picker
    pub fn deny_display(&self, denied: bool) {
        self.inner.permissions.write().display_denied = denied;
    }

    /// Refuse device enumeration
    pub fn deny_enumeration(&self, denied: bool) {
        self.inner.permissions.write().enumeration_denied = denied;
    }

    /// Make a device fail to open
    pub fn break_device(&self, device_id: impl Into<String>) {
        self.inner.broken_devices.lock().insert(device_id.into());
    }

    /// Make a broken device work again
    pub fn repair_device(&self, device_id: &str) {
        self.inner.broken_devices.lock().remove(device_id);
    }

    /// Delay every capture request, like a slow permission prompt
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write() = latency;
    }

    /// Include an audio track in display captures that ask for one
    pub fn offer_display_audio(&self, offer: bool) {
        self.inner.display_audio.store(offer, Ordering::SeqCst);
    }

    /// Simulate the user pressing the platform's "Stop sharing" button
    pub fn stop_sharing_from_platform(&self) -> usize {
        let ended = self
            .inner
            .display_tracks
            .lock()
            .iter()
            .filter(|t| t.end_from_platform())
            .count();
        info!("🖥️ Platform ended {} display track(s)", ended);
        ended
    }

    /// Camera handles currently held (live camera tracks)
    pub fn open_camera_handles(&self) -> usize {
        let mut handles = self.inner.camera_handles.lock();
        handles.retain(MediaTrack::is_live);
        handles.len()
    }

    /// Most camera handles ever held at once
    pub fn peak_camera_handles(&self) -> usize {
        self.inner.peak_camera_handles.load(Ordering::SeqCst)
    }

    /// Live display tracks
    pub fn live_display_tracks(&self) -> usize {
        self.inner
            .display_tracks
            .lock()
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    /// Camera/microphone requests served or refused
    pub fn user_media_requests(&self) -> usize {
        self.inner.user_media_requests.load(Ordering::SeqCst)
    }

    /// Display capture requests served or refused
    pub fn display_requests(&self) -> usize {
        self.inner.display_requests.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn pick_device(&self, kind: DeviceKind, requested: Option<&str>) -> MediaResult<DeviceInfo> {
        let devices = self.inner.devices.read();
        let found = match requested {
            Some(id) => devices.iter().find(|d| d.kind == kind && d.device_id == id),
            None => devices.iter().find(|d| d.kind == kind),
        };
        let device = found.cloned().ok_or_else(|| MediaError::DeviceNotFound {
            device_id: requested.unwrap_or("default").to_string(),
        })?;

        if self.inner.broken_devices.lock().contains(&device.device_id) {
            return Err(MediaError::DeviceNotFound {
                device_id: format!("{} (could not start source)", device.device_id),
            });
        }
        Ok(device)
    }

    fn open_camera(&self, device: &DeviceInfo) -> MediaResult<MediaTrack> {
        let mut handles = self.inner.camera_handles.lock();
        handles.retain(MediaTrack::is_live);
        if handles
            .iter()
            .any(|t| t.device_id() == Some(device.device_id.as_str()))
        {
            warn!("Camera {} is already open", device.device_id);
            return Err(MediaError::DeviceBusy {
                device_id: device.device_id.clone(),
            });
        }

        let track = MediaTrack::with_device(
            TrackKind::Video,
            TrackSource::Camera,
            device.label.clone(),
            device.device_id.clone(),
        );
        handles.push(track.clone());
        self.inner
            .peak_camera_handles
            .fetch_max(handles.len(), Ordering::SeqCst);
        Ok(track)
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceInfo>> {
        if self.inner.permissions.read().enumeration_denied {
            return Err(MediaError::DeviceEnumerationFailed {
                reason: "enumerateDevices rejected".to_string(),
            });
        }
        Ok(self.inner.devices.read().clone())
    }

    async fn get_user_media(&self, constraints: &MediaConstraints) -> MediaResult<MediaStream> {
        self.inner.user_media_requests.fetch_add(1, Ordering::SeqCst);
        if constraints.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "at least one of audio and video must be requested".to_string(),
            });
        }
        self.simulate_latency().await;

        {
            let permissions = self.inner.permissions.read();
            if constraints.video.is_some() && permissions.camera_denied {
                return Err(MediaError::PermissionDenied {
                    operation: "camera access".to_string(),
                });
            }
            if constraints.audio.is_some() && permissions.microphone_denied {
                return Err(MediaError::PermissionDenied {
                    operation: "microphone access".to_string(),
                });
            }
        }

        let camera = match &constraints.video {
            Some(video) => Some(self.pick_device(DeviceKind::VideoInput, video.device_id.as_deref())?),
            None => None,
        };
        let microphone = match constraints.audio {
            Some(_) => Some(self.pick_device(DeviceKind::AudioInput, None)?),
            None => None,
        };

        let mut tracks = Vec::new();
        if let Some(camera) = camera {
            tracks.push(self.open_camera(&camera)?);
        }
        if let Some(microphone) = microphone {
            tracks.push(MediaTrack::with_device(
                TrackKind::Audio,
                TrackSource::Microphone,
                microphone.label,
                microphone.device_id,
            ));
        }

        debug!("Simulated getUserMedia produced {} track(s)", tracks.len());
        Ok(MediaStream::new(tracks))
    }

    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> MediaResult<MediaStream> {
        self.inner.display_requests.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.inner.permissions.read().display_denied {
            return Err(MediaError::PermissionDenied {
                operation: "screen capture".to_string(),
            });
        }

        let screen = MediaTrack::new(TrackKind::Video, TrackSource::Screen, "Entire Screen");
        let mut tracks = vec![screen.clone()];
        if constraints.audio && self.inner.display_audio.load(Ordering::SeqCst) {
            tracks.push(MediaTrack::new(TrackKind::Audio, TrackSource::Screen, "System Audio"));
        }

        let mut display = self.inner.display_tracks.lock();
        display.retain(MediaTrack::is_live);
        display.extend(tracks.iter().cloned());
        Ok(MediaStream::new(tracks))
    }
}
