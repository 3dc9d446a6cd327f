//! Camera enumeration through the host's native capture API
//!
//! Only enumeration is native; capture and display media are delegated to the wrapped
//! [`MediaDevices`] backend.

use super::{DeviceInfo, DisplayConstraints, MediaConstraints, MediaDevices};
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use nokhwa::utils::{ApiBackend, CameraIndex};
use telecall_core::MediaStream;
use tracing::{debug, warn};

/// Lists real cameras with `nokhwa`, delegating capture to `capture`
pub struct NativeCameraDevices<D> {
    capture: D,
}

impl<D: MediaDevices> NativeCameraDevices<D> {
    /// Wrap a capture backend
    pub fn new(capture: D) -> Self {
        Self { capture }
    }
}

fn query_cameras() -> MediaResult<Vec<DeviceInfo>> {
    let cameras = nokhwa::query(ApiBackend::Auto).map_err(|e| {
        warn!("Failed to enumerate cameras: {:?}", e);
        MediaError::DeviceEnumerationFailed {
            reason: e.to_string(),
        }
    })?;

    Ok(cameras
        .into_iter()
        .map(|info| {
            let id = match info.index() {
                CameraIndex::Index(i) => i.to_string(),
                CameraIndex::String(s) => s.to_string(),
            };
            DeviceInfo::camera(id, info.human_name())
        })
        .collect())
}

#[async_trait]
impl<D: MediaDevices> MediaDevices for NativeCameraDevices<D> {
    async fn enumerate_devices(&self) -> MediaResult<Vec<DeviceInfo>> {
        let mut devices = tokio::task::spawn_blocking(query_cameras)
            .await
            .map_err(|e| MediaError::DeviceEnumerationFailed {
                reason: format!("camera query task failed: {}", e),
            })??;
        debug!("Native backend reported {} camera(s)", devices.len());

        // Microphones and speakers still come from the capture backend
        let others = self.capture.enumerate_devices().await?;
        devices.extend(
            others
                .into_iter()
                .filter(|d| d.kind != super::DeviceKind::VideoInput),
        );
        Ok(devices)
    }

    async fn get_user_media(&self, constraints: &MediaConstraints) -> MediaResult<MediaStream> {
        self.capture.get_user_media(constraints).await
    }

    async fn get_display_media(
        &self,
        constraints: &DisplayConstraints,
    ) -> MediaResult<MediaStream> {
        self.capture.get_display_media(constraints).await
    }
}
