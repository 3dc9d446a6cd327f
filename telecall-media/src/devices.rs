//! Camera inventory
//!
//! A snapshot of the video inputs the platform reports, taken on demand. The snapshot
//! is refreshed when a call starts and when the user asks for it; there is no hot-plug
//! subscription.

use crate::capture::{DeviceKind, MediaDevices};
use crate::error::MediaResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A camera as listed at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Platform device ID
    pub device_id: String,
    /// Display label
    pub label: String,
}

/// Cached list of cameras
pub struct DeviceInventory {
    devices: Arc<dyn MediaDevices>,
    cameras: RwLock<Vec<CameraDevice>>,
}

impl std::fmt::Debug for DeviceInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInventory")
            .field("cameras", &*self.cameras.read())
            .finish()
    }
}

impl DeviceInventory {
    /// Create an empty inventory over a platform backend
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            cameras: RwLock::new(Vec::new()),
        }
    }

    /// Enumerate video inputs in platform order without touching the cache
    pub async fn list_cameras(&self) -> MediaResult<Vec<CameraDevice>> {
        let devices = self.devices.enumerate_devices().await?;
        let cameras: Vec<CameraDevice> = devices
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .enumerate()
            .map(|(i, d)| CameraDevice {
                label: if d.label.is_empty() {
                    format!("Camera {}", i + 1)
                } else {
                    d.label
                },
                device_id: d.device_id,
            })
            .collect();
        debug!("Enumerated {} camera(s)", cameras.len());
        Ok(cameras)
    }

    /// Re-enumerate and replace the snapshot. The old snapshot survives a failure.
    pub async fn refresh(&self) -> MediaResult<Vec<CameraDevice>> {
        let cameras = self.list_cameras().await?;
        info!("📷 Camera inventory refreshed: {} camera(s)", cameras.len());
        *self.cameras.write() = cameras.clone();
        Ok(cameras)
    }

    /// Current snapshot
    pub fn cameras(&self) -> Vec<CameraDevice> {
        self.cameras.read().clone()
    }

    /// Look up a camera in the snapshot
    pub fn camera(&self, device_id: &str) -> Option<CameraDevice> {
        self.cameras
            .read()
            .iter()
            .find(|c| c.device_id == device_id)
            .cloned()
    }

    /// Whether there is anything to switch between
    pub fn can_switch(&self) -> bool {
        self.cameras.read().len() >= 2
    }

    /// Camera following `current` in the snapshot, wrapping around. An unknown or absent
    /// `current` selects the first camera.
    pub fn next_camera_after(&self, current: Option<&str>) -> Option<CameraDevice> {
        let cameras = self.cameras.read();
        if cameras.is_empty() {
            return None;
        }
        let next = current
            .and_then(|id| cameras.iter().position(|c| c.device_id == id))
            .map(|pos| (pos + 1) % cameras.len())
            .unwrap_or(0);
        cameras.get(next).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::simulated::SimulatedDevices;
    use crate::capture::DeviceInfo;
    use crate::error::MediaError;

    fn inventory(devices: SimulatedDevices) -> DeviceInventory {
        DeviceInventory::new(Arc::new(devices))
    }

    #[tokio::test]
    async fn test_lists_only_cameras_in_order() {
        let inv = inventory(SimulatedDevices::with_cameras(3));
        let cameras = inv.refresh().await.unwrap();
        let ids: Vec<_> = cameras.iter().map(|c| c.device_id.as_str()).collect();
        assert_eq!(ids, vec!["camera-1", "camera-2", "camera-3"]);
    }

    #[tokio::test]
    async fn test_next_camera_wraps_around() {
        let inv = inventory(SimulatedDevices::with_cameras(2));
        inv.refresh().await.unwrap();

        assert_eq!(inv.next_camera_after(Some("camera-1")).unwrap().device_id, "camera-2");
        assert_eq!(inv.next_camera_after(Some("camera-2")).unwrap().device_id, "camera-1");
        assert_eq!(inv.next_camera_after(Some("gone")).unwrap().device_id, "camera-1");
        assert_eq!(inv.next_camera_after(None).unwrap().device_id, "camera-1");
    }

    #[tokio::test]
    async fn test_zero_cameras_is_not_an_error() {
        let inv = inventory(SimulatedDevices::with_cameras(0));
        assert!(inv.refresh().await.unwrap().is_empty());
        assert!(inv.next_camera_after(None).is_none());
        assert!(!inv.can_switch());
    }

    #[tokio::test]
    async fn test_denied_enumeration_keeps_snapshot() {
        let devices = SimulatedDevices::with_cameras(2);
        let inv = inventory(devices.clone());
        inv.refresh().await.unwrap();

        devices.deny_enumeration(true);
        let result = inv.refresh().await;
        assert!(matches!(result, Err(MediaError::DeviceEnumerationFailed { .. })));
        assert_eq!(inv.cameras().len(), 2);
    }

    #[tokio::test]
    async fn test_unlabelled_camera_gets_placeholder() {
        let inv = inventory(SimulatedDevices::new(vec![DeviceInfo::camera("x", "")]));
        let cameras = inv.refresh().await.unwrap();
        assert_eq!(cameras[0].label, "Camera 1");
    }
}
