//! Integration tests for live track control
//!
//! Camera switching and screen sharing against the simulated capture stack and a
//! simulated peer connection.

use std::sync::Arc;
use telecall_core::*;
use telecall_media::*;
use tokio::sync::mpsc;

struct Rig {
    devices: SimulatedDevices,
    inventory: DeviceInventory,
    acquisition: MediaAcquisition,
    local: LocalMedia,
    controller: TrackController,
    peer: PeerConnectionManager,
    conn: SimulatedPeerConnection,
    _events: mpsc::UnboundedReceiver<PeerEvent>,
}

async fn rig(cameras: usize) -> Rig {
    let devices = SimulatedDevices::with_cameras(cameras);
    let platform: Arc<dyn MediaDevices> = Arc::new(devices.clone());
    let inventory = DeviceInventory::new(platform.clone());
    inventory.refresh().await.unwrap();

    let acquisition = MediaAcquisition::new(platform);
    let local = acquisition
        .acquire(&AcquireConfig {
            video_enabled: cameras > 0,
            ..AcquireConfig::default()
        })
        .await
        .unwrap();
    let controller = TrackController::new(local.stream().clone());

    let factory = SimulatedPeerFactory::default();
    let (peer, events) = PeerConnectionManager::open(&factory, &RtcConfiguration::default()).unwrap();
    peer.attach_stream(local.stream()).unwrap();
    peer.create_offer().await.unwrap();
    let conn = factory.last_connection().unwrap();

    Rig {
        devices,
        inventory,
        acquisition,
        local,
        controller,
        peer,
        conn,
        _events: events,
    }
}

impl Rig {
    async fn switch(&self) -> CallResult<Option<CameraDevice>> {
        self.controller
            .switch_camera(&self.inventory, &self.acquisition, &self.peer)
            .await
    }
}

#[tokio::test]
async fn test_switch_is_noop_with_one_camera() {
    let rig = rig(1).await;
    let before = rig.local.stream().video_track().unwrap();

    assert_eq!(rig.switch().await.unwrap(), None);
    assert_eq!(rig.local.stream().video_track(), Some(before.clone()));
    assert!(before.is_live());
    assert_eq!(rig.conn.replacements(), 0);
}

#[tokio::test]
async fn test_switch_is_noop_without_cameras() {
    let rig = rig(0).await;
    assert_eq!(rig.switch().await.unwrap(), None);
    assert_eq!(rig.devices.user_media_requests(), 1);
}

#[tokio::test]
async fn test_switch_swaps_track_in_place() {
    let rig = rig(2).await;
    let holder = rig.local.stream().clone();
    let front = holder.video_track().unwrap();
    let mic = holder.audio_track().unwrap();
    rig.controller.toggle_video();

    let next = rig.switch().await.unwrap().unwrap();
    assert_eq!(next.device_id, "camera-2");

    let back = holder.video_track().unwrap();
    assert!(!front.is_live());
    assert_eq!(back.device_id(), Some("camera-2"));
    assert!(!back.is_enabled(), "disabled camera stays disabled after a switch");
    assert_eq!(holder.tracks()[0], back);
    assert_eq!(holder.audio_track(), Some(mic));

    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(back));
    assert_eq!(rig.conn.offers_created(), 1);
    assert_eq!(rig.devices.peak_camera_handles(), 1);
    assert_eq!(rig.controller.selected_camera().as_deref(), Some("camera-2"));
}

#[tokio::test]
async fn test_switch_wraps_around() {
    let rig = rig(2).await;
    rig.switch().await.unwrap();
    let again = rig.switch().await.unwrap().unwrap();
    assert_eq!(again.device_id, "camera-1");
    assert_eq!(rig.devices.open_camera_handles(), 1);
}

#[tokio::test]
async fn test_failed_switch_falls_back_to_previous_camera() {
    let rig = rig(2).await;
    rig.devices.break_device("camera-2");

    let result = rig.switch().await;
    assert!(matches!(result, Err(CallError::MediaAccess { .. })));

    let video = rig.local.stream().video_track().unwrap();
    assert!(video.is_live());
    assert_eq!(video.device_id(), Some("camera-1"));
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(video));
    assert_eq!(rig.controller.selected_camera().as_deref(), Some("camera-1"));
}

#[tokio::test]
async fn test_screen_share_round_trip_restores_camera() {
    let rig = rig(2).await;
    let camera = rig.local.stream().video_track().unwrap();

    let screen = rig.acquisition.acquire_display().await.unwrap();
    rig.controller
        .start_screen_share(screen.clone(), &rig.peer)
        .await
        .unwrap();

    assert!(rig.controller.is_screen_sharing());
    assert_eq!(rig.local.stream().video_track(), Some(screen.clone()));
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(screen.clone()));
    assert!(camera.is_live(), "camera stays open while parked");

    assert!(rig.controller.stop_screen_share(&rig.peer).await.unwrap());
    assert!(!rig.controller.is_screen_sharing());
    assert!(!screen.is_live());
    assert_eq!(rig.local.stream().video_track(), Some(camera.clone()));
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(camera));
    assert_eq!(rig.conn.offers_created(), 1);

    assert!(!rig.controller.stop_screen_share(&rig.peer).await.unwrap());
}

#[tokio::test]
async fn test_switch_while_sharing_updates_parked_camera() {
    let rig = rig(2).await;
    let screen = rig.acquisition.acquire_display().await.unwrap();
    rig.controller
        .start_screen_share(screen.clone(), &rig.peer)
        .await
        .unwrap();

    rig.switch().await.unwrap().unwrap();
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(screen));

    rig.controller.stop_screen_share(&rig.peer).await.unwrap();
    let restored = rig.local.stream().video_track().unwrap();
    assert_eq!(restored.device_id(), Some("camera-2"));
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(restored));
}

#[tokio::test]
async fn test_rejected_screen_track_keeps_camera() {
    let rig = rig(1).await;
    let camera = rig.local.stream().video_track().unwrap();
    rig.conn.fail_track_replacement(true);

    let screen = rig.acquisition.acquire_display().await.unwrap();
    let result = rig.controller.start_screen_share(screen.clone(), &rig.peer).await;

    assert!(result.is_err());
    assert!(!screen.is_live());
    assert!(!rig.controller.is_screen_sharing());
    assert_eq!(rig.local.stream().video_track(), Some(camera.clone()));
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(camera));
}

#[tokio::test]
async fn test_second_screen_share_rejected() {
    let rig = rig(1).await;
    let first = rig.acquisition.acquire_display().await.unwrap();
    rig.controller.start_screen_share(first, &rig.peer).await.unwrap();

    let second = rig.acquisition.acquire_display().await.unwrap();
    let result = rig.controller.start_screen_share(second.clone(), &rig.peer).await;
    assert!(matches!(result, Err(CallError::InvalidState { .. })));
    assert!(!second.is_live());
}

#[tokio::test]
async fn test_release_stops_parked_camera() {
    let rig = rig(1).await;
    let camera = rig.local.stream().video_track().unwrap();
    let screen = rig.acquisition.acquire_display().await.unwrap();
    rig.controller
        .start_screen_share(screen.clone(), &rig.peer)
        .await
        .unwrap();

    rig.controller.release();
    rig.local.release();
    assert!(!camera.is_live());
    assert!(!screen.is_live());
    assert_eq!(rig.devices.open_camera_handles(), 0);

    let again = rig.acquisition.acquire_display().await.unwrap();
    assert!(matches!(
        rig.controller.start_screen_share(again, &rig.peer).await,
        Err(CallError::Cancelled { .. })
    ));
}

#[tokio::test]
async fn test_refused_camera_falls_back_to_previous_camera() {
    let rig = rig(2).await;
    let holder = rig.local.stream().clone();
    rig.conn.fail_next_replacement();

    let result = rig.switch().await;
    tokio_test::assert_err!(result);

    let video = holder.video_track().unwrap();
    assert!(video.is_live());
    assert_eq!(video.device_id(), Some("camera-1"));
    assert_eq!(rig.peer.outgoing_track(TrackKind::Video), Some(video));
    assert_eq!(rig.controller.selected_camera().as_deref(), Some("camera-1"));
    assert_eq!(rig.devices.open_camera_handles(), 1);
    assert_eq!(rig.conn.replacements(), 1);
}

#[tokio::test]
async fn test_toggle_while_sharing_mutes_the_screen() {
    let rig = rig(1).await;
    let camera = rig.local.stream().video_track().unwrap();
    let screen = rig.acquisition.acquire_display().await.unwrap();
    rig.controller
        .start_screen_share(screen.clone(), &rig.peer)
        .await
        .unwrap();

    assert_eq!(rig.controller.toggle_video(), Some(false));
    let sent = rig.peer.outgoing_track(TrackKind::Video).unwrap();
    assert_eq!(sent, screen);
    assert!(!sent.is_enabled());
    assert!(!rig.controller.is_video_enabled());
    assert!(!camera.is_enabled(), "parked camera follows the toggle");

    rig.controller.stop_screen_share(&rig.peer).await.unwrap();
    assert!(!rig.peer.outgoing_track(TrackKind::Video).unwrap().is_enabled());
    assert_eq!(rig.controller.toggle_video(), Some(true));
    assert!(camera.is_enabled());
}

#[tokio::test]
async fn test_screen_share_needs_video_sender() {
    let rig = rig(0).await;
    let screen = rig.acquisition.acquire_display().await.unwrap();

    let result = rig.controller.start_screen_share(screen.clone(), &rig.peer).await;
    assert!(matches!(result, Err(CallError::InvalidState { .. })));
    assert!(!screen.is_live());
    assert!(!rig.controller.is_screen_sharing());
    assert!(rig.local.stream().video_track().is_none());
}
