//! Call session
//!
//! [`Session`] is the one object the UI talks to. It composes device inventory, media
//! acquisition, track control, the peer connection and the recorder into a single call
//! lifecycle and exposes one consistent [`SessionSnapshot`].
//!
//! Operations are serialized through an async operation lock. `end_call` is the
//! exception: it never waits for that lock. Instead it bumps the session epoch, and an
//! in-flight operation that observes a different epoch when it tries to commit its
//! result releases what it acquired and returns [`CallError::Cancelled`].

use crate::config::SessionConfig;
use crate::event::{EventStream, SessionEvent};
use crate::participant::Role;
use crate::{Platform, TeleCall};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Weak};
use telecall_core::{
    CallError, CallResult, ConnectionState, EndReason, MediaStream, MediaTrack,
    PeerConnectionManager, PeerEvent, RtcConfiguration, TrackKind,
};
use telecall_diagnostics::{CallReport, CallTimeline, TimelineEvent};
use telecall_media::{
    AcquireConfig, CameraDevice, DeviceInventory, LocalMedia, MediaAcquisition, Recorder,
    RecordingArtifact, RecordingConfig, RecordingEvent, TrackController, MAX_VOLUME,
};
use telecall_signaling::{SignalingChannel, SignalingMessage, SignalingPayload};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Point-in-time view of a session for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier shared with the remote participant
    pub session_id: String,
    /// Offer or answer side
    pub role: Role,
    /// Connection lifecycle state
    pub connection_state: ConnectionState,
    /// Camera track enabled
    pub is_video_enabled: bool,
    /// Microphone track enabled
    pub is_audio_enabled: bool,
    /// Output volume, 0-100
    pub output_volume: u8,
    /// Recorder capturing
    pub is_recording: bool,
    /// Screen replaces the camera
    pub is_screen_sharing: bool,
    /// Camera in use, or the configured one before the call
    pub selected_camera_id: Option<String>,
    /// Last camera inventory
    pub available_cameras: Vec<CameraDevice>,
    /// Last surfaced error
    pub error: Option<String>,
    /// Local capture is live
    pub has_local_stream: bool,
    /// Remote media has arrived
    pub has_remote_stream: bool,
}

/// Fluent builder for [`Session`]
pub struct SessionBuilder {
    session_id: String,
    role: Role,
    config: SessionConfig,
    platform: Platform,
    signaling: Option<Arc<dyn SignalingChannel>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .field("config", &self.config)
            .field("signaling", &self.signaling.is_some())
            .finish()
    }
}

impl SessionBuilder {
    pub(crate) fn new(telecall: &TeleCall, session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: Role::Initiator,
            config: SessionConfig {
                video_enabled: false,
                audio_enabled: false,
                ..SessionConfig::from_global(telecall.config())
            },
            platform: telecall.platform().clone(),
            signaling: None,
        }
    }

    /// Set the negotiation role
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// The doctor initiates, the patient responds
    pub fn as_doctor(self, is_doctor: bool) -> Self {
        self.role(Role::from_is_doctor(is_doctor))
    }

    /// Capture the camera
    pub fn enable_video(mut self) -> Self {
        self.config.video_enabled = true;
        self
    }

    /// Capture the microphone
    pub fn enable_audio(mut self) -> Self {
        self.config.audio_enabled = true;
        self
    }

    /// Open this camera first
    pub fn camera(mut self, device_id: impl Into<String>) -> Self {
        self.config.camera_id = Some(device_id.into());
        self
    }

    /// Initial output volume, clamped to 0-100
    pub fn volume(mut self, volume: u8) -> Self {
        self.config.initial_volume = volume.min(MAX_VOLUME);
        self
    }

    /// Override the STUN/TURN servers
    pub fn rtc(mut self, rtc: RtcConfiguration) -> Self {
        self.config.rtc = rtc;
        self
    }

    /// Override the recorder settings
    pub fn recording(mut self, recording: RecordingConfig) -> Self {
        self.config.recording = recording;
        self
    }

    /// Replace the whole session configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Channel to the remote participant
    pub fn signaling<S: SignalingChannel + 'static>(mut self, channel: S) -> Self {
        self.signaling = Some(Arc::new(channel));
        self
    }

    /// Validate and create the session. Nothing is acquired until `start_call`.
    pub fn build(self) -> CallResult<Session> {
        if self.session_id.is_empty() {
            return Err(CallError::InvalidConfiguration {
                reason: "session id must not be empty".to_string(),
            });
        }
        self.config.validate()?;
        let signaling = self.signaling.ok_or_else(|| CallError::InvalidConfiguration {
            reason: "a signaling channel is required".to_string(),
        })?;

        info!(
            "🏗️ Session {} built as {} (video: {}, audio: {})",
            self.session_id, self.role, self.config.video_enabled, self.config.audio_enabled
        );

        let (epoch, _) = watch::channel(0);
        let inner = SessionInner {
            inventory: DeviceInventory::new(self.platform.devices.clone()),
            acquisition: MediaAcquisition::new(self.platform.devices.clone()),
            recorder: Recorder::new(self.platform.recorder.clone(), self.config.recording.clone()),
            call: RwLock::new(CallState::new(self.config.initial_volume)),
            id: self.session_id,
            role: self.role,
            config: self.config,
            platform: self.platform,
            signaling,
            op_lock: tokio::sync::Mutex::new(()),
            epoch,
            timeline: Mutex::new(CallTimeline::new()),
            subscribers: Mutex::new(Vec::new()),
        };
        Ok(Session {
            inner: Arc::new(inner),
        })
    }
}

/// Everything a call holds that `end_call` must give back
#[derive(Default)]
struct CallResources {
    media: Option<LocalMedia>,
    controller: Option<Arc<TrackController>>,
    peer: Option<PeerConnectionManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl CallResources {
    fn is_empty(&self) -> bool {
        self.media.is_none()
            && self.controller.is_none()
            && self.peer.is_none()
            && self.tasks.is_empty()
    }

    fn release(self) {
        for task in self.tasks {
            task.abort();
        }
        if let Some(peer) = self.peer {
            peer.close();
        }
        if let Some(controller) = self.controller {
            controller.release();
        }
        if let Some(media) = self.media {
            media.release();
        }
    }
}

struct CallState {
    connection: ConnectionState,
    output_volume: u8,
    error: Option<String>,
    resources: CallResources,
}

impl CallState {
    fn new(output_volume: u8) -> Self {
        Self {
            connection: ConnectionState::Idle,
            output_volume,
            error: None,
            resources: CallResources::default(),
        }
    }
}

struct SessionInner {
    id: String,
    role: Role,
    config: SessionConfig,
    platform: Platform,
    signaling: Arc<dyn SignalingChannel>,
    inventory: DeviceInventory,
    acquisition: MediaAcquisition,
    recorder: Recorder,
    op_lock: tokio::sync::Mutex<()>,
    epoch: watch::Sender<u64>,
    call: RwLock<CallState>,
    timeline: Mutex<CallTimeline>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl SessionInner {
    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn emit(&self, event: SessionEvent) {
        debug!("📡 Session {} event: {}", self.id, event.event_type());
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn record(&self, event: TimelineEvent) {
        self.timeline.lock().record(event);
    }

    fn transition(&self, call: &mut CallState, to: ConnectionState) {
        let from = call.connection;
        if from == to {
            return;
        }
        call.connection = to;
        info!("🔄 Session {}: {} -> {}", self.id, from, to);
        self.record(TimelineEvent::StateChanged { from, to });
        self.emit(SessionEvent::StateChanged { from, to });
    }

    /// Run `commit` under the call lock unless the call ended since `epoch`
    fn commit<T>(
        &self,
        epoch: u64,
        operation: &str,
        apply: impl FnOnce(&mut CallState) -> T,
    ) -> CallResult<T> {
        let mut call = self.call.write();
        if self.current_epoch() != epoch {
            debug!("{} abandoned: call ended while it was in flight", operation);
            return Err(CallError::cancelled(operation));
        }
        Ok(apply(&mut call))
    }

    /// Surface an error. A non-recoverable one fails a call that is still connecting.
    fn report_error(&self, epoch: u64, err: &CallError, recoverable: bool) {
        if matches!(err, CallError::Cancelled { .. }) {
            debug!("Not reporting cancellation: {}", err);
            return;
        }
        let mut call = self.call.write();
        if self.current_epoch() != epoch {
            debug!("Dropping error from an ended call: {}", err);
            return;
        }

        let message = err.to_string();
        if recoverable {
            warn!("⚠️ Session {}: {}", self.id, message);
        } else {
            error!("❌ Session {}: {}", self.id, message);
            if call.connection == ConnectionState::Connecting {
                self.transition(&mut call, ConnectionState::Failed);
            }
        }
        call.error = Some(message.clone());
        self.record(TimelineEvent::Error {
            message: message.clone(),
            recoverable,
        });
        self.emit(SessionEvent::Error {
            message,
            recoverable,
        });
    }

    fn apply_peer_state(&self, epoch: u64, to: ConnectionState) {
        let mut call = self.call.write();
        if self.current_epoch() != epoch || call.connection == to {
            return;
        }
        self.transition(&mut call, to);

        let reason = match to {
            ConnectionState::Failed => "connection could not be established",
            ConnectionState::Disconnected => "connection to the remote participant was lost",
            _ => return,
        };
        if call.error.is_none() {
            let message = CallError::Connection {
                reason: reason.to_string(),
            }
            .to_string();
            error!("❌ Session {}: {}", self.id, message);
            call.error = Some(message.clone());
            self.record(TimelineEvent::Error {
                message: message.clone(),
                recoverable: false,
            });
            self.emit(SessionEvent::Error {
                message,
                recoverable: false,
            });
        }
    }

    async fn handle_signaling(
        &self,
        peer: &PeerConnectionManager,
        message: SignalingMessage,
    ) -> CallResult<()> {
        let kind = message.kind();
        match message.payload {
            SignalingPayload::Offer(offer) if !self.role.is_initiator() => {
                info!("📥 Offer received for session {}", self.id);
                let answer = peer.accept_offer(offer).await?;
                self.signaling
                    .send(SignalingMessage::answer(self.id.clone(), answer))
                    .await?;
                peer.release_local_candidates();
                info!("📤 Answer sent for session {}", self.id);
                Ok(())
            }
            SignalingPayload::Answer(answer) if self.role.is_initiator() => {
                info!("📥 Answer received for session {}", self.id);
                peer.accept_answer(answer).await
            }
            SignalingPayload::IceCandidate(candidate) => {
                peer.add_remote_candidate(candidate).await
            }
            _ => {
                warn!("Ignoring unexpected {} as {}", kind, self.role);
                Ok(())
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let resources = std::mem::take(&mut self.call.get_mut().resources);
        if !resources.is_empty() {
            debug!("Session {} dropped during a call; releasing media", self.id);
            resources.release();
        }
    }
}

/// A two-party call session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Session identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Negotiation role
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.call.read().connection
    }

    /// Subscribe to session events from now on
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        EventStream::new(rx)
    }

    /// Acquire local media, open the peer connection and start negotiating.
    ///
    /// A call that is already connecting or connected makes this a no-op, so overlapping
    /// calls collapse into one. After `Failed` or `Disconnected`, call `end_call` first.
    pub async fn start_call(&self) -> CallResult<()> {
        let _op = self.inner.op_lock.lock().await;
        let epoch = {
            let mut call = self.inner.call.write();
            match call.connection {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    debug!("start_call ignored: call already {}", call.connection);
                    return Ok(());
                }
                ConnectionState::Failed | ConnectionState::Disconnected => {
                    return Err(CallError::InvalidState {
                        expected: "idle (end the failed call first)".to_string(),
                        actual: call.connection.to_string(),
                    });
                }
                ConnectionState::Idle => {}
            }
            *self.inner.timeline.lock() = CallTimeline::new();
            call.error = None;
            self.inner.transition(&mut call, ConnectionState::Connecting);
            self.inner.current_epoch()
        };
        info!("📞 Starting call {} as {}", self.inner.id, self.inner.role);

        match self.establish(epoch).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.report_error(epoch, &err, false);
                Err(err)
            }
        }
    }

    async fn establish(&self, epoch: u64) -> CallResult<()> {
        let inner = &self.inner;

        match inner.inventory.refresh().await {
            Ok(cameras) => inner.emit(SessionEvent::DevicesChanged {
                cameras: cameras.len(),
            }),
            Err(e) => warn!("Camera list unavailable, switching disabled: {}", e),
        }

        let acquire = AcquireConfig {
            output_volume: inner.call.read().output_volume,
            ..inner.config.acquire_config()
        };
        let media = inner.acquisition.acquire(&acquire).await?;
        let controller = Arc::new(TrackController::new(media.stream().clone()));
        let installed = inner.commit(epoch, "start_call", |call| {
            call.resources.media = Some(media.clone());
            call.resources.controller = Some(controller.clone());
        });
        if let Err(cancelled) = installed {
            controller.release();
            media.release();
            return Err(cancelled);
        }
        let tracks = media.stream().tracks().len();
        inner.record(TimelineEvent::MediaAcquired { tracks });
        inner.emit(SessionEvent::LocalMediaReady { tracks });

        let incoming = inner.signaling.subscribe()?;
        let (peer, peer_events) =
            PeerConnectionManager::open(inner.platform.peers.as_ref(), &inner.config.rtc)?;
        // Senders go in before the signaling pump can answer an offer
        if let Err(err) = peer.attach_stream(media.stream()) {
            peer.close();
            return Err(err);
        }
        let weak = Arc::downgrade(inner);
        let installed = inner.commit(epoch, "start_call", |call| {
            call.resources.peer = Some(peer.clone());
            call.resources.tasks.push(tokio::spawn(pump_peer_events(
                weak.clone(),
                epoch,
                peer_events,
            )));
            call.resources
                .tasks
                .push(tokio::spawn(pump_signaling(weak, epoch, incoming)));
        });
        if let Err(cancelled) = installed {
            peer.close();
            return Err(cancelled);
        }

        if inner.role.is_initiator() {
            let offer = peer.create_offer().await?;
            let message = SignalingMessage::offer(inner.id.clone(), offer);
            self.cancellable(epoch, "start_call", inner.signaling.send(message))
                .await??;
            peer.release_local_candidates();
            info!("📤 Offer sent for session {}", inner.id);
        } else {
            info!("⏳ Session {} waiting for an offer", inner.id);
        }
        Ok(())
    }

    /// Tear the call down and return to `Idle`.
    ///
    /// Never fails and never waits for in-flight operations; they observe the teardown
    /// and abandon their results. Calling it twice, or before `start_call`, is a no-op.
    pub fn end_call(&self) {
        self.inner.epoch.send_modify(|epoch| *epoch += 1);
        let resources = {
            let mut call = self.inner.call.write();
            call.error = None;
            self.inner.transition(&mut call, ConnectionState::Idle);
            std::mem::take(&mut call.resources)
        };

        self.inner.recorder.abort();
        if resources.is_empty() {
            debug!("end_call on session {}: nothing to release", self.inner.id);
            return;
        }
        resources.release();
        info!("📴 Call {} ended", self.inner.id);
    }

    /// Flip the enabled flag of the outgoing video (the screen while sharing) without
    /// renegotiating. `None` without video.
    pub async fn toggle_video(&self) -> Option<bool> {
        let _op = self.inner.op_lock.lock().await;
        let controller = self.inner.call.read().resources.controller.clone()?;
        controller.toggle_video()
    }

    /// Flip the microphone's enabled flag without renegotiating. `None` without a
    /// microphone.
    pub async fn toggle_audio(&self) -> Option<bool> {
        let _op = self.inner.op_lock.lock().await;
        let controller = self.inner.call.read().resources.controller.clone()?;
        controller.toggle_audio()
    }

    /// Set the output volume (clamped to 0-100); returns the applied value
    pub fn set_volume(&self, volume: u8) -> u8 {
        let volume = volume.min(MAX_VOLUME);
        let mut call = self.inner.call.write();
        call.output_volume = volume;
        if let Some(gain) = call.resources.media.as_ref().and_then(|m| m.gain()) {
            if let Err(e) = gain.set_volume(volume) {
                debug!("Gain control unavailable: {}", e);
            }
        }
        volume
    }

    /// Move to the next camera without renegotiating. `Ok(None)` when there is nothing
    /// to switch between.
    pub async fn switch_camera(&self) -> CallResult<Option<CameraDevice>> {
        let _op = self.inner.op_lock.lock().await;
        let epoch = self.inner.current_epoch();
        let Some((controller, peer)) = self.active_media() else {
            debug!("switch_camera ignored: no active call");
            return Ok(None);
        };

        match controller
            .switch_camera(&self.inner.inventory, &self.inner.acquisition, &peer)
            .await
        {
            Ok(Some(camera)) => {
                self.inner.record(TimelineEvent::CameraSwitched {
                    device_id: camera.device_id.clone(),
                });
                self.inner.emit(SessionEvent::CameraSwitched {
                    device_id: camera.device_id.clone(),
                    label: camera.label.clone(),
                });
                Ok(Some(camera))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.inner.report_error(epoch, &err, true);
                Err(err)
            }
        }
    }

    /// Send a screen instead of the camera. A no-op while already sharing.
    pub async fn start_screen_share(&self) -> CallResult<()> {
        let _op = self.inner.op_lock.lock().await;
        let epoch = self.inner.current_epoch();
        let (controller, peer) = self.active_media().ok_or_else(|| CallError::InvalidState {
            expected: "an active call".to_string(),
            actual: self.state().to_string(),
        })?;
        if controller.is_screen_sharing() {
            return Ok(());
        }

        let shared = async {
            let screen = self.inner.acquisition.acquire_display().await?;
            controller.start_screen_share(screen.clone(), &peer).await?;
            Ok::<_, CallError>(screen)
        }
        .await;
        let screen = match shared {
            Ok(screen) => screen,
            Err(err) => {
                self.inner.report_error(epoch, &err, true);
                return Err(err);
            }
        };

        let watcher = tokio::spawn(watch_screen_share(
            Arc::downgrade(&self.inner),
            epoch,
            screen.clone(),
        ));
        self.inner.commit(epoch, "start_screen_share", |call| {
            call.resources.tasks.retain(|t| !t.is_finished());
            call.resources.tasks.push(watcher);
        })?;

        self.inner.record(TimelineEvent::ScreenShareStarted);
        self.inner.emit(SessionEvent::ScreenShareStarted {
            label: screen.label().to_string(),
        });
        Ok(())
    }

    /// Restore the camera. Returns false when not sharing.
    pub async fn stop_screen_share(&self) -> CallResult<bool> {
        let _op = self.inner.op_lock.lock().await;
        let epoch = self.inner.current_epoch();
        let Some((controller, peer)) = self.active_media() else {
            return Ok(false);
        };
        self.finish_screen_share(epoch, &controller, &peer, false)
            .await
    }

    async fn end_platform_share(&self, epoch: u64, screen: &MediaTrack) {
        let _op = self.inner.op_lock.lock().await;
        if self.inner.current_epoch() != epoch {
            return;
        }
        let Some((controller, peer)) = self.active_media() else {
            return;
        };
        if !controller
            .screen_track()
            .is_some_and(|current| current.same_track(screen))
        {
            return;
        }
        // Already reported through the session error
        let _ = self.finish_screen_share(epoch, &controller, &peer, true).await;
    }

    async fn finish_screen_share(
        &self,
        epoch: u64,
        controller: &TrackController,
        peer: &PeerConnectionManager,
        by_platform: bool,
    ) -> CallResult<bool> {
        match controller.stop_screen_share(peer).await {
            Ok(true) => {
                self.inner
                    .record(TimelineEvent::ScreenShareStopped { by_platform });
                self.inner
                    .emit(SessionEvent::ScreenShareStopped { by_platform });
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                self.inner.report_error(epoch, &err, true);
                Err(err)
            }
        }
    }

    /// Start recording the local stream. A no-op while already recording.
    pub async fn start_recording(&self) -> CallResult<()> {
        let _op = self.inner.op_lock.lock().await;
        let epoch = self.inner.current_epoch();
        let stream = self
            .local_stream()
            .ok_or_else(|| CallError::InvalidState {
                expected: "local media".to_string(),
                actual: "no local stream".to_string(),
            })?;
        let recorder = &self.inner.recorder;
        if recorder.is_recording() {
            return Ok(());
        }
        // Clears a capture that failed earlier
        recorder.abort();

        let events = recorder.subscribe();
        if let Err(err) = recorder.start(stream) {
            let err = CallError::from(err);
            self.inner.report_error(epoch, &err, true);
            return Err(err);
        }

        let watcher = tokio::spawn(watch_recording(Arc::downgrade(&self.inner), epoch, events));
        let installed = self.inner.commit(epoch, "start_recording", |call| {
            call.resources.tasks.retain(|t| !t.is_finished());
            call.resources.tasks.push(watcher);
        });
        if let Err(cancelled) = installed {
            recorder.abort();
            return Err(cancelled);
        }

        self.inner.record(TimelineEvent::RecordingStarted);
        self.inner.emit(SessionEvent::RecordingStarted);
        Ok(())
    }

    /// Stop recording and wait for the final chunk. `None` when not recording or when
    /// the capture failed (already reported as an error event).
    pub async fn stop_recording(&self) -> Option<RecordingArtifact> {
        let _op = self.inner.op_lock.lock().await;
        let artifact = self.inner.recorder.stop().await?;
        self.inner.record(TimelineEvent::RecordingStopped {
            chunks: Some(artifact.chunks.len()),
        });
        self.inner.emit(SessionEvent::RecordingStopped {
            chunks: artifact.chunks.len(),
            size: artifact.size(),
        });
        Some(artifact)
    }

    /// Re-enumerate cameras. The inventory is otherwise only refreshed by `start_call`.
    pub async fn refresh_devices(&self) -> CallResult<Vec<CameraDevice>> {
        let _op = self.inner.op_lock.lock().await;
        let cameras = self.inner.inventory.refresh().await?;
        self.inner.emit(SessionEvent::DevicesChanged {
            cameras: cameras.len(),
        });
        Ok(cameras)
    }

    /// Current state of everything the UI renders
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = &self.inner;
        let call = inner.call.read();
        let controller = call.resources.controller.as_deref();

        SessionSnapshot {
            session_id: inner.id.clone(),
            role: inner.role,
            connection_state: call.connection,
            is_video_enabled: controller
                .map(TrackController::is_video_enabled)
                .unwrap_or(inner.config.video_enabled),
            is_audio_enabled: controller
                .map(TrackController::is_audio_enabled)
                .unwrap_or(inner.config.audio_enabled),
            output_volume: call.output_volume,
            is_recording: inner.recorder.is_recording(),
            is_screen_sharing: controller.is_some_and(TrackController::is_screen_sharing),
            selected_camera_id: controller
                .and_then(TrackController::selected_camera)
                .or_else(|| inner.config.camera_id.clone()),
            available_cameras: inner.inventory.cameras(),
            error: call.error.clone(),
            has_local_stream: call.resources.media.is_some(),
            has_remote_stream: call
                .resources
                .peer
                .as_ref()
                .and_then(PeerConnectionManager::remote_stream)
                .is_some(),
        }
    }

    /// The local stream; clones observe camera and screen swaps
    pub fn local_stream(&self) -> Option<MediaStream> {
        self.inner
            .call
            .read()
            .resources
            .media
            .as_ref()
            .map(|m| m.stream().clone())
    }

    /// The stream received from the remote participant
    pub fn remote_stream(&self) -> Option<MediaStream> {
        self.inner
            .call
            .read()
            .resources
            .peer
            .as_ref()
            .and_then(PeerConnectionManager::remote_stream)
    }

    /// Outgoing video track as currently sent to the remote participant
    pub fn outgoing_video(&self) -> Option<MediaTrack> {
        self.inner
            .call
            .read()
            .resources
            .peer
            .as_ref()
            .and_then(|p| p.outgoing_track(TrackKind::Video))
    }

    /// Timeline of the current (or last) call
    pub fn timeline(&self) -> CallTimeline {
        self.inner.timeline.lock().clone()
    }

    /// Summary of the current (or last) call
    pub fn report(&self) -> CallReport {
        self.inner.timeline.lock().report()
    }

    fn active_media(&self) -> Option<(Arc<TrackController>, PeerConnectionManager)> {
        let call = self.inner.call.read();
        Some((
            call.resources.controller.clone()?,
            call.resources.peer.clone()?,
        ))
    }

    /// Await `fut` unless the call ends first
    async fn cancellable<F: Future>(
        &self,
        epoch: u64,
        operation: &str,
        fut: F,
    ) -> CallResult<F::Output> {
        let mut epochs = self.inner.epoch.subscribe();
        tokio::select! {
            output = fut => Ok(output),
            _ = epoch_changed(&mut epochs, epoch) => Err(CallError::cancelled(operation)),
        }
    }
}

async fn epoch_changed(epochs: &mut watch::Receiver<u64>, epoch: u64) {
    loop {
        let current = *epochs.borrow_and_update();
        if current != epoch {
            return;
        }
        if epochs.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn pump_peer_events(
    session: Weak<SessionInner>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        if inner.current_epoch() != epoch {
            break;
        }
        match event {
            PeerEvent::StateChanged { to, .. } => inner.apply_peer_state(epoch, to),
            PeerEvent::TrackAdded { track, stream } => {
                debug!(
                    "Remote stream {} now has {} track(s)",
                    stream.id(),
                    stream.tracks().len()
                );
                inner.emit(SessionEvent::RemoteTrackAdded { track });
            }
            PeerEvent::IceCandidateProduced { candidate } => {
                let message = SignalingMessage::ice_candidate(inner.id.clone(), candidate);
                if let Err(e) = inner.signaling.send(message).await {
                    warn!("Could not forward ICE candidate: {}", e);
                }
            }
        }
    }
}

async fn pump_signaling(
    session: Weak<SessionInner>,
    epoch: u64,
    mut incoming: mpsc::UnboundedReceiver<SignalingMessage>,
) {
    while let Some(message) = incoming.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        if inner.current_epoch() != epoch {
            break;
        }
        if message.session_id != inner.id {
            debug!(
                "Ignoring {} addressed to session {}",
                message.kind(),
                message.session_id
            );
            continue;
        }
        let Some(peer) = inner.call.read().resources.peer.clone() else {
            continue;
        };
        if let Err(err) = inner.handle_signaling(&peer, message).await {
            inner.report_error(epoch, &err, err.is_recoverable());
        }
    }
}

async fn watch_screen_share(session: Weak<SessionInner>, epoch: u64, screen: MediaTrack) {
    if screen.ended().await != EndReason::Platform {
        return;
    }
    let Some(inner) = session.upgrade() else {
        return;
    };
    info!("🖥️ Screen sharing ended outside the app");
    Session { inner }.end_platform_share(epoch, &screen).await;
}

async fn watch_recording(
    session: Weak<SessionInner>,
    epoch: u64,
    mut events: broadcast::Receiver<RecordingEvent>,
) {
    loop {
        match events.recv().await {
            Ok(RecordingEvent::Failed(reason)) => {
                if let Some(inner) = session.upgrade() {
                    inner.report_error(epoch, &CallError::Recording { reason }, true);
                }
                break;
            }
            Ok(RecordingEvent::Stopped { .. }) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Recording watcher skipped {} event(s)", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
