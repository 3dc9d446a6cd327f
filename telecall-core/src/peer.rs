//! Peer connection management
//!
//! [`PeerConnectionManager`] exclusively owns the platform peer connection. It attaches
//! local tracks, drives offer/answer, queues ICE candidates that arrive too early, folds
//! incoming tracks into a single remote stream and maps transport states onto
//! [`ConnectionState`]. Everything it observes is published as a [`PeerEvent`] on an
//! unbounded channel instead of callbacks.

use crate::error::{CallError, CallResult};
use crate::media::{MediaStream, MediaTrack, TrackKind};
use crate::negotiation::{IceCandidate, RtcConfiguration, SdpKind, SessionDescription};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Connection lifecycle as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConnectionState {
    /// No call in progress
    Idle,
    /// Media acquired, negotiation or ICE in progress
    Connecting,
    /// Media is flowing between the peers
    Connected,
    /// Never reached `Connected`; needs an explicit restart
    Failed,
    /// Was connected, then the transport dropped; needs an explicit restart
    Disconnected,
}

impl ConnectionState {
    /// Terminal states require `end_call` then `start_call` to retry
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Disconnected)
    }

    /// Whether a call is underway (connecting or connected)
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Raw connection state reported by the platform transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, nothing happened yet
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Connected
    Connected,
    /// Connectivity lost, may or may not come back
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Closed locally
    Closed,
}

/// Notifications from the platform connection to its manager
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The remote peer sent a track as part of `stream_id`
    TrackReceived {
        /// Incoming track
        track: MediaTrack,
        /// Remote stream the track belongs to
        stream_id: String,
    },
    /// A local ICE candidate was gathered
    IceCandidate(IceCandidate),
    /// The transport changed state
    StateChanged(TransportState),
}

/// Events published by the manager
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Connection state changed
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
    /// A remote track was added to the remote stream
    TrackAdded {
        /// The new track
        track: MediaTrack,
        /// Remote stream holding it
        stream: MediaStream,
    },
    /// A local candidate is ready to be sent to the remote peer
    IceCandidateProduced {
        /// Candidate to forward
        candidate: IceCandidate,
    },
}

/// Opaque handle to an outgoing track slot on the platform connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub u32);

/// Platform peer connection (`RTCPeerConnection` or equivalent)
#[async_trait]
pub trait PeerConnectionBackend: Send + Sync {
    /// Attach a local track as a new sender
    fn add_track(&self, track: &MediaTrack, stream_id: &str) -> CallResult<SenderId>;

    /// Track currently fed into a sender
    fn sender_track(&self, sender: SenderId) -> Option<MediaTrack>;

    /// Swap the track feeding a sender without renegotiating
    async fn replace_track(&self, sender: SenderId, track: MediaTrack) -> CallResult<()>;

    /// Create an offer describing the attached senders
    async fn create_offer(&self) -> CallResult<SessionDescription>;

    /// Create an answer to the remote offer
    async fn create_answer(&self) -> CallResult<SessionDescription>;

    /// Apply the local description; gathering starts afterwards
    async fn set_local_description(&self, description: SessionDescription) -> CallResult<()>;

    /// Apply the remote description
    async fn set_remote_description(&self, description: SessionDescription) -> CallResult<()>;

    /// Apply a remote candidate (only after the remote description)
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()>;

    /// Close the connection and stop receiving
    fn close(&self);
}

/// Creates platform peer connections
pub trait PeerConnectionFactory: Send + Sync {
    /// Create a connection that reports into `events`
    fn create(
        &self,
        config: &RtcConfiguration,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> CallResult<Arc<dyn PeerConnectionBackend>>;
}

#[derive(Debug, Default)]
struct IceQueues {
    /// Local description has been handed to signaling; candidates may flow
    local_released: bool,
    pending_local: Vec<IceCandidate>,
    /// Remote description applied; remote candidates may be added directly
    remote_described: bool,
    pending_remote: Vec<IceCandidate>,
}

struct PeerInner {
    id: Uuid,
    backend: Arc<dyn PeerConnectionBackend>,
    state: RwLock<ConnectionState>,
    senders: Mutex<HashMap<TrackKind, SenderId>>,
    remote_stream: RwLock<Option<MediaStream>>,
    local_description: RwLock<Option<SessionDescription>>,
    ice: Mutex<IceQueues>,
    events: mpsc::UnboundedSender<PeerEvent>,
    closed: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the platform peer connection and its negotiation state machine
#[derive(Clone)]
pub struct PeerConnectionManager {
    inner: Arc<PeerInner>,
}

impl std::fmt::Debug for PeerConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionManager")
            .field("id", &self.inner.id)
            .field("state", &*self.inner.state.read())
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl PeerConnectionManager {
    /// Create the platform connection and start pumping its events.
    ///
    /// The manager starts in `Connecting`: it only exists while a call is being set up.
    pub fn open(
        factory: &dyn PeerConnectionFactory,
        config: &RtcConfiguration,
    ) -> CallResult<(Self, mpsc::UnboundedReceiver<PeerEvent>)> {
        config.validate()?;

        let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let backend = factory.create(config, transport_tx)?;

        let inner = Arc::new(PeerInner {
            id: Uuid::new_v4(),
            backend,
            state: RwLock::new(ConnectionState::Connecting),
            senders: Mutex::new(HashMap::new()),
            remote_stream: RwLock::new(None),
            local_description: RwLock::new(None),
            ice: Mutex::new(IceQueues::default()),
            events: event_tx,
            closed: AtomicBool::new(false),
            pump: Mutex::new(None),
        });

        info!(
            "🔗 Opened peer connection {} with {} ICE server(s)",
            inner.id,
            config.ice_servers.len()
        );

        let weak: Weak<PeerInner> = Arc::downgrade(&inner);
        let pump = tokio::spawn(async move {
            while let Some(event) = transport_rx.recv().await {
                match weak.upgrade() {
                    Some(inner) => inner.handle_transport_event(event),
                    None => break,
                }
            }
        });
        *inner.pump.lock() = Some(pump);

        Ok((Self { inner }, event_rx))
    }

    /// Connection ID for log correlation
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Remote stream assembled from incoming tracks
    pub fn remote_stream(&self) -> Option<MediaStream> {
        self.inner.remote_stream.read().clone()
    }

    /// Local description currently applied
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.inner.local_description.read().clone()
    }

    /// Attach every track of the local stream, one sender per kind
    pub fn attach_stream(&self, stream: &MediaStream) -> CallResult<()> {
        self.ensure_open("attach_stream")?;
        let mut senders = self.inner.senders.lock();
        for track in stream.tracks() {
            if senders.contains_key(&track.kind()) {
                debug!("Sender for {} already attached, skipping {}", track.kind(), track.id());
                continue;
            }
            let sender = self.inner.backend.add_track(&track, stream.id())?;
            debug!("Attached {} track {} as sender {:?}", track.kind(), track.id(), sender);
            senders.insert(track.kind(), sender);
        }
        Ok(())
    }

    /// Track currently sent for a kind
    pub fn outgoing_track(&self, kind: TrackKind) -> Option<MediaTrack> {
        let sender = *self.inner.senders.lock().get(&kind)?;
        self.inner.backend.sender_track(sender)
    }

    /// Swap the outgoing track of the same kind without renegotiation
    pub async fn replace_outgoing_track(&self, track: MediaTrack) -> CallResult<()> {
        self.ensure_open("replace_outgoing_track")?;
        let kind = track.kind();
        let sender = self
            .inner
            .senders
            .lock()
            .get(&kind)
            .copied()
            .ok_or_else(|| CallError::InvalidState {
                expected: format!("an attached {} sender", kind),
                actual: "no sender".to_string(),
            })?;

        info!("🔁 Replacing outgoing {} track with {} ({})", kind, track.id(), track.label());
        self.inner.backend.replace_track(sender, track).await
    }

    /// Initiator side: create and apply the local offer
    pub async fn create_offer(&self) -> CallResult<SessionDescription> {
        self.ensure_open("create_offer")?;
        let result = async {
            let offer = self.inner.backend.create_offer().await?;
            offer.expect_kind(SdpKind::Offer)?;
            self.inner.backend.set_local_description(offer.clone()).await?;
            Ok(offer)
        }
        .await;

        match result {
            Ok(offer) => {
                *self.inner.local_description.write() = Some(offer.clone());
                info!("📤 Created offer on {}", self.inner.id);
                Ok(offer)
            }
            Err(e) => Err(self.fail_negotiation(e)),
        }
    }

    /// Responder side: apply the remote offer, then create and apply the answer
    pub async fn accept_offer(&self, offer: SessionDescription) -> CallResult<SessionDescription> {
        self.ensure_open("accept_offer")?;
        let result = async {
            offer.expect_kind(SdpKind::Offer)?;
            self.apply_remote_description(offer).await?;
            let answer = self.inner.backend.create_answer().await?;
            answer.expect_kind(SdpKind::Answer)?;
            self.inner.backend.set_local_description(answer.clone()).await?;
            Ok(answer)
        }
        .await;

        match result {
            Ok(answer) => {
                *self.inner.local_description.write() = Some(answer.clone());
                info!("📤 Created answer on {}", self.inner.id);
                Ok(answer)
            }
            Err(e) => Err(self.fail_negotiation(e)),
        }
    }

    /// Initiator side: apply the remote answer
    pub async fn accept_answer(&self, answer: SessionDescription) -> CallResult<()> {
        self.ensure_open("accept_answer")?;
        let result = async {
            answer.expect_kind(SdpKind::Answer)?;
            let has_offer = matches!(
                self.inner.local_description.read().as_ref(),
                Some(SessionDescription { kind: SdpKind::Offer, .. })
            );
            if !has_offer {
                return Err(CallError::negotiation("answer received without a local offer"));
            }
            self.apply_remote_description(answer).await
        }
        .await;

        result.map_err(|e| self.fail_negotiation(e))
    }

    /// Apply a remote candidate now, or queue it until the remote description arrives
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) -> CallResult<()> {
        self.ensure_open("add_remote_candidate")?;
        {
            let mut ice = self.inner.ice.lock();
            if !ice.remote_described {
                debug!("Queueing early remote candidate: {}", candidate.candidate);
                ice.pending_remote.push(candidate);
                return Ok(());
            }
        }
        self.inner.backend.add_ice_candidate(candidate).await
    }

    /// Signal that the local description has been handed to signaling; queued local
    /// candidates are published in the order they were gathered.
    pub fn release_local_candidates(&self) {
        // Flush under the lock so the pump cannot publish a later candidate first.
        let mut ice = self.inner.ice.lock();
        ice.local_released = true;
        if !ice.pending_local.is_empty() {
            debug!("Releasing {} queued local candidate(s)", ice.pending_local.len());
        }
        for candidate in ice.pending_local.drain(..) {
            let _ = self
                .inner
                .events
                .send(PeerEvent::IceCandidateProduced { candidate });
        }
    }

    /// Number of remote candidates waiting for the remote description
    pub fn pending_remote_candidates(&self) -> usize {
        self.inner.ice.lock().pending_remote.len()
    }

    /// Close the platform connection and clear remote state. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("🔌 Closing peer connection {}", self.inner.id);
        self.inner.backend.close();

        if let Some(stream) = self.inner.remote_stream.write().take() {
            stream.stop_all();
        }
        *self.inner.ice.lock() = IceQueues::default();
        self.inner.senders.lock().clear();
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
    }

    async fn apply_remote_description(&self, description: SessionDescription) -> CallResult<()> {
        self.inner.backend.set_remote_description(description).await?;
        // Candidates keep queueing until the backlog is drained, so arrival order holds.
        loop {
            let pending = {
                let mut ice = self.inner.ice.lock();
                if ice.pending_remote.is_empty() {
                    ice.remote_described = true;
                    return Ok(());
                }
                std::mem::take(&mut ice.pending_remote)
            };
            debug!("Applying {} queued remote candidate(s)", pending.len());
            for candidate in pending {
                self.inner.backend.add_ice_candidate(candidate).await?;
            }
        }
    }

    fn ensure_open(&self, operation: &str) -> CallResult<()> {
        if self.is_closed() {
            Err(CallError::InvalidState {
                expected: "open peer connection".to_string(),
                actual: format!("closed (during {})", operation),
            })
        } else {
            Ok(())
        }
    }

    fn fail_negotiation(&self, err: CallError) -> CallError {
        let err = match err {
            e @ CallError::Negotiation { .. } => e,
            other => CallError::negotiation(other.to_string()),
        };
        error!("❌ Negotiation failed on {}: {}", self.inner.id, err);
        self.inner.transition(ConnectionState::Failed);
        err
    }
}

impl PeerInner {
    fn handle_transport_event(&self, event: TransportEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            TransportEvent::TrackReceived { track, stream_id } => {
                let stream = {
                    let mut remote = self.remote_stream.write();
                    match remote.as_ref().filter(|s| s.id() == stream_id) {
                        Some(stream) => {
                            stream.add_track(track.clone());
                            stream.clone()
                        }
                        None => {
                            if remote.is_some() {
                                info!("Remote stream replaced by {}", stream_id);
                            }
                            let stream = MediaStream::with_id(stream_id, vec![track.clone()]);
                            *remote = Some(stream.clone());
                            stream
                        }
                    }
                };
                info!("📥 Remote {} track {} received", track.kind(), track.id());
                let _ = self.events.send(PeerEvent::TrackAdded { track, stream });
            }
            TransportEvent::IceCandidate(candidate) => {
                let mut ice = self.ice.lock();
                if ice.local_released {
                    let _ = self.events.send(PeerEvent::IceCandidateProduced { candidate });
                } else {
                    debug!("Queueing local candidate until the description is sent");
                    ice.pending_local.push(candidate);
                }
            }
            TransportEvent::StateChanged(transport) => {
                let current = *self.state.read();
                let next = match (current, transport) {
                    (ConnectionState::Connecting, TransportState::Connected) => {
                        Some(ConnectionState::Connected)
                    }
                    (
                        ConnectionState::Connecting,
                        TransportState::Failed | TransportState::Disconnected,
                    ) => Some(ConnectionState::Failed),
                    (
                        ConnectionState::Connected,
                        TransportState::Failed | TransportState::Disconnected,
                    ) => Some(ConnectionState::Disconnected),
                    _ => None,
                };
                match next {
                    Some(state) => {
                        if state.is_terminal() {
                            warn!("Transport reported {:?} while {}", transport, current);
                        }
                        self.transition(state);
                    }
                    None => debug!("Ignoring transport state {:?} while {}", transport, current),
                }
            }
        }
    }

    fn transition(&self, to: ConnectionState) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            if from == to {
                return;
            }
            *state = to;
            from
        };
        info!("🔄 Peer connection {}: {} -> {}", self.id, from, to);
        let _ = self.events.send(PeerEvent::StateChanged { from, to });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_classification() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Idle.is_active());
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
