//! In-process peer connection backend
//!
//! Used by tests, demos and platforms without a native WebRTC stack. It produces
//! well-formed offers/answers listing the attached senders, gathers a couple of host
//! candidates after each local description, and, when `auto_connect` is set, reports
//! `Connected` once both descriptions are in place and plays back one remote track per
//! media section of the remote description.

use crate::error::{CallError, CallResult};
use crate::media::{MediaTrack, TrackKind, TrackSource};
use crate::negotiation::{IceCandidate, RtcConfiguration, SdpKind, SessionDescription};
use crate::peer::{
    PeerConnectionBackend, PeerConnectionFactory, SenderId, TransportEvent, TransportState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Behaviour knobs for simulated connections
#[derive(Debug, Clone)]
pub struct SimulatedPeerConfig {
    /// Report `Connected` this long after both descriptions are applied
    pub auto_connect: Option<Duration>,
    /// Host candidates gathered per local description
    pub candidates_per_description: usize,
    /// Time taken to apply each remote candidate
    pub candidate_latency: Option<Duration>,
}

impl Default for SimulatedPeerConfig {
    fn default() -> Self {
        Self {
            auto_connect: None,
            candidates_per_description: 2,
            candidate_latency: None,
        }
    }
}

impl SimulatedPeerConfig {
    /// Connect automatically after `delay`, like a demo without a remote peer
    pub fn auto_connect(delay: Duration) -> Self {
        Self {
            auto_connect: Some(delay),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct SenderSlot {
    track: MediaTrack,
    stream_id: String,
}

#[derive(Debug, Default)]
struct Negotiation {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
}

#[derive(Debug)]
struct ConnectionInner {
    config: SimulatedPeerConfig,
    rtc: RtcConfiguration,
    events: mpsc::UnboundedSender<TransportEvent>,
    senders: Mutex<Vec<SenderSlot>>,
    negotiation: Mutex<Negotiation>,
    offers_created: AtomicUsize,
    answers_created: AtomicUsize,
    replacements: AtomicUsize,
    fail_replace: AtomicBool,
    fail_next_replace: AtomicBool,
    fail_negotiation: AtomicBool,
    connect_scheduled: AtomicBool,
    closed: AtomicBool,
}

/// Handle to one simulated connection, for driving and inspecting it
#[derive(Debug, Clone)]
pub struct SimulatedPeerConnection {
    inner: Arc<ConnectionInner>,
}

impl SimulatedPeerConnection {
    /// Pretend the transport changed state
    pub fn report_state(&self, state: TransportState) {
        let _ = self.inner.events.send(TransportEvent::StateChanged(state));
    }

    /// Pretend the remote peer sent a track
    pub fn deliver_remote_track(&self, track: MediaTrack, stream_id: impl Into<String>) {
        let _ = self.inner.events.send(TransportEvent::TrackReceived {
            track,
            stream_id: stream_id.into(),
        });
    }

    /// Pretend a local candidate was gathered
    pub fn gather_candidate(&self, candidate: IceCandidate) {
        let _ = self.inner.events.send(TransportEvent::IceCandidate(candidate));
    }

    /// Track currently fed into the first sender of `kind`
    pub fn outgoing_track(&self, kind: TrackKind) -> Option<MediaTrack> {
        self.inner
            .senders
            .lock()
            .iter()
            .find(|s| s.track.kind() == kind)
            .map(|s| s.track.clone())
    }

    /// Number of attached senders
    pub fn sender_count(&self) -> usize {
        self.inner.senders.lock().len()
    }

    /// Offers created so far; a track replacement must not create another
    pub fn offers_created(&self) -> usize {
        self.inner.offers_created.load(Ordering::SeqCst)
    }

    /// Answers created so far
    pub fn answers_created(&self) -> usize {
        self.inner.answers_created.load(Ordering::SeqCst)
    }

    /// Successful track replacements
    pub fn replacements(&self) -> usize {
        self.inner.replacements.load(Ordering::SeqCst)
    }

    /// Remote candidates applied, in order
    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.inner.negotiation.lock().remote_candidates.clone()
    }

    /// Local description applied
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.inner.negotiation.lock().local.clone()
    }

    /// Remote description applied
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.negotiation.lock().remote.clone()
    }

    /// ICE configuration the connection was created with
    pub fn rtc_configuration(&self) -> RtcConfiguration {
        self.inner.rtc.clone()
    }

    /// Make subsequent `replace_track` calls fail
    pub fn fail_track_replacement(&self, fail: bool) {
        self.inner.fail_replace.store(fail, Ordering::SeqCst);
    }

    /// Make only the next `replace_track` call fail
    pub fn fail_next_replacement(&self) {
        self.inner.fail_next_replace.store(true, Ordering::SeqCst);
    }

    /// Make subsequent offer/answer creation fail
    pub fn fail_negotiation(&self, fail: bool) {
        self.inner.fail_negotiation.store(fail, Ordering::SeqCst);
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn describe(&self, kind: SdpKind) -> SessionDescription {
        let session: u64 = rand::thread_rng().gen();
        let senders = self.inner.senders.lock();
        let stream_id = senders
            .first()
            .map(|s| s.stream_id.clone())
            .unwrap_or_else(|| "-".to_string());

        let mut sdp = format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=telecall\r\na=msid-semantic:{}\r\n",
            session, stream_id
        );
        for slot in senders.iter() {
            sdp.push_str(&format!(
                "m={} {} {}\r\n",
                slot.track.kind(),
                slot.track.id(),
                slot.track.label()
            ));
        }
        SessionDescription { kind, sdp }
    }

    fn gather_host_candidates(&self) {
        let candidates: Vec<IceCandidate> = {
            let mut rng = rand::thread_rng();
            (0..self.inner.config.candidates_per_description)
                .map(|i| {
                    let port: u16 = rng.gen_range(49152..65535);
                    IceCandidate::new(format!(
                        "candidate:{} 1 udp {} 192.168.1.{} {} typ host",
                        i + 1,
                        2_130_706_431u32 - i as u32,
                        rng.gen_range(2..250),
                        port
                    ))
                })
                .collect()
        };
        for candidate in candidates {
            self.gather_candidate(candidate);
        }
    }

    fn maybe_schedule_connect(&self) {
        let Some(delay) = self.inner.config.auto_connect else {
            return;
        };
        let remote_sdp = {
            let negotiation = self.inner.negotiation.lock();
            match (&negotiation.local, &negotiation.remote) {
                (Some(_), Some(remote)) => remote.sdp.clone(),
                _ => return,
            }
        };
        if self.inner.connect_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        let conn = self.clone();
        tokio::spawn(async move {
            conn.report_state(TransportState::Connecting);
            tokio::time::sleep(delay).await;
            if conn.is_closed() {
                return;
            }
            conn.report_state(TransportState::Connected);
            for (track, stream_id) in remote_tracks_from_sdp(&remote_sdp) {
                conn.deliver_remote_track(track, stream_id);
            }
        });
    }
}

/// One playback track per `m=` line of a simulated SDP
fn remote_tracks_from_sdp(sdp: &str) -> Vec<(MediaTrack, String)> {
    let stream_id = sdp
        .lines()
        .find_map(|l| l.strip_prefix("a=msid-semantic:"))
        .unwrap_or("remote")
        .trim()
        .to_string();

    sdp.lines()
        .filter_map(|line| line.strip_prefix("m="))
        .filter_map(|media| {
            let mut parts = media.splitn(3, ' ');
            let kind: TrackKind = parts.next()?.parse().ok()?;
            let _track_id = parts.next()?;
            let label = parts.next().unwrap_or_default().trim();
            let track = MediaTrack::new(kind, TrackSource::Remote, format!("remote {}", label));
            Some((track, stream_id.clone()))
        })
        .collect()
}

#[async_trait]
impl PeerConnectionBackend for SimulatedPeerConnection {
    fn add_track(&self, track: &MediaTrack, stream_id: &str) -> CallResult<SenderId> {
        if self.is_closed() {
            return Err(CallError::InvalidState {
                expected: "open connection".to_string(),
                actual: "closed".to_string(),
            });
        }
        let mut senders = self.inner.senders.lock();
        senders.push(SenderSlot {
            track: track.clone(),
            stream_id: stream_id.to_string(),
        });
        Ok(SenderId(senders.len() as u32 - 1))
    }

    fn sender_track(&self, sender: SenderId) -> Option<MediaTrack> {
        self.inner
            .senders
            .lock()
            .get(sender.0 as usize)
            .map(|s| s.track.clone())
    }

    async fn replace_track(&self, sender: SenderId, track: MediaTrack) -> CallResult<()> {
        if self.inner.fail_replace.load(Ordering::SeqCst)
            || self.inner.fail_next_replace.swap(false, Ordering::SeqCst)
        {
            return Err(CallError::negotiation("simulated replaceTrack failure"));
        }
        let mut senders = self.inner.senders.lock();
        let slot = senders
            .get_mut(sender.0 as usize)
            .ok_or_else(|| CallError::negotiation(format!("unknown sender {:?}", sender)))?;
        if slot.track.kind() != track.kind() {
            return Err(CallError::negotiation("replacement track kind mismatch"));
        }
        debug!("Simulated sender {:?} now carries {}", sender, track.label());
        slot.track = track;
        self.inner.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_offer(&self) -> CallResult<SessionDescription> {
        if self.inner.fail_negotiation.load(Ordering::SeqCst) {
            return Err(CallError::negotiation("simulated createOffer failure"));
        }
        self.inner.offers_created.fetch_add(1, Ordering::SeqCst);
        Ok(self.describe(SdpKind::Offer))
    }

    async fn create_answer(&self) -> CallResult<SessionDescription> {
        if self.inner.fail_negotiation.load(Ordering::SeqCst) {
            return Err(CallError::negotiation("simulated createAnswer failure"));
        }
        if self.inner.negotiation.lock().remote.is_none() {
            return Err(CallError::negotiation("no remote offer to answer"));
        }
        self.inner.answers_created.fetch_add(1, Ordering::SeqCst);
        Ok(self.describe(SdpKind::Answer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> CallResult<()> {
        self.inner.negotiation.lock().local = Some(description);
        self.gather_host_candidates();
        self.maybe_schedule_connect();
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> CallResult<()> {
        if !description.sdp.starts_with("v=0") {
            return Err(CallError::negotiation("malformed remote description"));
        }
        self.inner.negotiation.lock().remote = Some(description);
        self.maybe_schedule_connect();
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> CallResult<()> {
        if let Some(latency) = self.inner.config.candidate_latency {
            tokio::time::sleep(latency).await;
        }
        let mut negotiation = self.inner.negotiation.lock();
        if negotiation.remote.is_none() {
            return Err(CallError::negotiation(
                "candidate added before the remote description",
            ));
        }
        negotiation.remote_candidates.push(candidate);
        Ok(())
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.report_state(TransportState::Closed);
        }
    }
}

/// Factory for [`SimulatedPeerConnection`]s that remembers what it created
#[derive(Debug, Clone, Default)]
pub struct SimulatedPeerFactory {
    config: SimulatedPeerConfig,
    created: Arc<Mutex<Vec<SimulatedPeerConnection>>>,
}

impl SimulatedPeerFactory {
    /// Create a factory with the given behaviour
    pub fn new(config: SimulatedPeerConfig) -> Self {
        Self {
            config,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Most recently created connection
    pub fn last_connection(&self) -> Option<SimulatedPeerConnection> {
        self.created.lock().last().cloned()
    }

    /// How many connections were created
    pub fn connections_created(&self) -> usize {
        self.created.lock().len()
    }
}

impl PeerConnectionFactory for SimulatedPeerFactory {
    fn create(
        &self,
        config: &RtcConfiguration,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> CallResult<Arc<dyn PeerConnectionBackend>> {
        let conn = SimulatedPeerConnection {
            inner: Arc::new(ConnectionInner {
                config: self.config.clone(),
                rtc: config.clone(),
                events,
                senders: Mutex::new(Vec::new()),
                negotiation: Mutex::new(Negotiation::default()),
                offers_created: AtomicUsize::new(0),
                answers_created: AtomicUsize::new(0),
                replacements: AtomicUsize::new(0),
                fail_replace: AtomicBool::new(false),
                fail_next_replace: AtomicBool::new(false),
                fail_negotiation: AtomicBool::new(false),
                connect_scheduled: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        };
        let _ = conn.inner.events.send(TransportEvent::StateChanged(TransportState::New));
        self.created.lock().push(conn.clone());
        Ok(Arc::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_tracks_from_sdp() {
        let sdp = "v=0\r\na=msid-semantic:abc\r\nm=audio t1 Built-in Mic\r\nm=video t2 Front Camera\r\n";
        let tracks = remote_tracks_from_sdp(sdp);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].0.kind(), TrackKind::Audio);
        assert_eq!(tracks[1].0.label(), "remote Front Camera");
        assert_eq!(tracks[1].1, "abc");
        assert_eq!(tracks[1].0.source(), TrackSource::Remote);
    }
}
