//! Live media tracks and streams
//!
//! A [`MediaTrack`] is a shared handle: every clone refers to the same underlying
//! track, so flipping `enabled` through one clone is visible through all of them.
//! A [`MediaStream`] is likewise shared and mutable; replacing a track in it is
//! observed by everyone holding the stream (controller, peer manager, recorder).

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Track kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(TrackKind::Audio),
            "video" => Ok(TrackKind::Video),
            other => Err(format!("unknown track kind '{}'", other)),
        }
    }
}

/// Where a track's media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrackSource {
    /// Camera/webcam video
    Camera,
    /// Microphone audio
    Microphone,
    /// Screen or window capture
    Screen,
    /// Media received from the remote peer
    Remote,
}

impl std::fmt::Display for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackSource::Camera => write!(f, "camera"),
            TrackSource::Microphone => write!(f, "microphone"),
            TrackSource::Screen => write!(f, "screen"),
            TrackSource::Remote => write!(f, "remote"),
        }
    }
}

/// How a track came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `stop()` was called by this process
    Stopped,
    /// The platform ended it (device unplugged, user revoked sharing)
    Platform,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    device_id: Option<String>,
    enabled: AtomicBool,
    end_tx: watch::Sender<Option<EndReason>>,
}

/// Shared handle to a single live audio or video track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a new live, enabled track
    pub fn new(kind: TrackKind, source: TrackSource, label: impl Into<String>) -> Self {
        Self::build(kind, source, label.into(), None)
    }

    /// Create a new live track bound to a capture device
    pub fn with_device(
        kind: TrackKind,
        source: TrackSource,
        label: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self::build(kind, source, label.into(), Some(device_id.into()))
    }

    fn build(kind: TrackKind, source: TrackSource, label: String, device_id: Option<String>) -> Self {
        let (end_tx, _) = watch::channel(None);
        let id = Uuid::new_v4().to_string();
        debug!("Creating {} track {} ({}: {})", kind, id, source, label);
        Self {
            inner: Arc::new(TrackInner {
                id,
                kind,
                source,
                label,
                device_id,
                enabled: AtomicBool::new(true),
                end_tx,
            }),
        }
    }

    /// Get track ID
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get track kind
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Get track source
    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    /// Human readable label, e.g. the camera name
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Capture device backing this track, if any
    pub fn device_id(&self) -> Option<&str> {
        self.inner.device_id.as_deref()
    }

    /// Whether the track currently carries media (false = muted/blank)
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Set the enabled flag; the track stays attached either way
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            debug!("Track {} enabled: {} -> {}", self.inner.id, previous, enabled);
        }
    }

    /// Whether the track is still live
    pub fn is_live(&self) -> bool {
        self.inner.end_tx.borrow().is_none()
    }

    /// Why the track ended, if it has
    pub fn end_reason(&self) -> Option<EndReason> {
        *self.inner.end_tx.borrow()
    }

    /// Stop the track and release its device. Returns false if it had already ended.
    pub fn stop(&self) -> bool {
        self.finish(EndReason::Stopped)
    }

    /// Mark the track as ended by the platform (e.g. the user stopped sharing from the
    /// browser or OS chrome). Capture backends call this; application code calls `stop`.
    pub fn end_from_platform(&self) -> bool {
        self.finish(EndReason::Platform)
    }

    fn finish(&self, reason: EndReason) -> bool {
        let changed = self.inner.end_tx.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(reason);
                true
            } else {
                false
            }
        });
        if changed {
            info!("⏹️ {} track {} ended ({:?})", self.inner.kind, self.inner.id, reason);
        }
        changed
    }

    /// Wait until the track ends and report why
    pub async fn ended(&self) -> EndReason {
        let mut rx = self.inner.end_tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Sender lives inside `inner`, which we hold; unreachable in practice.
                return EndReason::Stopped;
            }
        }
    }

    /// Whether two handles refer to the same track
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

impl Eq for MediaTrack {}

/// Shared, mutable set of tracks with a stable identity
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Arc<str>,
    tracks: Arc<RwLock<Vec<MediaTrack>>>,
}

impl MediaStream {
    /// Create a stream with a fresh ID
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), tracks)
    }

    /// Create a stream with a known ID (e.g. announced by the remote peer)
    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        let id: String = id.into();
        Self {
            id: Arc::from(id.as_str()),
            tracks: Arc::new(RwLock::new(tracks)),
        }
    }

    /// Get stream ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of all tracks in insertion order
    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.read().clone()
    }

    /// Snapshot of the tracks of one kind
    pub fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.tracks
            .read()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// First video track
    pub fn video_track(&self) -> Option<MediaTrack> {
        self.first_of(TrackKind::Video)
    }

    /// First audio track
    pub fn audio_track(&self) -> Option<MediaTrack> {
        self.first_of(TrackKind::Audio)
    }

    fn first_of(&self, kind: TrackKind) -> Option<MediaTrack> {
        self.tracks.read().iter().find(|t| t.kind() == kind).cloned()
    }

    /// Add a track; adding a track that is already present is a no-op
    pub fn add_track(&self, track: MediaTrack) {
        let mut tracks = self.tracks.write();
        if !tracks.iter().any(|t| t.same_track(&track)) {
            tracks.push(track);
        }
    }

    /// Remove a track by ID
    pub fn remove_track(&self, track_id: &str) -> Option<MediaTrack> {
        let mut tracks = self.tracks.write();
        let pos = tracks.iter().position(|t| t.id() == track_id)?;
        Some(tracks.remove(pos))
    }

    /// Swap the first track of the new track's kind in place, keeping its position.
    /// Returns the replaced track (not stopped). When no track of that kind exists the
    /// new track is appended.
    pub fn replace_track(&self, track: MediaTrack) -> Option<MediaTrack> {
        let mut tracks = self.tracks.write();
        match tracks.iter().position(|t| t.kind() == track.kind()) {
            Some(pos) => Some(std::mem::replace(&mut tracks[pos], track)),
            None => {
                tracks.push(track);
                None
            }
        }
    }

    /// Whether the stream holds the given track
    pub fn contains(&self, track: &MediaTrack) -> bool {
        self.tracks.read().iter().any(|t| t.same_track(track))
    }

    /// Stop every track; returns how many were still live
    pub fn stop_all(&self) -> usize {
        self.tracks.read().iter().filter(|t| t.stop()).count()
    }

    /// Whether the stream has no tracks
    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    /// Whether two handles refer to the same stream object
    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.tracks, &other.tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(label: &str) -> MediaTrack {
        MediaTrack::with_device(TrackKind::Video, TrackSource::Camera, label, label)
    }

    #[test]
    fn test_track_clones_share_enabled_flag() {
        let track = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, "mic");
        let clone = track.clone();
        clone.set_enabled(false);
        assert!(!track.is_enabled());
        assert_eq!(track, clone);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let track = camera("front");
        assert!(track.stop());
        assert!(!track.stop());
        assert!(!track.end_from_platform());
        assert_eq!(track.end_reason(), Some(EndReason::Stopped));
    }

    #[tokio::test]
    async fn test_ended_reports_platform_end() {
        let track = MediaTrack::new(TrackKind::Video, TrackSource::Screen, "display");
        let waiter = {
            let track = track.clone();
            tokio::spawn(async move { track.ended().await })
        };
        tokio::task::yield_now().await;
        track.end_from_platform();
        assert_eq!(waiter.await.unwrap(), EndReason::Platform);
        assert!(!track.is_live());
    }

    #[test]
    fn test_replace_track_keeps_position_and_identity() {
        let mic = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, "mic");
        let front = camera("front");
        let stream = MediaStream::new(vec![front.clone(), mic.clone()]);
        let holder = stream.clone();

        let back = camera("back");
        let old = stream.replace_track(back.clone()).unwrap();

        assert_eq!(old, front);
        assert_eq!(holder.tracks(), vec![back.clone(), mic]);
        assert_eq!(holder.video_track(), Some(back));
        assert!(holder.same_stream(&stream));
    }

    #[test]
    fn test_add_track_ignores_duplicates() {
        let stream = MediaStream::new(vec![]);
        let track = camera("front");
        stream.add_track(track.clone());
        stream.add_track(track.clone());
        assert_eq!(stream.tracks().len(), 1);
        assert!(stream.remove_track(track.id()).is_some());
        assert!(stream.is_empty());
    }
}
