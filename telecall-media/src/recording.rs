//! Session recording
//!
//! A [`Recorder`] captures the local stream in timestamped slices on a background task.
//! It holds the stream object itself, so tracks swapped in place (camera switch, screen
//! share) keep feeding the same recording and the chunk sequence stays contiguous.

use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telecall_core::MediaStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Interval between captured chunks
    pub timeslice: Duration,
    /// Encoder MIME type
    pub mime_type: String,
    /// MIME type of the assembled artifact
    pub artifact_mime_type: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeslice: Duration::from_secs(1),
            mime_type: "video/webm;codecs=vp9".to_string(),
            artifact_mime_type: "video/webm".to_string(),
        }
    }
}

impl RecordingConfig {
    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.timeslice.is_zero() {
            return Err(MediaError::InvalidConfiguration {
                message: "recording timeslice must be > 0".to_string(),
            });
        }
        if self.mime_type.is_empty() || self.artifact_mime_type.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "recording MIME types must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// One captured slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedChunk {
    /// Position in the recording, starting at 0 without gaps
    pub sequence: u64,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
    /// Encoded media
    pub data: Bytes,
}

/// A finished recording
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    /// MIME type of `data`
    pub mime_type: String,
    /// All chunks concatenated
    pub data: Bytes,
    /// Chunks in capture order
    pub chunks: Vec<RecordedChunk>,
    /// When recording started
    pub started_at: DateTime<Utc>,
    /// When the final chunk was flushed
    pub finished_at: DateTime<Utc>,
}

impl RecordingArtifact {
    /// Recording length
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Size of the assembled blob
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Recorder notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    /// Capture started
    Started,
    /// A chunk was captured
    ChunkCaptured {
        /// Chunk sequence number
        sequence: u64,
        /// Chunk size in bytes
        size: usize,
    },
    /// Capture finished and the artifact was assembled
    Stopped {
        /// Number of chunks in the artifact
        chunks: usize,
    },
    /// Capture failed; the recorder has stopped
    Failed(String),
}

/// Platform encoder (`MediaRecorder` or equivalent)
#[async_trait]
pub trait RecorderBackend: Send + Sync {
    /// Whether the encoder can produce `mime_type`
    fn supports(&self, mime_type: &str) -> bool;

    /// Encode `slice` worth of the stream's current tracks
    async fn capture_slice(&self, stream: &MediaStream, slice: Duration) -> MediaResult<Bytes>;
}

type CaptureOutcome = MediaResult<Vec<RecordedChunk>>;

struct ActiveRecording {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<CaptureOutcome>,
    started_at: DateTime<Utc>,
}

/// Records one stream at a time
pub struct Recorder {
    backend: Arc<dyn RecorderBackend>,
    config: RecordingConfig,
    active: Mutex<Option<ActiveRecording>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("recording", &self.is_recording())
            .finish()
    }
}

impl Recorder {
    /// Create an idle recorder
    pub fn new(backend: Arc<dyn RecorderBackend>, config: RecordingConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            backend,
            config,
            active: Mutex::new(None),
            event_tx,
        }
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Recorder settings
    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Whether capture is running. False after a failure, even before `stop`.
    pub fn is_recording(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }

    /// Start capturing `stream`
    pub fn start(&self, stream: MediaStream) -> MediaResult<()> {
        self.config.validate()?;
        if !self.backend.supports(&self.config.mime_type) {
            return Err(MediaError::Recording {
                reason: format!("unsupported MIME type {}", self.config.mime_type),
            });
        }
        if stream.is_empty() {
            return Err(MediaError::InvalidState {
                expected: "a stream with tracks".to_string(),
                actual: "empty stream".to_string(),
            });
        }

        let mut active = self.active.lock();
        if active.is_some() {
            return Err(MediaError::InvalidState {
                expected: "not recording".to_string(),
                actual: "recording".to_string(),
            });
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(capture_loop(
            self.backend.clone(),
            stream,
            self.config.timeslice,
            stop_rx,
            self.event_tx.clone(),
        ));

        info!(
            "⏺️ Recording started ({}, {:?} slices)",
            self.config.mime_type, self.config.timeslice
        );
        *active = Some(ActiveRecording {
            stop_tx,
            task,
            started_at: Utc::now(),
        });
        let _ = self.event_tx.send(RecordingEvent::Started);
        Ok(())
    }

    /// Stop capturing and wait for the final flush. `None` when not recording or when
    /// capture failed (the failure was already reported).
    pub async fn stop(&self) -> Option<RecordingArtifact> {
        let active = self.active.lock().take()?;
        let _ = active.stop_tx.send(());

        let chunks = match active.task.await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                debug!("Recording had failed earlier: {}", e);
                return None;
            }
            Err(e) => {
                warn!("Recording task ended abnormally: {}", e);
                return None;
            }
        };

        let mut data = BytesMut::new();
        for chunk in &chunks {
            data.extend_from_slice(&chunk.data);
        }
        let artifact = RecordingArtifact {
            mime_type: self.config.artifact_mime_type.clone(),
            data: data.freeze(),
            chunks,
            started_at: active.started_at,
            finished_at: Utc::now(),
        };

        info!(
            "⏹️ Recording stopped: {} chunk(s), {} bytes",
            artifact.chunks.len(),
            artifact.size()
        );
        let _ = self.event_tx.send(RecordingEvent::Stopped {
            chunks: artifact.chunks.len(),
        });
        Some(artifact)
    }

    /// Stop capturing and discard everything. Idempotent.
    pub fn abort(&self) {
        if let Some(active) = self.active.lock().take() {
            active.task.abort();
            info!("Recording aborted");
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}

async fn capture_loop(
    backend: Arc<dyn RecorderBackend>,
    stream: MediaStream,
    timeslice: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    events: broadcast::Sender<RecordingEvent>,
) -> CaptureOutcome {
    let mut chunks = Vec::new();
    let mut ticker = tokio::time::interval_at(Instant::now() + timeslice, timeslice);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_slice = Instant::now();

    loop {
        let stopping = tokio::select! {
            _ = ticker.tick() => false,
            _ = &mut stop_rx => true,
        };

        let slice = last_slice.elapsed();
        last_slice = Instant::now();
        match backend.capture_slice(&stream, slice).await {
            Ok(data) if data.is_empty() => debug!("Skipping empty recording slice"),
            Ok(data) => {
                let sequence = chunks.len() as u64;
                let _ = events.send(RecordingEvent::ChunkCaptured {
                    sequence,
                    size: data.len(),
                });
                chunks.push(RecordedChunk {
                    sequence,
                    captured_at: Utc::now(),
                    data,
                });
            }
            Err(e) => {
                error!("❌ Recording failed: {}", e);
                let _ = events.send(RecordingEvent::Failed(e.to_string()));
                return Err(e);
            }
        }

        if stopping {
            return Ok(chunks);
        }
    }
}

/// Encoder stand-in that writes a text line per slice describing the live tracks
#[derive(Debug, Default)]
pub struct SimulatedRecorder {
    captures: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
}

impl SimulatedRecorder {
    /// Create a recorder backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th capture (0-based, counted from creation)
    pub fn fail_at_capture(&self, n: usize) {
        *self.fail_at.lock() = Some(n);
    }

    /// Slices captured so far
    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecorderBackend for SimulatedRecorder {
    fn supports(&self, mime_type: &str) -> bool {
        mime_type.starts_with("video/webm")
    }

    async fn capture_slice(&self, stream: &MediaStream, slice: Duration) -> MediaResult<Bytes> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        if *self.fail_at.lock() == Some(n) {
            return Err(MediaError::Recording {
                reason: format!("encoder error on slice {}", n),
            });
        }

        let tracks: Vec<String> = stream
            .tracks()
            .iter()
            .filter(|t| t.is_live())
            .map(|t| {
                format!(
                    "{}:{}{}",
                    t.kind(),
                    t.label(),
                    if t.is_enabled() { "" } else { " (muted)" }
                )
            })
            .collect();
        if tracks.is_empty() {
            return Ok(Bytes::new());
        }
        Ok(Bytes::from(format!(
            "[{}ms] {}\n",
            slice.as_millis(),
            tracks.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecall_core::{MediaTrack, TrackKind, TrackSource};

    fn stream() -> MediaStream {
        MediaStream::new(vec![
            MediaTrack::new(TrackKind::Video, TrackSource::Camera, "Front"),
            MediaTrack::new(TrackKind::Audio, TrackSource::Microphone, "Mic"),
        ])
    }

    #[test]
    fn test_default_config() {
        let config = RecordingConfig::default();
        assert_eq!(config.timeslice, Duration::from_secs(1));
        assert_eq!(config.mime_type, "video/webm;codecs=vp9");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_none() {
        let recorder = Recorder::new(Arc::new(SimulatedRecorder::new()), RecordingConfig::default());
        assert!(recorder.stop().await.is_none());
        recorder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_every_timeslice_plus_final_flush() {
        let recorder = Recorder::new(Arc::new(SimulatedRecorder::new()), RecordingConfig::default());
        recorder.start(stream()).unwrap();
        assert!(recorder.is_recording());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let artifact = recorder.stop().await.unwrap();

        assert_eq!(artifact.chunks.len(), 4);
        let sequences: Vec<u64> = artifact.chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
        assert_eq!(artifact.mime_type, "video/webm");
        assert!(!recorder.is_recording());
    }

    #[tokio::test]
    async fn test_unsupported_mime_rejected() {
        let config = RecordingConfig {
            mime_type: "video/mp4".to_string(),
            ..RecordingConfig::default()
        };
        let recorder = Recorder::new(Arc::new(SimulatedRecorder::new()), config);
        assert!(matches!(
            recorder.start(stream()),
            Err(MediaError::Recording { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reported_once_and_stop_yields_none() {
        let backend = Arc::new(SimulatedRecorder::new());
        backend.fail_at_capture(1);
        let recorder = Recorder::new(backend, RecordingConfig::default());
        let mut events = recorder.subscribe();

        recorder.start(stream()).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let mut failures = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RecordingEvent::Failed(_)) {
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
        assert!(!recorder.is_recording());
        assert!(recorder.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let recorder = Recorder::new(Arc::new(SimulatedRecorder::new()), RecordingConfig::default());
        recorder.start(stream()).unwrap();
        assert!(matches!(
            recorder.start(stream()),
            Err(MediaError::InvalidState { .. })
        ));
        recorder.abort();
        assert!(!recorder.is_recording());
    }
}
