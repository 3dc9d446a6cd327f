//! Session events for the UI layer

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use telecall_core::{ConnectionState, MediaTrack};
use tokio::sync::mpsc;

/// Something the UI should react to
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection state changed
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
    /// Local camera/microphone are live
    LocalMediaReady {
        /// Number of local tracks
        tracks: usize,
    },
    /// A track from the remote participant joined the remote stream
    RemoteTrackAdded {
        /// The incoming track
        track: MediaTrack,
    },
    /// The camera inventory was refreshed
    DevicesChanged {
        /// Cameras now available
        cameras: usize,
    },
    /// The outgoing camera changed
    CameraSwitched {
        /// New camera
        device_id: String,
        /// Camera label
        label: String,
    },
    /// The screen replaced the camera
    ScreenShareStarted {
        /// Display label
        label: String,
    },
    /// The camera is back
    ScreenShareStopped {
        /// Sharing was ended from the browser or OS rather than through the session
        by_platform: bool,
    },
    /// Recording began
    RecordingStarted,
    /// Recording finished with an artifact
    RecordingStopped {
        /// Chunks in the artifact
        chunks: usize,
        /// Artifact size in bytes
        size: usize,
    },
    /// An error was surfaced
    Error {
        /// Error message
        message: String,
        /// Whether the call continues
        recoverable: bool,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::LocalMediaReady { .. } => "local_media_ready",
            SessionEvent::RemoteTrackAdded { .. } => "remote_track_added",
            SessionEvent::DevicesChanged { .. } => "devices_changed",
            SessionEvent::CameraSwitched { .. } => "camera_switched",
            SessionEvent::ScreenShareStarted { .. } => "screen_share_started",
            SessionEvent::ScreenShareStopped { .. } => "screen_share_stopped",
            SessionEvent::RecordingStarted => "recording_started",
            SessionEvent::RecordingStopped { .. } => "recording_stopped",
            SessionEvent::Error { .. } => "error",
        }
    }

    /// Check if this is a connection event
    pub fn is_connection_event(&self) -> bool {
        matches!(self, SessionEvent::StateChanged { .. })
    }

    /// Check if this is a media/track event
    pub fn is_media_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::LocalMediaReady { .. }
                | SessionEvent::RemoteTrackAdded { .. }
                | SessionEvent::DevicesChanged { .. }
                | SessionEvent::CameraSwitched { .. }
                | SessionEvent::ScreenShareStarted { .. }
                | SessionEvent::ScreenShareStopped { .. }
        )
    }

    /// Check if this is a recording event
    pub fn is_recording_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::RecordingStarted | SessionEvent::RecordingStopped { .. }
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, SessionEvent::Error { .. })
    }
}

/// Stream of session events
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Only yield events accepted by `filter`
    pub fn filtered(self, filter: EventFilter) -> FilteredEventStream {
        FilteredEventStream {
            stream: self,
            filter,
        }
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Event filter for selective event processing
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Whether to include connection events
    pub include_connection_events: bool,
    /// Whether to include media/track events
    pub include_media_events: bool,
    /// Whether to include recording events
    pub include_recording_events: bool,
    /// Whether to include error events
    pub include_error_events: bool,
    /// Specific event types to include (if specified, overrides other filters)
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self {
            include_connection_events: true,
            include_media_events: true,
            include_recording_events: true,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// State changes and errors: what a call status banner needs
    pub fn status_only() -> Self {
        Self {
            include_connection_events: true,
            include_media_events: false,
            include_recording_events: false,
            include_error_events: true,
            specific_event_types: None,
        }
    }

    /// Create a filter for specific event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            include_connection_events: false,
            include_media_events: false,
            include_recording_events: false,
            include_error_events: false,
            specific_event_types: Some(event_types),
        }
    }

    /// Check if an event should be included based on this filter
    pub fn should_include(&self, event: &SessionEvent) -> bool {
        if let Some(ref specific_types) = self.specific_event_types {
            return specific_types.iter().any(|t| t == event.event_type());
        }

        (self.include_connection_events && event.is_connection_event())
            || (self.include_media_events && event.is_media_event())
            || (self.include_recording_events && event.is_recording_event())
            || (self.include_error_events && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Event stream that only yields events matching a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Get the next event that matches the filter
    pub async fn next(&mut self) -> Option<SessionEvent> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Get the current filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn state_changed() -> SessionEvent {
        SessionEvent::StateChanged {
            from: ConnectionState::Idle,
            to: ConnectionState::Connecting,
        }
    }

    #[test]
    fn test_event_type_classification() {
        let connection_event = state_changed();
        assert!(connection_event.is_connection_event());
        assert!(!connection_event.is_media_event());

        let share_event = SessionEvent::ScreenShareStopped { by_platform: true };
        assert!(share_event.is_media_event());
        assert_eq!(share_event.event_type(), "screen_share_stopped");

        let error_event = SessionEvent::Error {
            message: "Recording failed: encoder stalled".to_string(),
            recoverable: true,
        };
        assert!(error_event.is_error_event());
        assert!(!error_event.is_recording_event());
    }

    #[test]
    fn test_event_filter() {
        let status = EventFilter::status_only();
        assert!(status.should_include(&state_changed()));
        assert!(!status.should_include(&SessionEvent::RecordingStarted));

        let specific = EventFilter::specific(vec!["recording_started".to_string()]);
        assert!(specific.should_include(&SessionEvent::RecordingStarted));
        assert!(!specific.should_include(&state_changed()));
    }

    #[tokio::test]
    async fn test_event_stream_as_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = EventStream::new(rx);

        tx.send(state_changed()).unwrap();
        tx.send(SessionEvent::RecordingStarted).unwrap();
        drop(tx);

        let types: Vec<_> = (&mut events).map(|e| e.event_type()).collect().await;
        assert_eq!(types, vec!["state_changed", "recording_started"]);
    }

    #[tokio::test]
    async fn test_filtered_event_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut filtered = EventStream::new(rx).filtered(EventFilter::status_only());

        tx.send(SessionEvent::RecordingStarted).unwrap();
        tx.send(state_changed()).unwrap();

        let event = filtered.next().await.unwrap();
        assert_eq!(event.event_type(), "state_changed");
        assert!(filtered.filter().include_error_events);
    }
}
