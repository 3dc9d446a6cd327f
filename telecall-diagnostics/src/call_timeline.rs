//! Call timeline and post-call report
//!
//! The session records every connection-state transition and notable media event here.
//! [`CallTimeline::report`] condenses the entries into the numbers support staff look at
//! first: how long the call took to connect, how often the camera was switched, how many
//! screen-share sessions ran and what failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use telecall_core::ConnectionState;

/// Something worth remembering about a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    /// Connection state changed
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
    /// Local media was acquired
    MediaAcquired {
        /// Number of local tracks
        tracks: usize,
    },
    /// Camera switched
    CameraSwitched {
        /// New camera
        device_id: String,
    },
    /// Screen share began
    ScreenShareStarted,
    /// Screen share ended
    ScreenShareStopped {
        /// Ended by the platform rather than the user
        by_platform: bool,
    },
    /// Recording began
    RecordingStarted,
    /// Recording finished
    RecordingStopped {
        /// Chunks in the artifact; `None` when nothing was produced
        chunks: Option<usize>,
    },
    /// An error was surfaced to the user
    Error {
        /// Error message
        message: String,
        /// Whether the call could continue
        recoverable: bool,
    },
}

/// One timeline entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Wall-clock time
    pub at: DateTime<Utc>,
    /// Time since the timeline started
    pub offset: Duration,
    /// What happened
    pub event: TimelineEvent,
}

/// Summary of one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReport {
    /// When the timeline started
    pub started_at: DateTime<Utc>,
    /// Time from the first `Connecting` to `Connected`
    pub time_to_connect: Option<Duration>,
    /// Last known connection state
    pub final_state: ConnectionState,
    /// Camera switches
    pub camera_switches: usize,
    /// Screen-share sessions started
    pub screen_shares: usize,
    /// Recordings started
    pub recordings: usize,
    /// Non-recoverable errors plus entries into a terminal state
    pub failures: usize,
    /// Recoverable errors
    pub warnings: usize,
}

impl CallReport {
    /// Encode as pretty JSON for support tickets
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Ordered log of call events
#[derive(Debug, Clone)]
pub struct CallTimeline {
    started: Instant,
    started_at: DateTime<Utc>,
    entries: Vec<TimelineEntry>,
}

impl Default for CallTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTimeline {
    /// Start an empty timeline now
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Append an event
    pub fn record(&mut self, event: TimelineEvent) {
        self.entries.push(TimelineEntry {
            at: Utc::now(),
            offset: self.started.elapsed(),
            event,
        });
    }

    /// Entries in the order they were recorded
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summarize the timeline
    pub fn report(&self) -> CallReport {
        let mut connecting_at = None;
        let mut time_to_connect = None;
        let mut final_state = ConnectionState::Idle;
        let mut report = CallReport {
            started_at: self.started_at,
            time_to_connect: None,
            final_state,
            camera_switches: 0,
            screen_shares: 0,
            recordings: 0,
            failures: 0,
            warnings: 0,
        };

        for entry in &self.entries {
            match &entry.event {
                TimelineEvent::StateChanged { to, .. } => {
                    final_state = *to;
                    match to {
                        ConnectionState::Connecting if connecting_at.is_none() => {
                            connecting_at = Some(entry.offset)
                        }
                        ConnectionState::Connected if time_to_connect.is_none() => {
                            time_to_connect = connecting_at.map(|start| entry.offset - start)
                        }
                        state if state.is_terminal() => report.failures += 1,
                        _ => {}
                    }
                }
                TimelineEvent::CameraSwitched { .. } => report.camera_switches += 1,
                TimelineEvent::ScreenShareStarted => report.screen_shares += 1,
                TimelineEvent::RecordingStarted => report.recordings += 1,
                TimelineEvent::Error { recoverable, .. } => {
                    if *recoverable {
                        report.warnings += 1;
                    } else {
                        report.failures += 1;
                    }
                }
                TimelineEvent::MediaAcquired { .. }
                | TimelineEvent::ScreenShareStopped { .. }
                | TimelineEvent::RecordingStopped { .. } => {}
            }
        }

        report.time_to_connect = time_to_connect;
        report.final_state = final_state;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(from: ConnectionState, to: ConnectionState) -> TimelineEvent {
        TimelineEvent::StateChanged { from, to }
    }

    #[test]
    fn test_report_counts_events() {
        let mut timeline = CallTimeline::new();
        timeline.record(state(ConnectionState::Idle, ConnectionState::Connecting));
        timeline.record(state(ConnectionState::Connecting, ConnectionState::Connected));
        timeline.record(TimelineEvent::CameraSwitched {
            device_id: "camera-2".to_string(),
        });
        timeline.record(TimelineEvent::ScreenShareStarted);
        timeline.record(TimelineEvent::ScreenShareStopped { by_platform: true });
        timeline.record(TimelineEvent::Error {
            message: "recording failed".to_string(),
            recoverable: true,
        });

        let report = timeline.report();
        assert!(report.time_to_connect.is_some());
        assert_eq!(report.final_state, ConnectionState::Connected);
        assert_eq!(report.camera_switches, 1);
        assert_eq!(report.screen_shares, 1);
        assert_eq!(report.warnings, 1);
        assert_eq!(report.failures, 0);
    }

    #[test]
    fn test_failed_call_has_no_connect_time() {
        let mut timeline = CallTimeline::new();
        timeline.record(state(ConnectionState::Idle, ConnectionState::Connecting));
        timeline.record(state(ConnectionState::Connecting, ConnectionState::Failed));

        let report = timeline.report();
        assert_eq!(report.time_to_connect, None);
        assert_eq!(report.failures, 1);
        assert_eq!(report.final_state, ConnectionState::Failed);
    }

    #[test]
    fn test_report_json() {
        let mut timeline = CallTimeline::new();
        timeline.record(TimelineEvent::RecordingStarted);
        let json = timeline.report().to_json().unwrap();
        assert!(json.contains("\"recordings\": 1"));
    }
}
