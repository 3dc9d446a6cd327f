//! Session descriptions, ICE candidates and NAT traversal configuration

use crate::error::{CallError, CallResult};
use serde::{Deserialize, Serialize};

/// Offer or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Session offer from the initiating side
    Offer,
    /// Answer from the responding side
    Answer,
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// A session description exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: SdpKind,
    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Fail unless this description is of the expected kind
    pub fn expect_kind(&self, expected: SdpKind) -> CallResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(CallError::negotiation(format!(
                "expected {} but received {}",
                expected, self.kind
            )))
        }
    }
}

/// One candidate network path offered during connection negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    pub sdp_mid: Option<String>,
    /// Index of the media description this candidate belongs to
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Create a candidate for the first media section
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }
}

/// A STUN or TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (`stun:host:port`, `turn:host:port?transport=udp`)
    pub urls: Vec<String>,
    /// TURN username
    #[serde(default)]
    pub username: Option<String>,
    /// TURN credential
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less STUN server
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// A TURN relay with credentials
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    fn is_stun(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("stun:") || u.starts_with("stuns:"))
    }
}

/// Peer connection configuration supplied at construction time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfiguration {
    /// STUN/TURN servers used for NAT traversal
    pub ice_servers: Vec<IceServer>,
}

impl Default for RtcConfiguration {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServer::stun("stun:stun.l.google.com:19302"),
                IceServer::stun("stun:stun1.l.google.com:19302"),
            ],
        }
    }
}

impl RtcConfiguration {
    /// Configuration with a single STUN server
    pub fn with_stun(url: impl Into<String>) -> Self {
        Self {
            ice_servers: vec![IceServer::stun(url)],
        }
    }

    /// Add a server to the list
    pub fn add_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Require at least one STUN server and well-formed TURN entries
    pub fn validate(&self) -> CallResult<()> {
        if !self.ice_servers.iter().any(IceServer::is_stun) {
            return Err(CallError::InvalidConfiguration {
                reason: "at least one STUN server is required".to_string(),
            });
        }

        for server in &self.ice_servers {
            if server.urls.is_empty() {
                return Err(CallError::InvalidConfiguration {
                    reason: "ICE server entry without URLs".to_string(),
                });
            }
            let is_turn = server
                .urls
                .iter()
                .any(|u| u.starts_with("turn:") || u.starts_with("turns:"));
            if is_turn && (server.username.is_none() || server.credential.is_none()) {
                return Err(CallError::InvalidConfiguration {
                    reason: format!("TURN server {:?} requires credentials", server.urls),
                });
            }
        }

        Ok(())
    }
}
