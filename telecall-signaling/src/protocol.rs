//! Signaling protocol messages
//!
//! On the wire a message is a JSON object:
//! `{"sessionId": "...", "kind": "offer" | "answer" | "ice_candidate", "payload": {...}}`.

use crate::error::SignalingResult;
use serde::{Deserialize, Serialize};
use telecall_core::{IceCandidate, SessionDescription};

/// Body of a signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum SignalingPayload {
    /// Session offer from the initiator
    Offer(SessionDescription),
    /// Answer from the responder
    Answer(SessionDescription),
    /// Trickled ICE candidate
    IceCandidate(IceCandidate),
}

/// Signaling message for one call session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingMessage {
    /// Session the message belongs to
    pub session_id: String,
    /// Message body
    #[serde(flatten)]
    pub payload: SignalingPayload,
}

impl SignalingMessage {
    /// Offer message
    pub fn offer(session_id: impl Into<String>, offer: SessionDescription) -> Self {
        Self {
            session_id: session_id.into(),
            payload: SignalingPayload::Offer(offer),
        }
    }

    /// Answer message
    pub fn answer(session_id: impl Into<String>, answer: SessionDescription) -> Self {
        Self {
            session_id: session_id.into(),
            payload: SignalingPayload::Answer(answer),
        }
    }

    /// ICE candidate message
    pub fn ice_candidate(session_id: impl Into<String>, candidate: IceCandidate) -> Self {
        Self {
            session_id: session_id.into(),
            payload: SignalingPayload::IceCandidate(candidate),
        }
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self.payload {
            SignalingPayload::Offer(_) => "offer",
            SignalingPayload::Answer(_) => "answer",
            SignalingPayload::IceCandidate(_) => "ice_candidate",
        }
    }

    /// Encode as JSON
    pub fn to_json(&self) -> SignalingResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    pub fn from_json(json: &str) -> SignalingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_format() {
        let message = SignalingMessage::offer("visit-42", SessionDescription::offer("v=0"));
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(value["sessionId"], "visit-42");
        assert_eq!(value["kind"], "offer");
        assert_eq!(value["payload"]["kind"], "offer");
        assert_eq!(value["payload"]["sdp"], "v=0");
    }

    #[test]
    fn test_candidate_from_json() {
        let json = r#"{
            "sessionId": "visit-42",
            "kind": "ice_candidate",
            "payload": {"candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host", "sdpMid": "0", "sdpMLineIndex": 0}
        }"#;
        let message = SignalingMessage::from_json(json).unwrap();
        assert_eq!(message.kind(), "ice_candidate");
        match message.payload {
            SignalingPayload::IceCandidate(candidate) => {
                assert_eq!(candidate.sdp_m_line_index, Some(0));
            }
            _ => panic!("Expected IceCandidate payload"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = r#"{"sessionId": "s", "kind": "bye", "payload": {}}"#;
        assert!(SignalingMessage::from_json(json).is_err());
    }
}
