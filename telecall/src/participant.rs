//! Participant roles

use serde::{Deserialize, Serialize};

/// Which side of the offer/answer exchange this participant plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates the offer
    Initiator,
    /// Waits for the offer and answers it
    Responder,
}

impl Role {
    /// The clinician places the call, the patient answers
    pub fn from_is_doctor(is_doctor: bool) -> Self {
        if is_doctor {
            Role::Initiator
        } else {
            Role::Responder
        }
    }

    /// Whether this side sends the offer
    pub fn is_initiator(&self) -> bool {
        matches!(self, Role::Initiator)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctor_initiates() {
        assert_eq!(Role::from_is_doctor(true), Role::Initiator);
        assert_eq!(Role::from_is_doctor(false), Role::Responder);
        assert!(!Role::Responder.is_initiator());
        assert_eq!(serde_json::to_string(&Role::Initiator).unwrap(), "\"initiator\"");
    }
}
