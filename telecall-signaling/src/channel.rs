//! Signaling channel abstraction and an in-memory loopback
//!
//! The real transport (WebSocket, HTTP long-poll, a messaging backend) lives outside
//! this workspace and plugs in through [`SignalingChannel`].

use crate::error::{SignalingError, SignalingResult};
use crate::protocol::SignalingMessage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Carries signaling messages to and from the remote participant
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send a message to the remote participant
    async fn send(&self, message: SignalingMessage) -> SignalingResult<()>;

    /// Receive messages from the remote participant. Each call creates a new
    /// subscription; messages arriving earlier are not replayed.
    fn subscribe(&self) -> SignalingResult<mpsc::UnboundedReceiver<SignalingMessage>>;
}

#[derive(Debug, Default)]
struct Endpoint {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SignalingMessage>>>,
    sent: Mutex<Vec<SignalingMessage>>,
    closed: AtomicBool,
}

impl Endpoint {
    fn deliver(&self, message: &SignalingMessage) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        subscribers.len()
    }
}

/// In-memory channel. Messages are encoded to JSON and decoded again on the way through.
#[derive(Debug, Clone)]
pub struct LoopbackSignaling {
    local: Arc<Endpoint>,
    remote: Option<Arc<Endpoint>>,
}

impl LoopbackSignaling {
    /// Two connected ends
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Endpoint::default());
        let b = Arc::new(Endpoint::default());
        (
            Self {
                local: a.clone(),
                remote: Some(b.clone()),
            },
            Self {
                local: b,
                remote: Some(a),
            },
        )
    }

    /// An end with nobody on the other side; sent messages are only recorded
    pub fn unconnected() -> Self {
        Self {
            local: Arc::new(Endpoint::default()),
            remote: None,
        }
    }

    /// Deliver a message to this end's subscribers as if the remote had sent it
    pub fn inject(&self, message: SignalingMessage) -> usize {
        self.local.deliver(&message)
    }

    /// Messages sent from this end, in order
    pub fn sent(&self) -> Vec<SignalingMessage> {
        self.local.sent.lock().clone()
    }

    /// Close this end; further sends fail
    pub fn close(&self) {
        if !self.local.closed.swap(true, Ordering::SeqCst) {
            info!("Loopback signaling closed");
            self.local.subscribers.lock().clear();
        }
    }
}

#[async_trait]
impl SignalingChannel for LoopbackSignaling {
    async fn send(&self, message: SignalingMessage) -> SignalingResult<()> {
        if self.local.closed.load(Ordering::SeqCst) {
            return Err(SignalingError::ChannelClosed);
        }
        let wire = message.to_json()?;
        let message = SignalingMessage::from_json(&wire)?;
        debug!("📨 {} for session {} ({} bytes)", message.kind(), message.session_id, wire.len());

        self.local.sent.lock().push(message.clone());
        if let Some(remote) = &self.remote {
            if remote.closed.load(Ordering::SeqCst) {
                return Err(SignalingError::SendFailed {
                    reason: "remote end closed".to_string(),
                });
            }
            remote.deliver(&message);
        }
        Ok(())
    }

    fn subscribe(&self) -> SignalingResult<mpsc::UnboundedReceiver<SignalingMessage>> {
        if self.local.closed.load(Ordering::SeqCst) {
            return Err(SignalingError::ChannelClosed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.local.subscribers.lock().push(tx);
        Ok(rx)
    }
}
