//! Transport layer
//!
//! One physical streaming connection per [`TransportLink`]. Outbound text
//! goes through a [`FrameSender`] queue and never blocks the caller;
//! inbound frames and disconnects arrive on the link's event receiver.
//! Transports never retry; reconnecting is the session controller's job.

mod assembler;
mod websocket;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use assembler::FrameAssembler;
pub use websocket::WebSocketTransport;

/// Capacity of a link's inbound event queue
pub const EVENT_QUEUE_SIZE: usize = 256;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Socket error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Low-level event raised by a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A piece of an inbound message; `last` marks the message boundary
    Frame { data: Vec<u8>, last: bool },
    /// The connection is gone. Always the final event of a link.
    Disconnected {
        /// False only when this side initiated the close
        remote: bool,
        close_code: Option<u16>,
        reason: String,
    },
    /// Socket-level failure; a `Disconnected` follows
    Error(String),
}

impl TransportEvent {
    /// A complete single-frame text message
    pub fn text(text: impl Into<String>) -> Self {
        Self::Frame {
            data: text.into().into_bytes(),
            last: true,
        }
    }
}

/// Item on a link's outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Handle to a link's outbound queue
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl FrameSender {
    /// Create a sender and the queue a writer drains
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a text payload for delivery
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    /// Queue a graceful close; nothing queued after it is written
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .map_err(|_| TransportError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An established connection
#[derive(Debug)]
pub struct TransportLink {
    pub sender: FrameSender,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens physical connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connect to `url`, suspending until the handshake completes or fails
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError>;
}
