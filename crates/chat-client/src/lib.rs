//! # chat-client
//!
//! Gateway client: keeps a session open against a chat gateway and
//! mirrors server state into a local entity cache.
//!
//! ## Layers
//!
//! - **transport**: WebSocket link with outbound chunking and inbound reassembly
//! - **protocol**: op codes, the JSON envelope, control payloads, close codes
//! - **heartbeat**: liveness frames and zombie detection
//! - **session**: identify/resume state machine and the reconnect loop
//! - **handlers**: routes dispatch events into the cache
//! - **rest**: hydration lookups over the REST API
//! - **client**: the caller facade

pub mod client;
pub mod events;
pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod rest;
pub mod session;
pub mod transport;

pub use client::{GatewayClient, Subscription};
pub use handlers::{DispatchError, EventDispatcher};
pub use heartbeat::{HeartbeatOutcome, HeartbeatScheduler};
pub use protocol::{CloseAction, CloseCode, GatewayMessage, OpCode};
pub use rest::RestHydrator;
pub use session::{Session, SessionController, SessionState};
pub use transport::{
    FrameSender, Outbound, Transport, TransportError, TransportEvent, TransportLink,
    WebSocketTransport,
};
