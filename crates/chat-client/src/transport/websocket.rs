//! WebSocket transport over `tokio-tungstenite`
//!
//! Each link runs a writer task draining the outbound queue and a reader
//! task forwarding inbound messages. The two tasks share one socket split
//! into sink and stream halves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode, Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{
    FrameSender, Outbound, Transport, TransportError, TransportEvent, TransportLink,
    EVENT_QUEUE_SIZE,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default outbound fragment size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Opens gateway connections over WebSocket
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    chunk_size: usize,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new(chunk_size: usize, connect_timeout: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            connect_timeout,
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, Duration::from_secs(30))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        tracing::debug!(url = %url, "Opening WebSocket");

        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, stream) = ws.split();
        let (sender, outbound) = FrameSender::new();
        let (events_tx, events) = mpsc::channel(EVENT_QUEUE_SIZE);
        let closing = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(sink, outbound, self.chunk_size, Arc::clone(&closing)));
        tokio::spawn(read_loop(stream, events_tx, closing));

        tracing::debug!(url = %url, "WebSocket established");
        Ok(TransportLink { sender, events })
    }
}

/// Split a payload into wire fragments of at most `chunk_size` bytes
fn split_chunks(text: &str, chunk_size: usize) -> Vec<&[u8]> {
    text.as_bytes().chunks(chunk_size.max(1)).collect()
}

async fn write_text(
    sink: &mut SplitSink<WsStream, Message>,
    text: String,
    chunk_size: usize,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    if text.len() <= chunk_size {
        return sink.send(Message::Text(text)).await;
    }

    let chunks = split_chunks(&text, chunk_size);
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.into_iter().enumerate() {
        let opcode = if i == 0 { Data::Text } else { Data::Continue };
        let frame = Frame::message(chunk.to_vec(), OpCode::Data(opcode), i == last);
        sink.feed(Message::Frame(frame)).await?;
    }
    sink.flush().await
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    chunk_size: usize,
    closing: Arc<AtomicBool>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Text(text) => {
                tracing::trace!(bytes = text.len(), "Sending frame");
                if let Err(e) = write_text(&mut sink, text, chunk_size).await {
                    tracing::warn!(error = %e, "Failed to write to WebSocket");
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                closing.store(true, Ordering::Release);
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                break;
            }
        }
    }
    let _ = sink.close().await;
}

/// Map an inbound data message to a frame event
///
/// Binary messages would carry compressed payloads, which are never
/// negotiated, so they are dropped rather than fed to the text decoder.
fn data_event(msg: Message) -> Option<TransportEvent> {
    match msg {
        Message::Text(text) => Some(TransportEvent::Frame {
            data: text.into_bytes(),
            last: true,
        }),
        Message::Binary(data) => {
            tracing::warn!(bytes = data.len(), "Binary frame unsupported, dropped");
            None
        }
        Message::Frame(frame) => {
            let last = frame.header().is_final;
            Some(TransportEvent::Frame {
                data: frame.into_data(),
                last,
            })
        }
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    events: mpsc::Sender<TransportEvent>,
    closing: Arc<AtomicBool>,
) {
    let mut close_code = None;
    let mut reason = String::new();

    while let Some(msg) = stream.next().await {
        let event = match msg {
            Ok(Message::Close(frame)) => {
                if let Some(frame) = frame {
                    close_code = Some(u16::from(frame.code));
                    reason = frame.reason.into_owned();
                }
                tracing::debug!(close_code = ?close_code, reason = %reason, "Close frame received");
                break;
            }
            Ok(msg) => match data_event(msg) {
                Some(event) => event,
                None => continue,
            },
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket error");
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                break;
            }
        };

        if events.send(event).await.is_err() {
            // Link abandoned by its owner
            return;
        }
    }

    let _ = events
        .send(TransportEvent::Disconnected {
            remote: !closing.load(Ordering::Acquire),
            close_code,
            reason,
        })
        .await;
}
