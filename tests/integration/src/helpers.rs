//! Test helpers for integration tests
//!
//! Provides a scripted transport whose far end is driven by the test,
//! a canned hydrator, and polling helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chat_cache::{HydrationRequest, HydrationResult, Hydrator};
use chat_client::{
    FrameSender, GatewayClient, GatewayMessage, OpCode, Outbound, SessionState, Subscription,
    Transport, TransportError, TransportEvent, TransportLink,
};
use chat_common::{try_init_tracing_with_config, ClientConfig, Token, TracingConfig};
use chat_core::{ClientEvent, EntityKind, Snowflake};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

/// Default wait for anything the client should do promptly
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Scripted transport
// ============================================================================

/// Transport whose connections are handed to the test as [`ScriptedServer`]s
pub struct ScriptedTransport {
    servers: mpsc::UnboundedSender<ScriptedServer>,
    failures: AtomicUsize,
    attempts: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Create the transport and the stream of accepted connections
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedServer>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            servers,
            failures: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        });
        (transport, accepted)
    }

    /// Refuse the next `count` connection attempts
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Connection attempts so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Addresses passed to `connect`, in order
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        let refused = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (sender, outbound) = FrameSender::new();
        let (events_tx, events) = mpsc::channel(64);
        self.servers
            .send(ScriptedServer {
                events: events_tx,
                outbound,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(TransportLink { sender, events })
    }
}

/// Server side of one scripted connection
pub struct ScriptedServer {
    events: mpsc::Sender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl ScriptedServer {
    /// Wait for the client's next connection
    pub async fn accept(accepted: &mut mpsc::UnboundedReceiver<ScriptedServer>) -> Result<Self> {
        tokio::time::timeout(STEP_TIMEOUT, accepted.recv())
            .await
            .map_err(|_| anyhow!("client did not connect"))?
            .ok_or_else(|| anyhow!("transport dropped"))
    }

    pub async fn send(&self, msg: &GatewayMessage) -> Result<()> {
        self.send_raw(msg.to_json()?).await
    }

    pub async fn send_raw(&self, text: impl Into<String>) -> Result<()> {
        self.events
            .send(TransportEvent::text(text))
            .await
            .map_err(|_| anyhow!("client stopped reading"))
    }

    /// Deliver one frame split into `pieces` partial deliveries
    pub async fn send_fragmented(&self, msg: &GatewayMessage, pieces: usize) -> Result<()> {
        let bytes = msg.to_json()?.into_bytes();
        let size = bytes.len().div_ceil(pieces.max(1));
        let chunks: Vec<&[u8]> = bytes.chunks(size.max(1)).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            self.events
                .send(TransportEvent::Frame {
                    data: chunk.to_vec(),
                    last: i == last,
                })
                .await
                .map_err(|_| anyhow!("client stopped reading"))?;
        }
        Ok(())
    }

    /// Drop the connection from the server side
    pub async fn close(&self, close_code: Option<u16>) -> Result<()> {
        self.events
            .send(TransportEvent::Disconnected {
                remote: true,
                close_code,
                reason: String::new(),
            })
            .await
            .map_err(|_| anyhow!("client stopped reading"))
    }

    /// Next outbound item, text or close
    pub async fn next_outbound(&mut self) -> Result<Outbound> {
        tokio::time::timeout(STEP_TIMEOUT, self.outbound.recv())
            .await
            .map_err(|_| anyhow!("client sent nothing"))?
            .ok_or_else(|| anyhow!("client closed its outbound queue"))
    }

    /// Next text frame the client sent
    pub async fn next_message(&mut self) -> Result<GatewayMessage> {
        loop {
            if let Outbound::Text(json) = self.next_outbound().await? {
                return Ok(GatewayMessage::from_json(&json)?);
            }
        }
    }

    /// Next frame with the given op, skipping everything else
    pub async fn expect_op(&mut self, op: OpCode) -> Result<GatewayMessage> {
        loop {
            let msg = self.next_message().await?;
            if msg.op == op {
                return Ok(msg);
            }
        }
    }

    /// Everything the client has queued so far
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = self.outbound.try_recv() {
            items.push(item);
        }
        items
    }

    /// Hello, wait for identify, then deliver READY as sequence 1
    pub async fn identify(&mut self, ready: Value) -> Result<GatewayMessage> {
        self.send(&GatewayMessage::hello(45_000)).await?;
        let identify = self.next_message().await?;
        if identify.op != OpCode::Identify {
            bail!("expected identify, got {identify}");
        }
        self.send(&GatewayMessage::dispatch("READY", 1, ready)).await?;
        Ok(identify)
    }
}

// ============================================================================
// Static hydrator
// ============================================================================

/// Hydrator answering from queued payloads
#[derive(Default)]
pub struct StaticHydrator {
    responses: Mutex<HashMap<(EntityKind, Snowflake), VecDeque<Value>>>,
    histories: Mutex<HashMap<Snowflake, Vec<Value>>>,
    requests: Mutex<Vec<HydrationRequest>>,
}

impl StaticHydrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a payload for the next lookup of `(kind, id)`
    pub fn respond(&self, kind: EntityKind, id: i64, payload: Value) {
        self.responses
            .lock()
            .entry((kind, Snowflake::new(id)))
            .or_default()
            .push_back(payload);
    }

    pub fn history(&self, channel_id: i64, messages: Vec<Value>) {
        self.histories
            .lock()
            .insert(Snowflake::new(channel_id), messages);
    }

    /// Lookups served so far
    pub fn requests(&self) -> Vec<HydrationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Hydrator for StaticHydrator {
    async fn fetch(&self, request: HydrationRequest) -> HydrationResult<Option<Value>> {
        self.requests.lock().push(request);
        Ok(self
            .responses
            .lock()
            .get_mut(&(request.kind, request.id))
            .and_then(VecDeque::pop_front))
    }

    async fn fetch_messages(&self, channel_id: Snowflake, limit: u8) -> HydrationResult<Vec<Value>> {
        Ok(self
            .histories
            .lock()
            .get(&channel_id)
            .map(|messages| messages.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Client setup and polling
// ============================================================================

/// Configuration with delays short enough for tests
pub fn test_config() -> ClientConfig {
    ClientConfig::new(Token::parse("Bot test-token"))
        .with_gateway_url("wss://gateway.test/?v=10&encoding=json")
        .with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(30))
        .with_connection_timeout(STEP_TIMEOUT)
        .with_heartbeat_jitter(Duration::from_millis(5))
}

/// Install a subscriber once per test binary; `RUST_LOG` overrides the level
pub fn init_tracing() {
    let config = TracingConfig::default().with_directive("chat_client=debug");
    let _ = try_init_tracing_with_config(&config);
}

/// Client over a scripted transport
pub fn scripted_client(
    config: ClientConfig,
) -> Result<(Arc<GatewayClient>, Arc<ScriptedTransport>, mpsc::UnboundedReceiver<ScriptedServer>)> {
    init_tracing();
    let (transport, accepted) = ScriptedTransport::new();
    let client = GatewayClient::new(config)?.with_transport(transport.clone());
    Ok((Arc::new(client), transport, accepted))
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(client: &GatewayClient, state: SessionState) -> bool {
    wait_for(STEP_TIMEOUT, || client.session_state() == state).await
}

/// Connect and play a fresh identify with `ready` as the snapshot
pub async fn connect_steady(
    client: &Arc<GatewayClient>,
    accepted: &mut mpsc::UnboundedReceiver<ScriptedServer>,
    ready: Value,
) -> Result<ScriptedServer> {
    let connecting = tokio::spawn({
        let client = Arc::clone(client);
        async move { client.connect().await }
    });

    let mut server = ScriptedServer::accept(accepted).await?;
    server.identify(ready).await?;
    connecting.await??;
    Ok(server)
}

/// Next event matching `matches`, skipping the rest
pub async fn next_event<F>(subscription: &mut Subscription, matches: F) -> Result<ClientEvent>
where
    F: Fn(&ClientEvent) -> bool,
{
    tokio::time::timeout(STEP_TIMEOUT, async {
        while let Some(event) = subscription.recv().await {
            if matches(&event) {
                return Ok(event);
            }
        }
        bail!("event stream closed")
    })
    .await
    .map_err(|_| anyhow!("no matching event"))?
}
