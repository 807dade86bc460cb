//! Session controller
//!
//! Owns the protocol state machine for one client lifecycle: connect,
//! identify or resume, steady state, and the reconnect loop that runs
//! after every drop the caller did not ask for. All frames of a connection
//! are handled on one task in arrival order; the heartbeat runs beside it
//! and writes through the same outbound queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_common::{ClientConfig, ClientError, ClientResult};
use chat_core::ClientEvent;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{RetryState, SequenceCheck, Session, SessionState};
use crate::events::GatewayEventType;
use crate::handlers::EventDispatcher;
use crate::heartbeat::{run_heartbeat, send_heartbeat, HeartbeatOutcome, HeartbeatScheduler};
use crate::protocol::{
    CloseAction, CloseCode, GatewayMessage, IdentifyPayload, IdentifyProperties, OpCode,
    RequestGuildMembersPayload, ResumePayload,
};
use crate::transport::{FrameAssembler, FrameSender, Transport, TransportEvent, TransportLink};

/// Close code sent when this side drops a connection it wants to resume.
/// 1000 and 1001 would end the session on the server.
const RESUMABLE_CLOSE: u16 = 4000;
/// Close code for a caller disconnect; the session ends with it
const NORMAL_CLOSE: u16 = 1000;

/// How one physical connection ended
#[derive(Debug)]
enum ConnectionOutcome {
    /// The caller asked to disconnect
    Cancelled,
    /// Retrying cannot help
    Fatal(ClientError),
    /// Anything else; the reconnect loop takes over
    Dropped { reason: String },
}

/// Per-connection bookkeeping
struct Connection {
    epoch: u64,
    sender: FrameSender,
    reached_steady: bool,
    heartbeat: Option<JoinHandle<HeartbeatOutcome>>,
    heartbeat_cancel: CancellationToken,
}

impl Connection {
    fn stop_heartbeat(&mut self) {
        self.heartbeat_cancel.cancel();
        self.heartbeat = None;
    }
}

/// Wait on the heartbeat task if one is running
async fn heartbeat_finished(heartbeat: &mut Option<JoinHandle<HeartbeatOutcome>>) -> HeartbeatOutcome {
    match heartbeat.as_mut() {
        Some(handle) => handle.await.unwrap_or(HeartbeatOutcome::Cancelled),
        None => std::future::pending().await,
    }
}

/// Append the configured query (version, encoding) to a resume address
fn resume_address(resume_url: &str, gateway_url: &str) -> String {
    if resume_url.contains('?') {
        return resume_url.to_string();
    }
    match gateway_url.split_once('?') {
        Some((_, query)) => format!("{}/?{query}", resume_url.trim_end_matches('/')),
        None => resume_url.to_string(),
    }
}

/// Drives one client lifecycle from connect to caller disconnect
pub struct SessionController {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,

    session: Arc<Mutex<Session>>,
    heartbeat: Arc<HeartbeatScheduler>,
    state_tx: watch::Sender<SessionState>,
    epoch: AtomicU64,

    /// Current outbound queue, while a link is open
    sender: Mutex<Option<FrameSender>>,
    cancel: CancellationToken,
    finished: AtomicBool,
    fatal: Mutex<Option<ClientError>>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        dispatcher: EventDispatcher,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let heartbeat = Arc::new(HeartbeatScheduler::new(config.heartbeat.jitter()));
        Arc::new(Self {
            config,
            transport,
            dispatcher,
            session: Arc::new(Mutex::new(Session::new())),
            heartbeat,
            state_tx,
            epoch: AtomicU64::new(0),
            sender: Mutex::new(None),
            cancel: CancellationToken::new(),
            finished: AtomicBool::new(false),
            fatal: Mutex::new(None),
        })
    }

    // =========================================================================
    // Caller surface
    // =========================================================================

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Number of physical connections opened so far
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Copy of the retained session data
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.latency()
    }

    /// Whether the run loop has exited for good
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// The error that stopped the run loop, if any
    pub fn take_error(&self) -> Option<ClientError> {
        self.fatal.lock().take()
    }

    /// Caller-initiated disconnect: terminal, no retry
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Ask the server for a guild's members; replies arrive as member chunks
    pub fn request_guild_members(&self, payload: &RequestGuildMembersPayload) -> ClientResult<()> {
        if !self.state().is_steady() {
            return Err(ClientError::NotConnected);
        }
        let sender = self.sender.lock().clone().ok_or(ClientError::NotConnected)?;
        let json = GatewayMessage::request_guild_members(payload)
            .to_json()
            .map_err(ClientError::internal)?;
        sender.send(json).map_err(ClientError::transport)
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    fn set_state(&self, next: SessionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Session state changed");
        }
    }

    fn publish(&self, event: ClientEvent) {
        self.dispatcher.state().publish(event);
    }

    /// Run until the caller disconnects or a fatal close arrives
    pub async fn run(self: Arc<Self>) {
        let mut retry = RetryState::new(
            self.config.reconnect.delay(),
            self.config.reconnect.failed_delay(),
            self.config.reconnect.max_attempts,
        );

        loop {
            let (outcome, reached_steady) = self.connect_once().await;
            let epoch = self.epoch();

            let reason = match outcome {
                ConnectionOutcome::Cancelled => {
                    self.session.lock().invalidate();
                    if reached_steady {
                        self.publish(ClientEvent::Disconnected {
                            epoch,
                            reconnecting: false,
                            reason: "client disconnect".to_string(),
                        });
                    }
                    tracing::info!(epoch, "Disconnected by caller");
                    break;
                }
                ConnectionOutcome::Fatal(err) => {
                    tracing::error!(epoch, error = %err, "Session ended, not retrying");
                    if reached_steady {
                        self.publish(ClientEvent::Disconnected {
                            epoch,
                            reconnecting: false,
                            reason: err.to_string(),
                        });
                    }
                    *self.fatal.lock() = Some(err);
                    break;
                }
                ConnectionOutcome::Dropped { reason } => reason,
            };

            if reached_steady {
                retry.reset();
            }
            let delay = retry.next_delay();
            if reached_steady {
                self.publish(ClientEvent::Disconnected {
                    epoch,
                    reconnecting: delay.is_some(),
                    reason: reason.clone(),
                });
            }

            let Some(delay) = delay else {
                tracing::warn!(epoch, attempts = retry.attempts(), "Reconnect attempts exhausted");
                *self.fatal.lock() = Some(ClientError::SessionClosed(format!(
                    "reconnect attempts exhausted after: {reason}"
                )));
                break;
            };

            let resumable = self.session.lock().is_resumable();
            self.set_state(if resumable {
                SessionState::Resuming
            } else {
                SessionState::Disconnected
            });
            tracing::warn!(
                epoch,
                reason = %reason,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt = retry.attempts(),
                resumable,
                "Connection lost, reconnecting"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => {
                    self.session.lock().invalidate();
                    tracing::info!(epoch, "Disconnected by caller while reconnecting");
                    break;
                }
            }
        }

        self.heartbeat.stop();
        self.finished.store(true, Ordering::Release);
        // Always notify, so waiters re-check `is_finished`
        self.state_tx.send_replace(SessionState::Disconnected);
    }

    /// Open one connection and run it to its end
    async fn connect_once(&self) -> (ConnectionOutcome, bool) {
        if self.cancel.is_cancelled() {
            return (ConnectionOutcome::Cancelled, false);
        }

        let (resumable, resume_url) = {
            let session = self.session.lock();
            (session.is_resumable(), session.resume_url().map(str::to_string))
        };
        let url = match resume_url {
            Some(resume_url) if resumable => resume_address(&resume_url, &self.config.gateway.url),
            _ => self.config.gateway.url.clone(),
        };
        if !resumable {
            self.set_state(SessionState::Connecting);
        }

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(epoch, url = %url, resumable, "Connecting");

        let link = tokio::select! {
            result = self.transport.connect(&url) => result,
            () = self.cancel.cancelled() => return (ConnectionOutcome::Cancelled, false),
        };
        let link = match link {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(epoch, error = %e, "Connect failed");
                return (
                    ConnectionOutcome::Dropped {
                        reason: e.to_string(),
                    },
                    false,
                );
            }
        };

        tracing::info!(epoch, "Connected");
        let TransportLink { sender, events } = link;
        *self.sender.lock() = Some(sender.clone());

        let mut connection = Connection {
            epoch,
            sender,
            reached_steady: false,
            heartbeat: None,
            heartbeat_cancel: self.cancel.child_token(),
        };
        let outcome = self.drive(&mut connection, events).await;

        connection.stop_heartbeat();
        self.heartbeat.stop();
        *self.sender.lock() = None;
        (outcome, connection.reached_steady)
    }

    /// Receive loop for one connection
    async fn drive(
        &self,
        connection: &mut Connection,
        mut events: tokio::sync::mpsc::Receiver<TransportEvent>,
    ) -> ConnectionOutcome {
        let mut assembler = FrameAssembler::new();

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    let _ = connection.sender.close(NORMAL_CLOSE, "client disconnect");
                    return ConnectionOutcome::Cancelled;
                }
                outcome = heartbeat_finished(&mut connection.heartbeat) => {
                    connection.heartbeat = None;
                    match outcome {
                        HeartbeatOutcome::Zombied => {
                            tracing::warn!(epoch = connection.epoch, "Zombied connection, forcing reconnect");
                            let _ = connection.sender.close(RESUMABLE_CLOSE, "heartbeat not acknowledged");
                            return ConnectionOutcome::Dropped { reason: "heartbeat not acknowledged".to_string() };
                        }
                        HeartbeatOutcome::LinkClosed => {
                            return ConnectionOutcome::Dropped { reason: "outbound queue closed".to_string() };
                        }
                        HeartbeatOutcome::Cancelled => {}
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return ConnectionOutcome::Dropped { reason: "transport ended".to_string() };
                    };
                    match event {
                        TransportEvent::Frame { data, last } => match assembler.push(&data, last) {
                            Ok(Some(text)) => {
                                if let Some(outcome) = self.handle_frame(connection, &text) {
                                    return outcome;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(epoch = connection.epoch, error = %e, "Frame dropped");
                            }
                        },
                        TransportEvent::Error(e) => {
                            tracing::warn!(epoch = connection.epoch, error = %e, "Transport error");
                        }
                        TransportEvent::Disconnected { remote, close_code, reason } => {
                            return self.handle_close(connection, remote, close_code, reason);
                        }
                    }
                }
            }
        }
    }

    // =========================================================================
    // Frame handling
    // =========================================================================

    fn handle_frame(&self, connection: &mut Connection, text: &str) -> Option<ConnectionOutcome> {
        let msg = match GatewayMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(epoch = connection.epoch, error = %e, "Malformed frame dropped");
                return None;
            }
        };
        tracing::trace!(epoch = connection.epoch, message = %msg, "Frame received");

        match msg.op {
            OpCode::Hello => {
                let Some(hello) = msg.as_hello().filter(|h| h.heartbeat_interval > 0) else {
                    tracing::warn!(epoch = connection.epoch, "Hello without usable interval dropped");
                    return None;
                };
                self.heartbeat
                    .configure(Duration::from_millis(hello.heartbeat_interval));
                tracing::debug!(
                    epoch = connection.epoch,
                    interval_ms = hello.heartbeat_interval,
                    "Hello received"
                );
                self.send_handshake(connection)
            }
            OpCode::HeartbeatAck => {
                self.heartbeat.record_ack();
                tracing::trace!(latency = ?self.heartbeat.latency(), "Heartbeat acknowledged");
                None
            }
            OpCode::Heartbeat => {
                if self.state().is_steady() {
                    let seq = self.session.lock().sequence();
                    send_heartbeat(&self.heartbeat, &connection.sender, seq);
                } else {
                    tracing::trace!(state = %self.state(), "Heartbeat request ignored outside steady state");
                }
                None
            }
            OpCode::Reconnect => {
                tracing::info!(epoch = connection.epoch, "Server requested reconnect");
                let _ = connection.sender.close(RESUMABLE_CLOSE, "reconnect requested");
                Some(ConnectionOutcome::Dropped {
                    reason: "reconnect requested".to_string(),
                })
            }
            OpCode::InvalidSession => {
                let resumable = msg.as_invalid_session().unwrap_or(false);
                if !resumable {
                    self.session.lock().invalidate();
                }
                tracing::warn!(epoch = connection.epoch, resumable, "Session invalidated");
                let _ = connection.sender.close(
                    if resumable { RESUMABLE_CLOSE } else { NORMAL_CLOSE },
                    "invalid session",
                );
                Some(ConnectionOutcome::Dropped {
                    reason: "invalid session".to_string(),
                })
            }
            OpCode::Dispatch => self.handle_dispatch(connection, msg),
            op => {
                tracing::debug!(epoch = connection.epoch, op = %op, "Unexpected op from server dropped");
                None
            }
        }
    }

    /// Identify on a fresh session, resume on a retained one
    fn send_handshake(&self, connection: &mut Connection) -> Option<ConnectionOutcome> {
        let token = self.config.token.secret().to_string();
        let msg = {
            let mut session = self.session.lock();
            match (session.session_id(), session.sequence()) {
                (Some(session_id), Some(seq)) => {
                    tracing::info!(epoch = connection.epoch, session_id = %session_id, seq, "Resuming session");
                    self.set_state(SessionState::Resuming);
                    GatewayMessage::resume(&ResumePayload {
                        token,
                        session_id: session_id.to_string(),
                        seq,
                    })
                }
                _ => {
                    session.invalidate();
                    tracing::info!(epoch = connection.epoch, "Identifying");
                    self.set_state(SessionState::Identifying);
                    GatewayMessage::identify(&IdentifyPayload {
                        token,
                        properties: IdentifyProperties::default(),
                        large_threshold: self.config.gateway.large_threshold,
                        intents: self.config.gateway.intents,
                        shard: self.config.gateway.shard,
                    })
                }
            }
        };

        let sent = msg
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| connection.sender.send(json).map_err(|e| e.to_string()));
        match sent {
            Ok(()) => None,
            Err(reason) => Some(ConnectionOutcome::Dropped { reason }),
        }
    }

    fn handle_dispatch(
        &self,
        connection: &mut Connection,
        msg: GatewayMessage,
    ) -> Option<ConnectionOutcome> {
        let check = self.session.lock().observe_sequence(msg.s);
        let Some(name) = msg.t else {
            tracing::warn!(epoch = connection.epoch, seq = ?msg.s, "Dispatch without event name dropped");
            return None;
        };
        match check {
            SequenceCheck::Stale { last } => {
                tracing::warn!(event = %name, seq = ?msg.s, last, "Duplicate dispatch dropped");
                return None;
            }
            SequenceCheck::Missing => {
                tracing::debug!(event = %name, "Dispatch without sequence number");
            }
            SequenceCheck::Advanced => {}
        }

        match GatewayEventType::parse(&name) {
            Some(GatewayEventType::Ready) => match self.dispatcher.handle_ready(msg.d) {
                Ok(snapshot) => {
                    tracing::info!(
                        session_id = %snapshot.session_id,
                        guilds = snapshot.guilds.len(),
                        "Session established"
                    );
                    self.session
                        .lock()
                        .establish(snapshot.session_id, snapshot.resume_gateway_url);
                    self.enter_steady(connection, false);
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unusable snapshot, identifying again");
                    self.session.lock().invalidate();
                    let _ = connection.sender.close(NORMAL_CLOSE, "invalid snapshot");
                    Some(ConnectionOutcome::Dropped {
                        reason: e.to_string(),
                    })
                }
            },
            Some(GatewayEventType::Resumed) => {
                let session_id = self
                    .session
                    .lock()
                    .session_id()
                    .map(str::to_string)
                    .unwrap_or_default();
                tracing::info!(session_id = %session_id, "Session resumed");
                self.publish(ClientEvent::Resumed { session_id });
                self.enter_steady(connection, true);
                None
            }
            _ => {
                if let Err(e) = self.dispatcher.dispatch(&name, msg.d) {
                    tracing::warn!(
                        event = %name,
                        seq = ?msg.s,
                        code = e.code(),
                        error = %e,
                        "Dispatch dropped"
                    );
                }
                None
            }
        }
    }

    /// Install the heartbeat and announce the connection
    fn enter_steady(&self, connection: &mut Connection, resumed: bool) {
        connection.reached_steady = true;
        self.set_state(SessionState::Steady);

        if connection.heartbeat.is_none() {
            let session = Arc::clone(&self.session);
            connection.heartbeat = Some(tokio::spawn(run_heartbeat(
                Arc::clone(&self.heartbeat),
                connection.sender.clone(),
                move || session.lock().sequence(),
                connection.heartbeat_cancel.clone(),
            )));
        }

        self.publish(ClientEvent::Connected {
            epoch: connection.epoch,
            resumed,
        });
    }

    fn handle_close(
        &self,
        connection: &Connection,
        remote: bool,
        close_code: Option<u16>,
        reason: String,
    ) -> ConnectionOutcome {
        let action = CloseCode::classify(close_code);
        tracing::info!(
            epoch = connection.epoch,
            remote,
            close_code = ?close_code,
            reason = %reason,
            action = ?action,
            "Connection closed"
        );

        let description = close_code
            .and_then(CloseCode::from_u16)
            .map_or_else(|| reason.clone(), |code| code.to_string());

        match action {
            CloseAction::Fatal => {
                self.session.lock().invalidate();
                if close_code == Some(CloseCode::AuthenticationFailed.as_u16()) {
                    ConnectionOutcome::Fatal(ClientError::AuthenticationFailed {
                        close_code,
                        reason: description,
                    })
                } else {
                    ConnectionOutcome::Fatal(ClientError::SessionClosed(description))
                }
            }
            CloseAction::Reidentify => {
                self.session.lock().invalidate();
                ConnectionOutcome::Dropped {
                    reason: description,
                }
            }
            CloseAction::Resume => ConnectionOutcome::Dropped {
                reason: if description.is_empty() {
                    "connection closed".to_string()
                } else {
                    description
                },
            },
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("epoch", &self.epoch())
            .field("session", &*self.session.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Outbound, TransportError};
    use async_trait::async_trait;
    use chat_cache::{CacheConfig, StateManager};
    use chat_common::Token;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// Hands out links whose far ends are collected by the test
    struct LoopbackTransport {
        ends: mpsc::UnboundedSender<(mpsc::Sender<TransportEvent>, mpsc::UnboundedReceiver<Outbound>)>,
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn connect(&self, _url: &str) -> Result<TransportLink, TransportError> {
            let (sender, outbound) = FrameSender::new();
            let (events_tx, events) = mpsc::channel(64);
            self.ends
                .send((events_tx, outbound))
                .map_err(|_| TransportError::Closed)?;
            Ok(TransportLink { sender, events })
        }
    }

    fn controller() -> (
        Arc<SessionController>,
        mpsc::UnboundedReceiver<(mpsc::Sender<TransportEvent>, mpsc::UnboundedReceiver<Outbound>)>,
    ) {
        let (ends, rx) = mpsc::unbounded_channel();
        let config = ClientConfig::new(Token::parse("secret"))
            .with_reconnect_delays(Duration::from_millis(5), Duration::from_millis(5));
        let dispatcher = EventDispatcher::new(StateManager::new_shared(CacheConfig::default()));
        (
            SessionController::new(config, Arc::new(LoopbackTransport { ends }), dispatcher),
            rx,
        )
    }

    async fn next_sent(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> GatewayMessage {
        loop {
            let item = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
                .await
                .unwrap()
                .unwrap();
            if let Outbound::Text(json) = item {
                return GatewayMessage::from_json(&json).unwrap();
            }
        }
    }

    fn frame(msg: &GatewayMessage) -> TransportEvent {
        TransportEvent::text(msg.to_json().unwrap())
    }

    fn ready(session_id: &str) -> GatewayMessage {
        GatewayMessage::dispatch(
            "READY",
            1,
            json!({"v": 10, "user": {"id": "42"}, "session_id": session_id}),
        )
    }

    #[test]
    fn test_resume_address_keeps_query() {
        assert_eq!(
            resume_address("wss://resume.example", "wss://gw.example/?v=10&encoding=json"),
            "wss://resume.example/?v=10&encoding=json"
        );
        assert_eq!(
            resume_address("wss://resume.example/?v=9", "wss://gw.example/?v=10"),
            "wss://resume.example/?v=9"
        );
    }

    #[tokio::test]
    async fn test_identify_then_steady() {
        let (controller, mut ends) = controller();
        let mut state = controller.watch_state();
        let run = tokio::spawn(Arc::clone(&controller).run());

        let (events, mut outbound) = ends.recv().await.unwrap();
        events.send(frame(&GatewayMessage::hello(60_000))).await.unwrap();

        let identify = next_sent(&mut outbound).await;
        assert_eq!(identify.as_identify().unwrap().token, "secret");

        events.send(frame(&ready("abc"))).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| s.is_steady()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.session().session_id(), Some("abc"));

        controller.shutdown();
        run.await.unwrap();
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert!(controller.take_error().is_none());
    }

    #[tokio::test]
    async fn test_zero_interval_hello_is_dropped() {
        let (controller, mut ends) = controller();
        let run = tokio::spawn(Arc::clone(&controller).run());

        let (events, mut outbound) = ends.recv().await.unwrap();
        events.send(frame(&GatewayMessage::hello(0))).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(100), outbound.recv())
            .await
            .is_err());
        assert_eq!(controller.state(), SessionState::Connecting);

        events.send(frame(&GatewayMessage::hello(60_000))).await.unwrap();
        assert!(next_sent(&mut outbound).await.as_identify().is_some());

        controller.shutdown();
        run.await.unwrap();
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal() {
        let (controller, mut ends) = controller();
        let run = tokio::spawn(Arc::clone(&controller).run());

        let (events, _outbound) = ends.recv().await.unwrap();
        events
            .send(TransportEvent::Disconnected {
                remote: true,
                close_code: Some(4004),
                reason: "Authentication failed".into(),
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(controller.is_finished());
        assert!(matches!(
            controller.take_error(),
            Some(ClientError::AuthenticationFailed { close_code: Some(4004), .. })
        ));
        assert_eq!(controller.epoch(), 1);
    }

    #[tokio::test]
    async fn test_drop_resumes_with_last_sequence() {
        let (controller, mut ends) = controller();
        let run = tokio::spawn(Arc::clone(&controller).run());

        let (events, mut outbound) = ends.recv().await.unwrap();
        events.send(frame(&GatewayMessage::hello(60_000))).await.unwrap();
        next_sent(&mut outbound).await;
        events.send(frame(&ready("abc"))).await.unwrap();
        events
            .send(frame(&GatewayMessage::dispatch(
                "CHANNEL_CREATE",
                2,
                json!({"id": "100", "type": 0}),
            )))
            .await
            .unwrap();
        events
            .send(TransportEvent::Disconnected {
                remote: true,
                close_code: None,
                reason: String::new(),
            })
            .await
            .unwrap();

        let (events, mut outbound) = ends.recv().await.unwrap();
        events.send(frame(&GatewayMessage::hello(60_000))).await.unwrap();
        let resume = next_sent(&mut outbound).await.as_resume().unwrap();
        assert_eq!(resume.session_id, "abc");
        assert_eq!(resume.seq, 2);

        controller.shutdown();
        run.await.unwrap();
        assert_eq!(controller.session(), Session::default());
    }
}
