//! Caller facade
//!
//! [`GatewayClient`] ties the pieces together: one entity cache that
//! outlives individual connections, a transport, and a fresh
//! [`SessionController`] per `connect`.

use std::sync::Arc;

use chat_cache::{CacheConfig, Hydrator, StateManager};
use chat_common::{ClientConfig, ClientError, ClientResult};
use chat_core::{ClientEvent, EntityKind, EntitySnapshot, EventCategories, Snowflake};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::handlers::EventDispatcher;
use crate::protocol::RequestGuildMembersPayload;
use crate::rest::RestHydrator;
use crate::session::{Session, SessionController, SessionState};
use crate::transport::{Transport, WebSocketTransport};

struct Running {
    controller: Arc<SessionController>,
    task: JoinHandle<()>,
}

/// Gateway client
///
/// # Example
///
/// ```ignore
/// let client = GatewayClient::new(ClientConfig::from_env()?)?.with_rest_hydration()?;
/// let mut events = client.subscribe(EventCategories::ENTITY);
/// client.connect().await?;
///
/// while let Some(event) = events.recv().await {
///     tracing::info!(event = event.name(), "Event");
/// }
/// ```
pub struct GatewayClient {
    config: ClientConfig,
    state: Arc<StateManager>,
    transport: Arc<dyn Transport>,
    running: Mutex<Option<Running>>,
}

impl GatewayClient {
    /// Build a client over the WebSocket transport
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let state = StateManager::new_shared(CacheConfig {
            event_buffer: config.event_buffer,
            history_limit: config.hydration.history_limit,
        });
        let transport = Arc::new(WebSocketTransport::new(
            config.gateway.send_chunk_size,
            config.gateway.connection_timeout(),
        ));

        Ok(Self {
            config,
            state,
            transport,
            running: Mutex::new(None),
        })
    }

    /// Replace the transport; mainly for tests
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_hydrator(self, hydrator: Arc<dyn Hydrator>) -> Self {
        self.state.set_hydrator(hydrator);
        self
    }

    /// Hydrate missing entities over the REST API
    pub fn with_rest_hydration(self) -> ClientResult<Self> {
        let hydrator = RestHydrator::new_shared(&self.config)
            .map_err(|e| ClientError::Hydration(e.to_string()))?;
        Ok(self.with_hydrator(hydrator))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The entity cache, shared across connections
    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    fn controller(&self) -> Option<Arc<SessionController>> {
        self.running
            .lock()
            .as_ref()
            .filter(|running| !running.controller.is_finished())
            .map(|running| Arc::clone(&running.controller))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the session and wait until it is steady.
    ///
    /// On timeout the background loop keeps retrying; call
    /// [`disconnect`](Self::disconnect) to stop it.
    pub async fn connect(&self) -> ClientResult<()> {
        let controller = {
            let mut running = self.running.lock();
            if running
                .as_ref()
                .is_some_and(|running| !running.controller.is_finished())
            {
                return Err(ClientError::AlreadyConnected);
            }

            let controller = SessionController::new(
                self.config.clone(),
                Arc::clone(&self.transport),
                EventDispatcher::new(Arc::clone(&self.state)),
            );
            let task = tokio::spawn(Arc::clone(&controller).run());
            *running = Some(Running {
                controller: Arc::clone(&controller),
                task,
            });
            controller
        };

        tracing::info!(url = %self.config.gateway.url, "Connecting to gateway");

        let timeout = self.config.gateway.connection_timeout();
        let mut state = controller.watch_state();
        let waited = tokio::time::timeout(
            timeout,
            state.wait_for(|s| s.is_steady() || controller.is_finished()),
        )
        .await;

        match waited {
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Session not steady in time, still retrying");
                Err(ClientError::ConnectTimeout(timeout))
            }
            Ok(Ok(current)) if current.is_steady() => Ok(()),
            Ok(_) => Err(controller
                .take_error()
                .unwrap_or_else(|| ClientError::SessionClosed("session ended before it was established".into()))),
        }
    }

    /// Close the session for good; no reconnect follows
    pub async fn disconnect(&self) -> ClientResult<()> {
        let Some(Running { controller, task }) = self.running.lock().take() else {
            return Err(ClientError::NotConnected);
        };
        if controller.is_finished() {
            return Err(ClientError::NotConnected);
        }

        controller.shutdown();
        task.await.map_err(ClientError::internal)?;
        tracing::info!("Disconnected from gateway");
        Ok(())
    }

    /// Wait for the background session to end on its own, returning what
    /// stopped it
    pub async fn closed(&self) -> Option<ClientError> {
        let running = self.running.lock().take()?;
        let _ = running.task.await;
        running.controller.take_error()
    }

    pub fn session_state(&self) -> SessionState {
        self.controller()
            .map_or(SessionState::Disconnected, |controller| controller.state())
    }

    /// Retained resume data of the running session
    pub fn session(&self) -> Option<Session> {
        self.controller().map(|controller| controller.session())
    }

    pub fn latency(&self) -> Option<std::time::Duration> {
        self.controller().and_then(|controller| controller.latency())
    }

    /// Ask the server for every member of a guild
    pub fn request_guild_members(&self, guild_id: Snowflake) -> ClientResult<()> {
        self.controller()
            .ok_or(ClientError::NotConnected)?
            .request_guild_members(&RequestGuildMembersPayload::all(guild_id))
    }

    // =========================================================================
    // Cache access
    // =========================================================================

    pub fn get_entity(&self, kind: EntityKind, id: Snowflake) -> Option<EntitySnapshot> {
        self.state.get(kind, id)
    }

    pub fn find_entity<P>(&self, kind: EntityKind, predicate: P) -> Option<EntitySnapshot>
    where
        P: Fn(&EntitySnapshot) -> bool,
    {
        self.state.find(kind, predicate)
    }

    /// Receive events of the given categories; drop the subscription to
    /// unsubscribe
    pub fn subscribe(&self, categories: EventCategories) -> Subscription {
        Subscription {
            receiver: self.state.subscribe(),
            categories,
        }
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().as_ref() {
            running.controller.shutdown();
        }
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("gateway_url", &self.config.gateway.url)
            .field("state", &self.session_state())
            .finish_non_exhaustive()
    }
}

/// Filtered view of the client's event stream
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ClientEvent>,
    categories: EventCategories,
}

impl Subscription {
    pub fn categories(&self) -> EventCategories {
        self.categories
    }

    /// Next matching event; `None` once the client is gone
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.categories.intersects(event.category()) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.categories.intersects(event.category()) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
