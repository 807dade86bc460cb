//! Heartbeat scheduler
//!
//! Emits a liveness frame every interval announced by Hello and watches
//! for the acknowledgement. A heartbeat that is still unacknowledged when
//! the next one is due means the connection is zombied; the loop then
//! stops and reports it instead of writing into a dead socket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::protocol::GatewayMessage;
use crate::transport::FrameSender;

/// Outcome of the heartbeat loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The previous heartbeat was never acknowledged
    Zombied,
    /// The outbound queue is gone
    LinkClosed,
    /// The heartbeat was cancelled externally
    Cancelled,
}

#[derive(Debug, Default)]
struct HeartbeatState {
    interval: Option<Duration>,
    last_sent_at: Option<Instant>,
    acked: bool,
    latency: Option<Duration>,
}

/// Liveness bookkeeping for one connection
#[derive(Debug)]
pub struct HeartbeatScheduler {
    jitter: Duration,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatScheduler {
    /// `jitter` is how recently a heartbeat may have gone out for a tick to be skipped
    #[must_use]
    pub fn new(jitter: Duration) -> Self {
        Self {
            jitter,
            state: Mutex::new(HeartbeatState {
                acked: true,
                ..HeartbeatState::default()
            }),
        }
    }

    /// Install the interval from Hello; resets acknowledgement tracking
    pub fn configure(&self, interval: Duration) {
        let mut state = self.state.lock();
        state.interval = Some(interval);
        state.last_sent_at = None;
        state.acked = true;
    }

    pub fn interval(&self) -> Option<Duration> {
        self.state.lock().interval
    }

    pub fn record_sent(&self) {
        let mut state = self.state.lock();
        state.last_sent_at = Some(Instant::now());
        state.acked = false;
    }

    pub fn record_ack(&self) {
        let mut state = self.state.lock();
        state.acked = true;
        state.latency = state.last_sent_at.map(|sent| sent.elapsed());
    }

    pub fn is_acked(&self) -> bool {
        self.state.lock().acked
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.state.lock().latency
    }

    /// Whether a heartbeat went out within the jitter window
    pub fn sent_recently(&self) -> bool {
        self.state
            .lock()
            .last_sent_at
            .is_some_and(|sent| sent.elapsed() < self.jitter)
    }

    /// Forget the interval; the next connection must receive a new Hello
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.interval = None;
        state.last_sent_at = None;
        state.acked = true;
    }
}

/// Send one heartbeat carrying the last observed sequence
pub fn send_heartbeat(
    scheduler: &HeartbeatScheduler,
    sender: &FrameSender,
    last_sequence: Option<u64>,
) -> bool {
    let Ok(json) = GatewayMessage::heartbeat(last_sequence).to_json() else {
        return false;
    };
    if sender.send(json).is_err() {
        return false;
    }
    scheduler.record_sent();
    tracing::trace!(seq = ?last_sequence, "Heartbeat sent");
    true
}

/// Run the heartbeat loop for one connection.
///
/// The first beat fires after a random fraction of the interval so that
/// many clients reconnecting together do not beat in lockstep.
pub async fn run_heartbeat<F>(
    scheduler: Arc<HeartbeatScheduler>,
    sender: FrameSender,
    last_sequence: F,
    cancel: CancellationToken,
) -> HeartbeatOutcome
where
    F: Fn() -> Option<u64> + Send,
{
    let Some(interval) = scheduler.interval().filter(|i| !i.is_zero()) else {
        tracing::debug!("Heartbeat started without a usable interval");
        return HeartbeatOutcome::Cancelled;
    };

    let initial = interval.mul_f64(rand::random::<f64>());
    let mut ticker = time::interval_at(time::Instant::now() + initial, interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if scheduler.sent_recently() {
                    tracing::trace!("Heartbeat sent recently, tick skipped");
                    continue;
                }
                if !scheduler.is_acked() {
                    tracing::warn!("Heartbeat not acknowledged, connection zombied");
                    return HeartbeatOutcome::Zombied;
                }
                if !send_heartbeat(&scheduler, &sender, last_sequence()) {
                    return HeartbeatOutcome::LinkClosed;
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatOutcome::Cancelled;
            }
        }
    }
}
