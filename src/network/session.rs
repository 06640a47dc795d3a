//! Match Session
//!
//! Runs one [`Simulation`] on its own task at the configured tick rate.
//! Everything crossing the task boundary goes through channels:
//!
//! ```text
//!  clients ──Intent──► mpsc ──┐
//!                             ▼
//!                     ┌───────────────┐ ──Notification──► broadcast ──► clients
//!  shutdown ─────────►│ MatchSession  │
//!                     └───────────────┘ ──MatchResults──► mpsc ──► results task
//! ```
//!
//! The session task is the only owner of simulation state, so the tick never
//! waits on a lock.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::game::events::Notification;
use crate::game::intent::Intent;
use crate::game::lifecycle::MatchResults;
use crate::game::tick::{Simulation, TickResult};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Channel sizing for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Buffered inbound intents before senders wait.
    pub intent_capacity: usize,
    /// Notifications a slow subscriber may lag behind.
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            intent_capacity: 1024,
            outbound_capacity: 4096,
        }
    }
}

/// Session errors.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Session task has stopped.
    #[error("Session closed")]
    Closed,

    /// Inbound queue is full.
    #[error("Session busy")]
    Busy,
}

/// Cloneable handle for talking to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    intent_tx: mpsc::Sender<Intent>,
    outbound_tx: broadcast::Sender<Notification>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionHandle {
    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue an intent, waiting for room.
    pub async fn submit(&self, intent: Intent) -> Result<(), SessionError> {
        self.intent_tx.send(intent).await.map_err(|_| SessionError::Closed)
    }

    /// Queue an intent without waiting.
    pub fn try_submit(&self, intent: Intent) -> Result<(), SessionError> {
        self.intent_tx.try_send(intent).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::Busy,
            mpsc::error::TrySendError::Closed(_) => SessionError::Closed,
        })
    }

    /// Receive every notification published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.outbound_tx.subscribe()
    }

    /// Ask the session to stop after the current tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// A running match.
pub struct MatchSession {
    /// Unique session identifier.
    pub id: SessionId,
    simulation: Simulation,
    intent_rx: mpsc::Receiver<Intent>,
    outbound_tx: broadcast::Sender<Notification>,
    shutdown_rx: broadcast::Receiver<()>,
    results_tx: Option<mpsc::Sender<MatchResults>>,
}

impl MatchSession {
    /// Wrap a simulation. Returns the session and a handle to it.
    pub fn new(simulation: Simulation, config: SessionConfig) -> (Self, SessionHandle) {
        let id = uuid::Uuid::new_v4().into_bytes();
        let (intent_tx, intent_rx) = mpsc::channel(config.intent_capacity.max(1));
        let (outbound_tx, _) = broadcast::channel(config.outbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = SessionHandle {
            id,
            intent_tx,
            outbound_tx: outbound_tx.clone(),
            shutdown_tx,
        };
        let session = Self {
            id,
            simulation,
            intent_rx,
            outbound_tx,
            shutdown_rx,
            results_tx: None,
        };
        (session, handle)
    }

    /// Forward finished rounds to a results task.
    pub fn with_results(mut self, results_tx: mpsc::Sender<MatchResults>) -> Self {
        self.results_tx = Some(results_tx);
        self
    }

    /// Run until shutdown is requested or every handle is dropped. Returns
    /// the simulation for inspection.
    #[instrument(skip(self), fields(session = %hex::encode(self.id)))]
    pub async fn run(mut self) -> Simulation {
        let rate = self.simulation.config().simulation.tick_rate.max(1);
        let mut ticker = interval(Duration::from_secs_f64(1.0 / rate as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(tick_rate = rate, "Session started");
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.drain_intents() {
                        info!("All handles dropped");
                        break;
                    }
                    let now = Instant::now();
                    let elapsed = now.duration_since(last);
                    last = now;

                    for result in self.simulation.advance(elapsed) {
                        self.publish(result);
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(tick = self.simulation.current_tick(), "Session stopped");
        self.simulation
    }

    /// Move queued intents into the simulation. False once no sender remains.
    fn drain_intents(&mut self) -> bool {
        loop {
            match self.intent_rx.try_recv() {
                Ok(intent) => self.simulation.submit(intent),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn publish(&mut self, result: TickResult) {
        #[cfg(feature = "debug-tracing")]
        tracing::trace!(tick = result.tick, notifications = result.notifications.len(), "Publishing tick");

        for notification in result.notifications {
            // No subscribers is not an error
            let _ = self.outbound_tx.send(notification);
        }

        if let Some(results) = result.results {
            let Some(tx) = &self.results_tx else {
                debug!(match_number = results.match_number, "No results sink attached");
                return;
            };
            match tx.try_send(results) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(r)) => {
                    warn!(match_number = r.match_number, "Results sink backed up, round dropped");
                }
                Err(mpsc::error::TrySendError::Closed(r)) => {
                    warn!(match_number = r.match_number, "Results sink closed, round dropped");
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::events::NotificationData;
    use crate::world::entity::PlayerId;

    fn session() -> (MatchSession, SessionHandle) {
        let simulation = Simulation::with_rapier(ServerConfig::default()).unwrap();
        MatchSession::new(simulation, SessionConfig::default())
    }

    async fn next_matching(
        rx: &mut broadcast::Receiver<Notification>,
        pred: impl Fn(&NotificationData) -> bool,
    ) -> Notification {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(n) if pred(&n.data) => return n,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("session closed"),
                }
            }
        })
        .await
        .expect("notification not received in time")
    }

    #[tokio::test]
    async fn test_join_is_broadcast() {
        let (session, handle) = session();
        let mut rx = handle.subscribe();
        let task = tokio::spawn(session.run());

        let player_id = PlayerId::new([9; 16]);
        handle
            .submit(Intent::Join { player_id, name: "neo".into() })
            .await
            .unwrap();

        let joined = next_matching(&mut rx, |d| matches!(d, NotificationData::PlayerJoined { .. })).await;
        assert_eq!(joined.player_id, Some(player_id));

        handle.shutdown();
        let simulation = task.await.unwrap();
        assert_eq!(simulation.world().player_count(), 1);
    }

    #[tokio::test]
    async fn test_rejections_reach_subscribers() {
        let (session, handle) = session();
        let mut rx = handle.subscribe();
        let task = tokio::spawn(session.run());

        handle.submit(Intent::Jump { player_id: PlayerId::new([1; 16]) }).await.unwrap();
        next_matching(&mut rx, |d| matches!(d, NotificationData::IntentRejected { .. })).await;

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_session() {
        let (session, handle) = session();
        let task = tokio::spawn(session.run());
        drop(handle);

        let simulation = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(simulation.world().player_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_after_stop_fails() {
        let (session, handle) = session();
        let task = tokio::spawn(session.run());
        handle.shutdown();
        task.await.unwrap();

        let result = handle.submit(Intent::Leave { player_id: PlayerId::new([1; 16]) }).await;
        assert!(matches!(result, Err(SessionError::Closed)));
    }
}
