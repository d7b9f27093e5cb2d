//! The sync coordinator.
//!
//! Owns the lifecycle of both transports and the cloud cursor,
//! fans every local state change out across all viable paths, folds
//! inbound messages from any path into one merged view, and bridges
//! between transports on devices that can reach both sides.
//!
//! All coordination state (merge map, session dedup, cloud cursor)
//! is touched from one task; transports and the cloud are reached
//! through their own handles, so the loop itself never blocks on a
//! slow path. Fan-out legs run as independent spawned tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sync_lan::{LanError, LanEvent, LocalPeerTransport};
use sync_relay::{RelayLink, RelayTransport};
use sync_types::{
    DeviceId, DeviceRecord, SessionCompleteEvent, SessionId, TimerStateMessage, WireMessage,
};

use crate::cloud::{CloudCursor, CloudStore};
use crate::merge::{MergeOutcome, MergeState};
use crate::store::SessionStore;

/// Coordinator errors.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The LAN transport failed.
    #[error(transparent)]
    Lan(#[from] LanError),

    /// The coordinator was already stopped.
    #[error("coordinator stopped")]
    Stopped,
}

/// Changes the coordinator surfaces to the application.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    /// A remote device's timer changed.
    TimerUpdated {
        /// The device whose timer changed.
        origin: DeviceId,
        /// Its latest snapshot.
        state: TimerStateMessage,
    },
    /// A completed session became a durable record.
    SessionRecorded {
        /// The recorded session's id.
        session_id: SessionId,
    },
}

/// Which path an inbound message arrived on.
///
/// Bridging depends on it: LAN and relay arrivals may be re-emitted
/// on the other transport, cloud arrivals never are (every device
/// pulls the cloud itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundPath {
    Lan,
    Relay,
    Cloud,
}

enum Command {
    PublishTimerState(TimerStateMessage),
    PublishSessionComplete(SessionCompleteEvent),
}

/// Single point of control for the sync layer on one device.
pub struct SyncCoordinator<L: RelayLink + 'static> {
    local: DeviceRecord,
    lan: Arc<LocalPeerTransport>,
    relay: Arc<RelayTransport<L>>,
    merge: Arc<Mutex<MergeState>>,
    commands_tx: mpsc::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<L: RelayLink + 'static> SyncCoordinator<L> {
    /// Wire the coordinator to its transports and start the
    /// coordination loop.
    ///
    /// Takes ownership of both event streams; activates the relay
    /// transport as part of startup. Returns the coordinator plus the
    /// stream of [`SyncUpdate`]s for the application.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        local: DeviceRecord,
        lan: Arc<LocalPeerTransport>,
        lan_events: mpsc::Receiver<LanEvent>,
        relay: Arc<RelayTransport<L>>,
        relay_events: mpsc::Receiver<WireMessage>,
        cloud: Arc<dyn CloudStore>,
        sessions: Arc<dyn SessionStore>,
        bridge_enabled: bool,
        cloud_poll_interval: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<SyncUpdate>) {
        relay.activate();

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (updates_tx, updates_rx) = mpsc::channel(64);
        let merge = Arc::new(Mutex::new(MergeState::new()));

        if bridge_enabled {
            tracing::info!(device = %local.id, class = %local.class, "hub bridging enabled");
        }

        let run = RunLoop {
            local,
            lan: Arc::clone(&lan),
            relay: Arc::clone(&relay),
            cloud,
            sessions,
            merge: Arc::clone(&merge),
            updates_tx,
            bridge_enabled,
            cursor: CloudCursor::start(),
        };
        let task = tokio::spawn(run.run(commands_rx, lan_events, relay_events, cloud_poll_interval));

        let coordinator = Arc::new(Self {
            local,
            lan,
            relay,
            merge,
            commands_tx,
            task: Mutex::new(Some(task)),
            stopped: AtomicBool::new(false),
        });
        (coordinator, updates_rx)
    }

    /// The identity this coordinator syncs for.
    pub fn local_record(&self) -> DeviceRecord {
        self.local
    }

    /// The address the LAN transport listens on.
    pub fn lan_addr(&self) -> std::net::SocketAddr {
        self.lan.local_addr()
    }

    /// Dial a LAN peer directly, bypassing discovery.
    pub async fn connect_peer(&self, addr: std::net::SocketAddr) -> Result<(), CoordinatorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Stopped);
        }
        self.lan.connect_to(addr).await?;
        Ok(())
    }

    /// Fan a local timer-state change out to every viable path.
    pub async fn publish_timer_state(
        &self,
        state: TimerStateMessage,
    ) -> Result<(), CoordinatorError> {
        self.commands_tx
            .send(Command::PublishTimerState(state))
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }

    /// Record a completed session locally and mirror it everywhere.
    pub async fn publish_session_complete(
        &self,
        event: SessionCompleteEvent,
    ) -> Result<(), CoordinatorError> {
        self.commands_tx
            .send(Command::PublishSessionComplete(event))
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }

    /// The latest merged snapshot from one origin.
    pub fn timer_for(&self, origin: DeviceId) -> Option<TimerStateMessage> {
        self.merge.lock().unwrap().timer_for(origin).cloned()
    }

    /// Every device a snapshot has been merged from.
    pub fn known_origins(&self) -> Vec<DeviceId> {
        self.merge.lock().unwrap().origins().collect()
    }

    /// Stop the loop and both transports. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(device = %self.local.id, "sync coordinator stopping");
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
        self.lan.stop();
        self.relay.shutdown();
    }
}

impl<L: RelayLink + 'static> Drop for SyncCoordinator<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the coordination task.
struct RunLoop<L: RelayLink + 'static> {
    local: DeviceRecord,
    lan: Arc<LocalPeerTransport>,
    relay: Arc<RelayTransport<L>>,
    cloud: Arc<dyn CloudStore>,
    sessions: Arc<dyn SessionStore>,
    merge: Arc<Mutex<MergeState>>,
    updates_tx: mpsc::Sender<SyncUpdate>,
    bridge_enabled: bool,
    cursor: CloudCursor,
}

impl<L: RelayLink + 'static> RunLoop<L> {
    async fn run(
        mut self,
        mut commands_rx: mpsc::Receiver<Command>,
        mut lan_events: mpsc::Receiver<LanEvent>,
        mut relay_events: mpsc::Receiver<WireMessage>,
        cloud_poll_interval: Duration,
    ) {
        // First tick fires immediately: catch up on the cloud backlog
        // at startup. interval() panics on a zero period, so callers
        // that hand us one get a short ticker instead of a dead task.
        let period = cloud_poll_interval.max(Duration::from_millis(1));
        let mut poll = tokio::time::interval(period);

        loop {
            tokio::select! {
                cmd = commands_rx.recv() => match cmd {
                    Some(Command::PublishTimerState(state)) => {
                        self.publish_timer_state(state);
                    }
                    Some(Command::PublishSessionComplete(event)) => {
                        self.publish_session_complete(event).await;
                    }
                    None => break,
                },
                Some(event) = lan_events.recv() => {
                    if let LanEvent::MessageReceived { message } = event {
                        self.handle_inbound(message, InboundPath::Lan).await;
                    } else {
                        tracing::debug!(?event, "lan event");
                    }
                }
                Some(message) = relay_events.recv() => {
                    self.handle_inbound(message, InboundPath::Relay).await;
                }
                _ = poll.tick() => self.poll_cloud().await,
            }
        }
        tracing::debug!("coordination loop finished");
    }

    /// Outgoing policy for timer state: LAN fan-out, relay tier 1/2,
    /// relay priority channel, cloud mirror. All legs independent;
    /// none blocks another or the loop.
    fn publish_timer_state(&mut self, state: TimerStateMessage) {
        self.merge.lock().unwrap().apply_timer_state(&state);
        let message = WireMessage::TimerState(state.clone());

        let lan = Arc::clone(&self.lan);
        let lan_message = message.clone();
        tokio::spawn(async move {
            match lan.broadcast(&lan_message).await {
                Ok(peers) => tracing::debug!(peers, "timer state on lan"),
                Err(e) => tracing::warn!("lan broadcast failed: {e}"),
            }
        });

        let relay = Arc::clone(&self.relay);
        tokio::spawn(async move {
            match relay.send_timer_state(&state).await {
                Ok(tier) => tracing::debug!(?tier, "timer state on relay"),
                Err(e) => tracing::warn!("relay send failed: {e}"),
            }
            if let Err(e) = relay.send_priority(&state).await {
                tracing::warn!("relay priority send failed: {e}");
            }
        });

        let cloud = Arc::clone(&self.cloud);
        tokio::spawn(async move {
            if let Err(e) = cloud.push(&message).await {
                tracing::warn!("cloud push failed: {e}");
            }
        });
    }

    /// Outgoing policy for completed sessions: the durable local
    /// record is written first and is the source of truth; cloud,
    /// LAN and the relay's guaranteed queue are mirrors.
    async fn publish_session_complete(&mut self, event: SessionCompleteEvent) {
        match self.sessions.insert_if_absent(&event).await {
            Ok(true) => {
                let _ = self
                    .updates_tx
                    .send(SyncUpdate::SessionRecorded {
                        session_id: event.session_id,
                    })
                    .await;
            }
            Ok(false) => {
                tracing::debug!(session = %event.session_id, "session already recorded");
            }
            Err(e) => {
                // Mirrors still go out; another device's record can
                // cover for a broken local store.
                tracing::warn!("session store insert failed: {e}");
            }
        }

        let message = WireMessage::SessionComplete(event.clone());

        let cloud = Arc::clone(&self.cloud);
        let cloud_message = message.clone();
        tokio::spawn(async move {
            if let Err(e) = cloud.push(&cloud_message).await {
                tracing::warn!("cloud push failed: {e}");
            }
        });

        let lan = Arc::clone(&self.lan);
        tokio::spawn(async move {
            if let Err(e) = lan.broadcast(&message).await {
                tracing::warn!("lan broadcast failed: {e}");
            }
        });

        let relay = Arc::clone(&self.relay);
        tokio::spawn(async move {
            if let Err(e) = relay.enqueue_session_complete(&event).await {
                tracing::warn!("relay enqueue failed: {e}");
            }
        });
    }

    async fn handle_inbound(&mut self, message: WireMessage, path: InboundPath) {
        // Our own messages come back via cloud pulls and LAN echo
        // topologies; the merge would reject them anyway, but they
        // are not remote changes and must not be re-bridged.
        if message.origin() == self.local.id {
            tracing::trace!(?path, "ignoring own echo");
            return;
        }

        match message {
            WireMessage::TimerState(state) => {
                let outcome = self.merge.lock().unwrap().apply_timer_state(&state);
                if outcome == MergeOutcome::Stale {
                    tracing::debug!(origin = %state.origin, ?path, "stale timer state dropped");
                    return;
                }
                let _ = self
                    .updates_tx
                    .send(SyncUpdate::TimerUpdated {
                        origin: state.origin,
                        state: state.clone(),
                    })
                    .await;
                self.bridge_timer_state(state, path);
            }
            WireMessage::SessionComplete(event) => {
                match self.sessions.insert_if_absent(&event).await {
                    Ok(true) => {
                        let _ = self
                            .updates_tx
                            .send(SyncUpdate::SessionRecorded {
                                session_id: event.session_id,
                            })
                            .await;
                        self.bridge_session_complete(event, path);
                    }
                    Ok(false) => {
                        tracing::debug!(
                            session = %event.session_id,
                            ?path,
                            "duplicate session event dropped"
                        );
                    }
                    Err(e) => {
                        // Same posture as the outgoing mirrors: a store
                        // failure here must not cost the far side its
                        // copy of the event.
                        tracing::warn!("session store insert failed: {e}");
                        self.bridge_session_complete(event, path);
                    }
                }
            }
        }
    }

    /// Re-emit a freshly-applied remote snapshot on the transport it
    /// did not arrive on, keeping the original origin intact so the
    /// far side attributes it to the producing device, not to us.
    fn bridge_timer_state(&self, state: TimerStateMessage, path: InboundPath) {
        if !self.bridge_enabled {
            return;
        }
        match path {
            InboundPath::Lan => {
                let relay = Arc::clone(&self.relay);
                tokio::spawn(async move {
                    tracing::debug!(origin = %state.origin, "bridging timer state to relay");
                    if let Err(e) = relay.send_timer_state(&state).await {
                        tracing::warn!("bridge to relay failed: {e}");
                    }
                });
            }
            InboundPath::Relay => {
                let lan = Arc::clone(&self.lan);
                tokio::spawn(async move {
                    tracing::debug!(origin = %state.origin, "bridging timer state to lan");
                    if let Err(e) = lan.broadcast(&WireMessage::TimerState(state)).await {
                        tracing::warn!("bridge to lan failed: {e}");
                    }
                });
            }
            // Cloud arrivals are never re-bridged: every device pulls
            // the cloud on its own.
            InboundPath::Cloud => {}
        }
    }

    /// Same rule for session events; only events that just became a
    /// new local record travel onward, so a duplicate arriving on a
    /// second path cannot start a bridge loop.
    fn bridge_session_complete(&self, event: SessionCompleteEvent, path: InboundPath) {
        if !self.bridge_enabled {
            return;
        }
        match path {
            InboundPath::Lan => {
                let relay = Arc::clone(&self.relay);
                tokio::spawn(async move {
                    if let Err(e) = relay.enqueue_session_complete(&event).await {
                        tracing::warn!("bridge to relay failed: {e}");
                    }
                });
            }
            InboundPath::Relay => {
                let lan = Arc::clone(&self.lan);
                tokio::spawn(async move {
                    if let Err(e) = lan.broadcast(&WireMessage::SessionComplete(event)).await {
                        tracing::warn!("bridge to lan failed: {e}");
                    }
                });
            }
            InboundPath::Cloud => {}
        }
    }

    async fn poll_cloud(&mut self) {
        match self.cloud.pull(self.cursor).await {
            Ok((messages, next)) => {
                if !messages.is_empty() {
                    tracing::debug!(count = messages.len(), "cloud pull");
                }
                self.cursor = next;
                for message in messages {
                    self.handle_inbound(message, InboundPath::Cloud).await;
                }
            }
            // The cloud is slow but eventually correct; failures are
            // retried on the next tick.
            Err(e) => tracing::warn!("cloud pull failed: {e}"),
        }
    }
}
