//! The tiered relay transport.
//!
//! Wraps a [`RelayLink`] and picks the least-lossy delivery tier that
//! is currently available, tracking the priority channel's daily
//! budget locally so exhaustion never surfaces as an error.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sync_types::{
    unix_now_seconds, CodecError, SessionCompleteEvent, TimerStateMessage, WireMessage,
};

use crate::link::{InstantOutcome, LinkError, PriorityOutcome, RelayLink};
use crate::quota::PriorityQuota;

/// Relay transport errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Outgoing message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The platform link failed.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Activation state of the relay transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Not yet activated, or platform support is absent.
    Inactive,
    /// Activation in progress.
    Activating,
    /// Inbound pump running, sends flow to the link.
    Active,
}

/// Which tier carried a timer-state payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTier {
    /// Tier 1: delivered while the peer was reachable.
    Instant,
    /// Tier 2: parked as the standing context for next wake.
    StandingContext,
}

/// Configuration for the relay transport.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Daily budget for the priority channel.
    pub priority_daily_limit: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            priority_daily_limit: crate::quota::DEFAULT_PRIORITY_DAILY_LIMIT,
        }
    }
}

/// Transport to the constrained wearable peer.
///
/// Generic over the platform link so tests run against
/// [`MockRelayLink`](crate::MockRelayLink).
pub struct RelayTransport<L: RelayLink + 'static> {
    link: Arc<L>,
    activation: Mutex<Activation>,
    quota: Mutex<PriorityQuota>,
    events_tx: mpsc::Sender<WireMessage>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

impl<L: RelayLink + 'static> RelayTransport<L> {
    /// Create the transport around a platform link.
    ///
    /// Returns the transport plus the stream of decoded inbound
    /// messages. Nothing flows until [`activate`](Self::activate).
    pub fn new(link: L, config: RelayConfig) -> (Arc<Self>, mpsc::Receiver<WireMessage>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            link: Arc::new(link),
            activation: Mutex::new(Activation::Inactive),
            quota: Mutex::new(PriorityQuota::new(config.priority_daily_limit)),
            events_tx,
            pump_task: Mutex::new(None),
        });
        (transport, events_rx)
    }

    /// Current activation state.
    pub fn activation(&self) -> Activation {
        *self.activation.lock().unwrap()
    }

    /// Start the inbound pump and open the send tiers.
    ///
    /// Idempotent. When the platform link is unsupported the
    /// transport stays `Inactive` permanently and every send becomes
    /// a no-op, so callers need no capability checks.
    pub fn activate(self: &Arc<Self>) {
        {
            let mut activation = self.activation.lock().unwrap();
            if *activation != Activation::Inactive {
                return;
            }
            if !self.link.is_supported() {
                tracing::info!("relay platform unsupported; transport stays inactive");
                return;
            }
            *activation = Activation::Activating;
        }

        let t = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(inbound) = t.link.recv().await {
                match WireMessage::from_json_bytes(&inbound.payload) {
                    Ok(message) => {
                        if t.events_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Bad payloads from the peer are dropped, the
                        // link stays up.
                        tracing::warn!(
                            origin_hint = ?inbound.origin_hint,
                            "dropping undecodable relay payload: {e}"
                        );
                    }
                }
            }
            tracing::debug!("relay inbound pump finished");
        });
        *self.pump_task.lock().unwrap() = Some(task);
        *self.activation.lock().unwrap() = Activation::Active;
        tracing::info!("relay transport active");
    }

    /// Send a timer-state snapshot via the best available tier.
    ///
    /// Tier 1 first; if the peer is unreachable the payload replaces
    /// the tier-2 standing context instead, superseding any older
    /// snapshot. Returns the tier that carried it, or `None` when the
    /// transport is inactive.
    pub async fn send_timer_state(
        &self,
        state: &TimerStateMessage,
    ) -> Result<Option<SendTier>, RelayError> {
        if self.activation() != Activation::Active {
            return Ok(None);
        }
        let payload = WireMessage::TimerState(state.clone()).to_json_bytes()?;

        match self.link.send_instant(&payload).await? {
            InstantOutcome::Delivered => Ok(Some(SendTier::Instant)),
            InstantOutcome::Unreachable => {
                tracing::debug!("peer unreachable; parking snapshot as standing context");
                self.link.publish_standing_context(&payload).await?;
                Ok(Some(SendTier::StandingContext))
            }
        }
    }

    /// Send a timer-state snapshot on the rate-limited priority
    /// channel that drives the peer's glanceable countdown surface.
    ///
    /// Returns true when the payload went out. Quota exhaustion, both
    /// local and platform-reported, is a silent skip.
    pub async fn send_priority(&self, state: &TimerStateMessage) -> Result<bool, RelayError> {
        if self.activation() != Activation::Active {
            return Ok(false);
        }

        let now = unix_now_seconds() as u64;
        if !self.quota.lock().unwrap().try_consume(now) {
            tracing::debug!("priority send skipped: daily quota exhausted");
            return Ok(false);
        }

        let payload = WireMessage::TimerState(state.clone()).to_json_bytes()?;
        match self.link.send_priority(&payload).await? {
            PriorityOutcome::Delivered => Ok(true),
            PriorityOutcome::QuotaExhausted => {
                tracing::warn!("platform reported priority quota exhausted");
                Ok(false)
            }
        }
    }

    /// Place a session-complete event on the guaranteed FIFO queue.
    ///
    /// The platform drains the queue in the background even while the
    /// peer is not running.
    pub async fn enqueue_session_complete(
        &self,
        event: &SessionCompleteEvent,
    ) -> Result<(), RelayError> {
        if self.activation() != Activation::Active {
            return Ok(());
        }
        let payload = WireMessage::SessionComplete(event.clone()).to_json_bytes()?;
        self.link.enqueue_guaranteed(&payload).await?;
        Ok(())
    }

    /// Priority sends skipped so far because the local budget ran out.
    pub fn priority_skip_count(&self) -> u64 {
        self.quota.lock().unwrap().skipped()
    }

    /// Stop the inbound pump. Idempotent.
    pub fn shutdown(&self) {
        if let Some(task) = self.pump_task.lock().unwrap().take() {
            task.abort();
        }
        *self.activation.lock().unwrap() = Activation::Inactive;
    }
}

impl<L: RelayLink + 'static> Drop for RelayTransport<L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
