//! Platform link abstraction for the constrained peer.
//!
//! The wearable cannot run the LAN stack, so all traffic to it goes
//! through a platform-provided channel with several delivery tiers.
//! This module defines that contract and a mock used throughout the
//! test suites.
//!
//! # Design
//!
//! The trait is payload-oriented: every method takes already-encoded
//! message bytes, keeping the platform layer free of message types.
//! - `send_instant()` best-effort, only while the peer is reachable
//! - `publish_standing_context()` last-value-wins snapshot slot
//! - `enqueue_guaranteed()` FIFO at-least-once background queue
//! - `send_priority()` rate-limited glanceable-surface channel
//! - `recv()` inbound payloads from the peer

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

/// Errors surfaced by the platform link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The platform layer rejected the operation.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Result of a tier-1 instant send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantOutcome {
    /// The peer was reachable and accepted the payload.
    Delivered,
    /// The peer is not currently reachable; nothing was queued.
    Unreachable,
}

/// Result of a priority-channel send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityOutcome {
    /// The payload was accepted.
    Delivered,
    /// The platform's own budget for this channel ran out.
    QuotaExhausted,
}

/// One payload received from the constrained peer.
#[derive(Debug, Clone)]
pub struct RelayInbound {
    /// Encoded wire message bytes.
    pub payload: Vec<u8>,
    /// Platform-provided hint about the sender, when available.
    pub origin_hint: Option<String>,
}

/// Contract to the constrained-peer platform layer.
#[async_trait]
pub trait RelayLink: Send + Sync {
    /// Whether this process can reach the platform channel at all.
    ///
    /// When false, the relay transport stays inactive forever and
    /// every send becomes a no-op.
    fn is_supported(&self) -> bool;

    /// Tier 1: deliver now or report the peer unreachable.
    async fn send_instant(&self, payload: &[u8]) -> Result<InstantOutcome, LinkError>;

    /// Tier 2: replace the standing "current context" snapshot.
    ///
    /// Only the latest value is kept; the peer reads it on next wake.
    async fn publish_standing_context(&self, payload: &[u8]) -> Result<(), LinkError>;

    /// Tier 3: append to the guaranteed FIFO queue.
    async fn enqueue_guaranteed(&self, payload: &[u8]) -> Result<(), LinkError>;

    /// Priority channel: deliver to the glanceable surface, or report
    /// the platform's quota exhausted.
    async fn send_priority(&self, payload: &[u8]) -> Result<PriorityOutcome, LinkError>;

    /// Next inbound payload from the peer; `None` once the link is
    /// permanently closed.
    async fn recv(&self) -> Option<RelayInbound>;
}

/// Mock link for testing.
///
/// Allows toggling reachability and quota, capturing sends per tier,
/// and pushing inbound payloads.
#[derive(Debug, Default)]
pub struct MockRelayLink {
    inner: Arc<Mutex<MockRelayLinkInner>>,
    inbound_ready: Arc<Notify>,
}

#[derive(Debug)]
struct MockRelayLinkInner {
    supported: bool,
    reachable: bool,
    platform_quota_exhausted: bool,
    instant_sends: Vec<Vec<u8>>,
    standing_context: Option<Vec<u8>>,
    guaranteed_queue: Vec<Vec<u8>>,
    priority_sends: Vec<Vec<u8>>,
    inbound: VecDeque<RelayInbound>,
    closed: bool,
}

impl Default for MockRelayLinkInner {
    fn default() -> Self {
        Self {
            supported: true,
            reachable: true,
            platform_quota_exhausted: false,
            instant_sends: Vec::new(),
            standing_context: None,
            guaranteed_queue: Vec::new(),
            priority_sends: Vec::new(),
            inbound: VecDeque::new(),
            closed: false,
        }
    }
}

impl MockRelayLink {
    /// Create a supported, reachable mock link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a link whose platform support is absent.
    pub fn unsupported() -> Self {
        let link = Self::default();
        link.inner.lock().unwrap().supported = false;
        link
    }

    /// Toggle whether tier-1 sends find the peer reachable.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().unwrap().reachable = reachable;
    }

    /// Make the priority channel report its quota exhausted.
    pub fn set_platform_quota_exhausted(&self, exhausted: bool) {
        self.inner.lock().unwrap().platform_quota_exhausted = exhausted;
    }

    /// All payloads accepted by tier 1.
    pub fn instant_sends(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().instant_sends.clone()
    }

    /// The current standing-context snapshot, if any.
    pub fn standing_context(&self) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().standing_context.clone()
    }

    /// Everything placed on the guaranteed queue, in order.
    pub fn guaranteed_queue(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().guaranteed_queue.clone()
    }

    /// All payloads accepted by the priority channel.
    pub fn priority_sends(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().priority_sends.clone()
    }

    /// Push an inbound payload as if the peer had sent it.
    pub fn push_inbound(&self, payload: Vec<u8>, origin_hint: Option<String>) {
        self.inner.lock().unwrap().inbound.push_back(RelayInbound {
            payload,
            origin_hint,
        });
        self.inbound_ready.notify_one();
    }

    /// Close the inbound side; `recv()` returns `None` once drained.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.inbound_ready.notify_one();
    }
}

impl Clone for MockRelayLink {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            inbound_ready: Arc::clone(&self.inbound_ready),
        }
    }
}

#[async_trait]
impl RelayLink for MockRelayLink {
    fn is_supported(&self) -> bool {
        self.inner.lock().unwrap().supported
    }

    async fn send_instant(&self, payload: &[u8]) -> Result<InstantOutcome, LinkError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.reachable {
            return Ok(InstantOutcome::Unreachable);
        }
        inner.instant_sends.push(payload.to_vec());
        Ok(InstantOutcome::Delivered)
    }

    async fn publish_standing_context(&self, payload: &[u8]) -> Result<(), LinkError> {
        self.inner.lock().unwrap().standing_context = Some(payload.to_vec());
        Ok(())
    }

    async fn enqueue_guaranteed(&self, payload: &[u8]) -> Result<(), LinkError> {
        self.inner
            .lock()
            .unwrap()
            .guaranteed_queue
            .push(payload.to_vec());
        Ok(())
    }

    async fn send_priority(&self, payload: &[u8]) -> Result<PriorityOutcome, LinkError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.platform_quota_exhausted {
            return Ok(PriorityOutcome::QuotaExhausted);
        }
        inner.priority_sends.push(payload.to_vec());
        Ok(PriorityOutcome::Delivered)
    }

    async fn recv(&self) -> Option<RelayInbound> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(item) = inner.inbound.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            self.inbound_ready.notified().await;
        }
    }
}
