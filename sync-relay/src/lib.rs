//! Tiered relay transport to the constrained wearable peer.
//!
//! The wearable cannot participate in LAN discovery, so traffic to it
//! rides a platform channel with distinct delivery tiers:
//!
//! 1. instant best-effort while the peer is reachable
//! 2. a last-value-wins standing context read on next wake
//! 3. a guaranteed FIFO queue for session-complete events
//!
//! plus a rate-limited priority channel for the peer's glanceable
//! countdown surface. [`RelayTransport`] picks the least-lossy tier
//! available and enforces the priority channel's daily budget.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod link;
mod quota;
mod transport;

pub use link::{
    InstantOutcome, LinkError, MockRelayLink, PriorityOutcome, RelayInbound, RelayLink,
};
pub use quota::{PriorityQuota, DEFAULT_PRIORITY_DAILY_LIMIT};
pub use transport::{Activation, RelayConfig, RelayError, RelayTransport, SendTier};
