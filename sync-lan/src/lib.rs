//! # focus-sync-lan
//!
//! The LAN real-time channel between full-capability peers: UDP
//! multicast service discovery plus short-lived TCP connections
//! carrying length-prefixed JSON wire messages, targeting sub-second
//! delivery when both peers are online and reachable.
//!
//! Both advertising and browsing run concurrently for the lifetime of
//! the transport; either side may initiate the connection that ends up
//! carrying traffic in both directions. Duplicate simultaneous
//! connections between the same pair of peers are tolerated rather
//! than tie-broken - message merging upstream is idempotent, so
//! redundant delivery is harmless.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod connection;
mod discovery;
mod transport;

pub use connection::{ConnectionId, ConnectionInfo, ConnectionState};
pub use discovery::{instance_name, Announcement, DiscoveryEvent, INSTANCE_PREFIX, SERVICE_TYPE};
pub use transport::{LanConfig, LanError, LanEvent, LocalPeerTransport};
