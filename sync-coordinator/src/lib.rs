//! Sync coordination for focus-sync.
//!
//! One [`SyncCoordinator`] per device owns the LAN and relay
//! transports plus the cloud cursor. Local state changes fan out
//! across every viable path; inbound messages from any path fold
//! into a per-origin merged view; on hub devices (phones, by
//! default) freshly-applied messages are bridged between the two
//! transports with their original origin intact.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cloud;
mod config;
mod coordinator;
mod merge;
mod store;

pub use cloud::{CloudCursor, CloudError, CloudStore, MockCloudStore};
pub use config::{
    BridgeSection, CloudSection, ConfigError, LanSection, RelaySection, SyncConfig,
};
pub use coordinator::{CoordinatorError, SyncCoordinator, SyncUpdate};
pub use merge::{MergeOutcome, MergeState};
pub use store::{MemorySessionStore, SessionStore, StoreError};
