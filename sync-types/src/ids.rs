//! Device and session identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, opaque identifier for one device install.
///
/// Backed by a UUID and carried on the wire as its hyphenated string
/// form. The same device presents the same id to every transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(uuid::Uuid);

impl DeviceId {
    /// Create a new random DeviceId.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a DeviceId from its string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// The first 8 characters of the string form.
    ///
    /// Embedded in the advertised service instance name so a peer can
    /// recognize and skip its own advertisement.
    pub fn short_prefix(&self) -> String {
        self.to_string()[..8].to_string()
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.short_prefix())
    }
}

/// The broad capability class of a device.
///
/// Desktop, phone and tablet peers run the full LAN stack; wearable
/// peers are reachable only through the relay transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceClass {
    /// Desktop-class peer (full LAN stack).
    Desktop,
    /// Phone-class peer (full LAN stack, can also reach the wearable).
    Phone,
    /// Tablet-class peer (full LAN stack).
    Tablet,
    /// Constrained wearable peer (relay transport only).
    Wearable,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Phone => "phone",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Wearable => "wearable",
        };
        write!(f, "{name}")
    }
}

/// The identity a device presents to every transport.
///
/// Created once per install and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable per-install identifier.
    pub id: DeviceId,
    /// Capability class of this device.
    pub class: DeviceClass,
}

impl DeviceRecord {
    /// Create a record from an id and class.
    pub fn new(id: DeviceId, class: DeviceClass) -> Self {
        Self { id, class }
    }
}

/// Globally unique identifier for a completed focus session.
///
/// The idempotency key for durable session records: the same event
/// delivered twice must not create two records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Create a new random SessionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a SessionId from its string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}
