//! LAN-scoped peer discovery.
//!
//! Each instance advertises a JSON beacon on a fixed multicast group
//! and browses the same group concurrently. The advertised instance
//! name embeds the first 8 characters of the device id, so an
//! instance that sees its own beacon in its browse results can skip
//! it without any further parsing.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sync_types::DeviceId;

/// Fixed, application-specific service type string.
pub const SERVICE_TYPE: &str = "_focus-sync._tcp";

/// Prefix of every advertised instance name.
pub const INSTANCE_PREFIX: &str = "FocusSync-";

/// Build the advertised instance name for a device.
pub fn instance_name(id: &DeviceId) -> String {
    format!("{INSTANCE_PREFIX}{}", id.short_prefix())
}

/// The JSON body of one discovery beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Service type the sender advertises under.
    pub service: String,
    /// Sender's instance name (`FocusSync-` + 8-char id prefix).
    pub instance: String,
    /// TCP port the sender is listening on.
    pub port: u16,
}

impl Announcement {
    /// Create a beacon for this instance.
    pub fn new(instance: &str, port: u16) -> Self {
        Self {
            service: SERVICE_TYPE.to_string(),
            instance: instance.to_string(),
            port,
        }
    }

    /// Whether the beacon is for our service type at all.
    pub fn is_service(&self) -> bool {
        self.service == SERVICE_TYPE
    }
}

/// Events emitted by the browse loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Another instance's beacon was seen.
    PeerSeen {
        /// The peer's advertised instance name.
        instance: String,
        /// The peer's TCP listen address.
        addr: SocketAddr,
    },
}

/// Handles to the running advertise + browse tasks.
pub(crate) struct DiscoveryTasks {
    announce: JoinHandle<()>,
    browse: JoinHandle<()>,
}

impl DiscoveryTasks {
    pub(crate) fn abort(&self) {
        self.announce.abort();
        self.browse.abort();
    }
}

/// Start advertising and browsing.
///
/// The browse socket binds the shared multicast port; if another
/// process on this host already holds it the bind error propagates so
/// the caller can degrade to direct connections only.
pub(crate) async fn spawn_discovery(
    instance: String,
    tcp_port: u16,
    group: Ipv4Addr,
    multicast_port: u16,
    announce_interval: Duration,
    events: mpsc::Sender<DiscoveryEvent>,
) -> std::io::Result<DiscoveryTasks> {
    let browse_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, multicast_port)).await?;
    browse_socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;

    let announce_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;

    let beacon = serde_json::to_vec(&Announcement::new(&instance, tcp_port))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let dest = SocketAddr::from((group, multicast_port));

    // interval() panics on a zero period; keep the announce task alive
    // even if the caller configures one.
    let period = announce_interval.max(Duration::from_millis(1));
    let announce = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = announce_socket.send_to(&beacon, dest).await {
                tracing::debug!("beacon send failed: {e}");
            }
        }
    });

    let own_instance = instance;
    let browse = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let (n, from) = match browse_socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::debug!("browse receive failed: {e}");
                    break;
                }
            };
            let announcement: Announcement = match serde_json::from_slice(&buf[..n]) {
                Ok(a) => a,
                // Unrelated traffic on the group is expected; ignore it.
                Err(_) => continue,
            };
            if !announcement.is_service() || announcement.instance == own_instance {
                continue;
            }
            let addr = SocketAddr::new(from.ip(), announcement.port);
            let event = DiscoveryEvent::PeerSeen {
                instance: announcement.instance,
                addr,
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok(DiscoveryTasks { announce, browse })
}
