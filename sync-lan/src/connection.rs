//! One live LAN connection.
//!
//! A connection is owned by the transport that created it; the
//! coordinator only observes it through [`LanEvent`]s. The receive
//! loop reads exactly 4 length bytes, then exactly that many payload
//! bytes, delivers one decoded message upward, and re-arms - so
//! exactly one message per connection is being parsed at any time.
//!
//! [`LanEvent`]: crate::LanEvent

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sync_types::{DeviceId, WireMessage, MAX_FRAME_SIZE};

use crate::transport::LanEvent;

/// Transport-local identifier for one connection.
pub type ConnectionId = u64;

/// Lifecycle of a connection. Only `Ready` connections send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP established, receive loop not yet armed.
    Connecting,
    /// Eligible to send and receiving.
    Ready,
    /// Shutdown requested, no longer eligible to send.
    Closing,
    /// Gone; about to leave the registry.
    Closed,
}

/// Observable snapshot of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Transport-local connection id.
    pub id: ConnectionId,
    /// Remote socket address.
    pub addr: SocketAddr,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Peer device id, known only once its first message arrives.
    pub remote_device_id: Option<DeviceId>,
    /// When a frame was last sent or received.
    pub last_activity: Instant,
}

pub(crate) struct ConnectionHandle {
    pub(crate) id: ConnectionId,
    pub(crate) addr: SocketAddr,
    /// The address the peer advertised, when this side dialed from a
    /// discovery beacon. Used to suppress re-dialing on every beacon.
    pub(crate) advertised: Option<SocketAddr>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    state: Mutex<ConnectionState>,
    remote_device_id: Mutex<Option<DeviceId>>,
    last_activity: Mutex<Instant>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: ConnectionId,
        addr: SocketAddr,
        advertised: Option<SocketAddr>,
        writer: OwnedWriteHalf,
    ) -> Self {
        Self {
            id,
            addr,
            advertised,
            writer: tokio::sync::Mutex::new(writer),
            state: Mutex::new(ConnectionState::Connecting),
            remote_device_id: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
            reader_task: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    pub(crate) fn remote_device_id(&self) -> Option<DeviceId> {
        *self.remote_device_id.lock().unwrap()
    }

    /// Record the peer id learned from its first message.
    ///
    /// Returns true only the first time, so the transport emits a
    /// single `PeerIdentified` event per connection.
    pub(crate) fn identify(&self, id: DeviceId) -> bool {
        let mut guard = self.remote_device_id.lock().unwrap();
        if guard.is_none() {
            *guard = Some(id);
            true
        } else {
            false
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub(crate) fn set_reader_task(&self, task: JoinHandle<()>) {
        *self.reader_task.lock().unwrap() = Some(task);
    }

    pub(crate) fn abort_reader(&self) {
        if let Some(task) = self.reader_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Write one already-framed message to the peer.
    pub(crate) async fn send_frame(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        self.touch();
        Ok(())
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            addr: self.addr,
            state: self.state(),
            remote_device_id: self.remote_device_id(),
            last_activity: *self.last_activity.lock().unwrap(),
        }
    }
}

/// Persistent receive loop for one connection.
///
/// Runs until a read fails or the frame stream is corrupt, then
/// removes the connection from the registry. A frame whose payload
/// fails JSON decoding is dropped and the loop continues - one bad
/// message never costs the connection.
pub(crate) async fn run_receive_loop(
    conn: Arc<ConnectionHandle>,
    mut reader: OwnedReadHalf,
    connections: Arc<DashMap<ConnectionId, Arc<ConnectionHandle>>>,
    events: mpsc::Sender<LanEvent>,
) {
    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            tracing::warn!(
                connection = conn.id,
                "peer declared oversized frame ({len} bytes); closing"
            );
            break;
        }
        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).await.is_err() {
            break;
        }
        conn.touch();

        match WireMessage::from_json_bytes(&payload) {
            Ok(message) => {
                if conn.identify(message.origin()) {
                    let identified = LanEvent::PeerIdentified {
                        connection_id: conn.id,
                        device_id: message.origin(),
                    };
                    if events.send(identified).await.is_err() {
                        break;
                    }
                }
                if events
                    .send(LanEvent::MessageReceived { message })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(connection = conn.id, "dropping undecodable frame: {e}");
            }
        }
    }

    conn.set_state(ConnectionState::Closed);
    connections.remove(&conn.id);
    let _ = events
        .send(LanEvent::PeerDisconnected {
            connection_id: conn.id,
        })
        .await;
}
