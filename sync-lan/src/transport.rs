//! The LAN peer transport.
//!
//! Owns the TCP listener, the discovery tasks and the live connection
//! registry. All I/O runs on spawned tasks; callers interact through
//! async sends and the [`LanEvent`] stream.

use dashmap::DashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sync_types::{encode_frame, CodecError, DeviceId, DeviceRecord, FrameError, WireMessage};

use crate::connection::{
    run_receive_loop, ConnectionHandle, ConnectionId, ConnectionInfo, ConnectionState,
};
use crate::discovery::{self, instance_name, DiscoveryEvent, DiscoveryTasks};

/// LAN transport errors.
#[derive(Debug, Error)]
pub enum LanError {
    /// Socket operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Outgoing message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Outgoing message could not be framed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The transport was already stopped.
    #[error("transport stopped")]
    Stopped,
}

/// Configuration for the LAN transport.
#[derive(Debug, Clone)]
pub struct LanConfig {
    /// TCP listen port; 0 picks an ephemeral port.
    pub listen_port: u16,
    /// Whether to run multicast discovery at all.
    pub enable_discovery: bool,
    /// Multicast group for discovery beacons.
    pub multicast_group: Ipv4Addr,
    /// Shared UDP port for discovery beacons.
    pub multicast_port: u16,
    /// How often to re-advertise.
    pub announce_interval: Duration,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            enable_discovery: true,
            multicast_group: Ipv4Addr::new(239, 255, 70, 83),
            multicast_port: 53530,
            announce_interval: Duration::from_secs(5),
        }
    }
}

/// Events the transport delivers to its single subscriber.
#[derive(Debug, Clone)]
pub enum LanEvent {
    /// A connection was established (either direction).
    PeerConnected {
        /// Transport-local connection id.
        connection_id: ConnectionId,
        /// Remote socket address.
        addr: SocketAddr,
    },
    /// The peer's device id was learned from its first message.
    PeerIdentified {
        /// Transport-local connection id.
        connection_id: ConnectionId,
        /// The peer's stable device id.
        device_id: DeviceId,
    },
    /// A connection closed and left the fan-out set.
    PeerDisconnected {
        /// Transport-local connection id.
        connection_id: ConnectionId,
    },
    /// A message arrived on any connection.
    MessageReceived {
        /// The decoded wire message.
        message: WireMessage,
    },
}

/// LAN-scoped peer transport: discovery + framed TCP fan-out.
pub struct LocalPeerTransport {
    local: DeviceRecord,
    instance: String,
    local_addr: SocketAddr,
    connections: Arc<DashMap<ConnectionId, Arc<ConnectionHandle>>>,
    next_id: AtomicU64,
    events_tx: mpsc::Sender<LanEvent>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    discovery_tasks: Mutex<Option<DiscoveryTasks>>,
    dial_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl LocalPeerTransport {
    /// Bind the listener, start discovery, and return the transport
    /// plus its event stream.
    ///
    /// If the discovery socket cannot be bound (e.g. another instance
    /// on this host holds the port) the transport still starts:
    /// direct dials and inbound connections keep working, matching
    /// the degrade-never-crash rule for missing platform capability.
    pub async fn start(
        local: DeviceRecord,
        config: LanConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<LanEvent>), LanError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.listen_port)).await?;
        let local_addr = listener.local_addr()?;
        let (events_tx, events_rx) = mpsc::channel(64);

        let transport = Arc::new(Self {
            local,
            instance: instance_name(&local.id),
            local_addr,
            connections: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            events_tx,
            accept_task: Mutex::new(None),
            discovery_tasks: Mutex::new(None),
            dial_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        tracing::info!(
            instance = %transport.instance,
            addr = %local_addr,
            "LAN transport listening"
        );

        // Accept loop.
        {
            let t = Arc::clone(&transport);
            let task = tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            tracing::debug!(%addr, "inbound peer connection");
                            t.register(stream, addr, None).await;
                        }
                        Err(e) => {
                            // Transient accept failures (fd pressure) should
                            // not kill the listener.
                            tracing::warn!("accept failed: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            });
            *transport.accept_task.lock().unwrap() = Some(task);
        }

        if config.enable_discovery {
            let (disc_tx, mut disc_rx) = mpsc::channel(16);
            match discovery::spawn_discovery(
                transport.instance.clone(),
                local_addr.port(),
                config.multicast_group,
                config.multicast_port,
                config.announce_interval,
                disc_tx,
            )
            .await
            {
                Ok(tasks) => {
                    *transport.discovery_tasks.lock().unwrap() = Some(tasks);
                    let t = Arc::clone(&transport);
                    let dial = tokio::spawn(async move {
                        while let Some(DiscoveryEvent::PeerSeen { instance, addr }) =
                            disc_rx.recv().await
                        {
                            if t.already_dialed(addr) {
                                continue;
                            }
                            tracing::debug!(%instance, %addr, "peer seen, dialing");
                            if let Err(e) = t.dial(addr, Some(addr)).await {
                                tracing::debug!("dial {addr} failed: {e}");
                            }
                        }
                    });
                    *transport.dial_task.lock().unwrap() = Some(dial);
                }
                Err(e) => {
                    tracing::warn!(
                        "LAN discovery unavailable ({e}); \
                         continuing with direct connections only"
                    );
                }
            }
        }

        Ok((transport, events_rx))
    }

    /// The identity this transport presents.
    pub fn local_record(&self) -> DeviceRecord {
        self.local
    }

    /// The advertised instance name.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// The TCP address this transport listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshots of every live connection.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections.iter().map(|c| c.info()).collect()
    }

    /// Dial a peer directly by address.
    ///
    /// Discovery does this automatically; the explicit form exists for
    /// callers (and tests) that already know the address.
    pub async fn connect_to(&self, addr: SocketAddr) -> Result<ConnectionId, LanError> {
        self.dial(addr, None).await
    }

    async fn dial(
        &self,
        addr: SocketAddr,
        advertised: Option<SocketAddr>,
    ) -> Result<ConnectionId, LanError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(LanError::Stopped);
        }
        let stream = TcpStream::connect(addr).await?;
        Ok(self.register(stream, addr, advertised).await)
    }

    /// True when a connection we dialed from a beacon for this address
    /// is still alive. Suppresses a re-dial on every announce tick;
    /// genuinely simultaneous dials from both sides still produce the
    /// duplicate connections the design tolerates.
    fn already_dialed(&self, addr: SocketAddr) -> bool {
        self.connections
            .iter()
            .any(|c| c.advertised == Some(addr) && c.state() == ConnectionState::Ready)
    }

    async fn register(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        advertised: Option<SocketAddr>,
    ) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(ConnectionHandle::new(id, addr, advertised, write_half));
        self.connections.insert(id, Arc::clone(&conn));

        let _ = self
            .events_tx
            .send(LanEvent::PeerConnected {
                connection_id: id,
                addr,
            })
            .await;

        conn.set_state(ConnectionState::Ready);
        let task = tokio::spawn(run_receive_loop(
            Arc::clone(&conn),
            read_half,
            Arc::clone(&self.connections),
            self.events_tx.clone(),
        ));
        conn.set_reader_task(task);
        id
    }

    /// Write the framed message to every `Ready` connection.
    ///
    /// Sends run concurrently; a peer that fails mid-send is dropped
    /// from the active set without blocking delivery to the others.
    /// Returns how many peers accepted the write.
    pub async fn broadcast(&self, message: &WireMessage) -> Result<usize, LanError> {
        let frame = encode_frame(&message.to_json_bytes()?)?;

        let targets: Vec<Arc<ConnectionHandle>> = self
            .connections
            .iter()
            .filter(|c| c.state() == ConnectionState::Ready)
            .map(|c| Arc::clone(c.value()))
            .collect();

        let mut sends = Vec::with_capacity(targets.len());
        for conn in targets {
            let frame = frame.clone();
            let connections = Arc::clone(&self.connections);
            let events = self.events_tx.clone();
            sends.push(tokio::spawn(async move {
                match conn.send_frame(&frame).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(
                            connection = conn.id,
                            "send to {} failed ({e}); dropping connection",
                            conn.addr
                        );
                        conn.set_state(ConnectionState::Closed);
                        conn.abort_reader();
                        connections.remove(&conn.id);
                        let _ = events
                            .send(LanEvent::PeerDisconnected {
                                connection_id: conn.id,
                            })
                            .await;
                        false
                    }
                }
            }));
        }

        let mut delivered = 0;
        for send in sends {
            if let Ok(true) = send.await {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Stop discovery, the listener, and every connection.
    ///
    /// Idempotent and safe from any state.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(instance = %self.instance, "LAN transport stopping");

        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(tasks) = self.discovery_tasks.lock().unwrap().take() {
            tasks.abort();
        }
        if let Some(task) = self.dial_task.lock().unwrap().take() {
            task.abort();
        }

        for entry in self.connections.iter() {
            entry.value().set_state(ConnectionState::Closing);
            entry.value().abort_reader();
            entry.value().set_state(ConnectionState::Closed);
        }
        self.connections.clear();
    }
}

impl Drop for LocalPeerTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
