//! TCP acceptor: socket options, per-IP admission control, and the shared
//! connection set.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferrum_proto::registry::Packet;
use ferrum_proto::types::Phase;
use ferrum_world::chunk::monotonic_ms;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::server::ServerState;

/// How often the janitor sweeps closed connections out of the set.
const JANITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Thread-safe set of live connections plus admission bookkeeping.
pub struct Acceptor {
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    next_id: AtomicU64,
    /// Last accepted connection per address, for throttling.
    throttle: Mutex<HashMap<IpAddr, u64>>,
}

impl Acceptor {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            throttle: Mutex::new(HashMap::new()),
        }
    }

    /// Connections not yet torn down.
    pub fn active_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .values()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Connections currently in PLAY.
    pub fn play_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .values()
            .filter(|c| !c.is_closed() && c.phase() == Phase::Play)
            .count()
    }

    fn active_for_ip(&self, ip: IpAddr) -> usize {
        self.connections
            .lock()
            .unwrap()
            .values()
            .filter(|c| !c.is_closed() && c.addr().ip() == ip)
            .count()
    }

    /// Send a packet to every PLAY connection.
    pub fn broadcast_play(&self, packet: &Packet) {
        let connections: Vec<Arc<Connection>> = {
            let map = self.connections.lock().unwrap();
            map.values()
                .filter(|c| !c.is_closed() && c.phase() == Phase::Play)
                .cloned()
                .collect()
        };
        for connection in connections {
            connection.send_packet(packet);
        }
    }

    pub fn close_all(&self) {
        let connections: Vec<Arc<Connection>> = {
            self.connections.lock().unwrap().values().cloned().collect()
        };
        for connection in connections {
            connection.close();
        }
    }

    /// Drop closed connections and prune stale throttle entries.
    pub fn sweep(&self) {
        let removed = {
            let mut map = self.connections.lock().unwrap();
            let before = map.len();
            map.retain(|_, connection| !connection.is_closed());
            before - map.len()
        };
        if removed > 0 {
            debug!("Janitor removed {removed} closed connections");
        }

        let now = monotonic_ms();
        self.throttle
            .lock()
            .unwrap()
            .retain(|_, &mut last| now.saturating_sub(last) < 60_000);
    }

    /// Admission control plus connection spawn for one accepted socket.
    fn handle_accept(&self, state: &Arc<ServerState>, stream: TcpStream, peer: SocketAddr) {
        let security = &state.config.security;
        let ip = peer.ip();
        let now = monotonic_ms();

        {
            let mut throttle = self.throttle.lock().unwrap();
            if let Some(&last) = throttle.get(&ip) {
                if now.saturating_sub(last) < security.connection_throttle {
                    debug!("Throttled connection attempt from {peer}");
                    return;
                }
            }
            throttle.insert(ip, now);
        }

        if self.active_for_ip(ip) >= security.max_connections_per_ip as usize {
            info!("Refused {peer}: too many connections from {ip}");
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (connection, outbound_rx) = Connection::new(
            id,
            peer,
            state.perf.clone(),
            security.packet_limit_per_second,
        );
        self.connections.lock().unwrap().insert(id, connection.clone());
        state.perf.record_connection();
        info!("Connection from {peer}");

        let state = state.clone();
        tokio::spawn(connection.run(state, stream, outbound_rx));
    }
}

impl Default for Acceptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind the listening socket with `reuse_address` set.
pub fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

/// Accept until shutdown, handing each socket to a fresh connection.
pub async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => state.acceptor.handle_accept(&state, stream, peer),
                Err(e) => warn!("Accept error: {e}"),
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Acceptor stopped");
}

/// Periodic sweep of the connection set.
pub async fn janitor_loop(state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(JANITOR_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => state.acceptor.sweep(),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
