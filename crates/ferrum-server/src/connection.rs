//! Per-socket connection: frame assembly, serialized writes, the protocol
//! phase machine, and keep-alive liveness.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use ferrum_proto::buffer::PacketBuffer;
use ferrum_proto::error::ProtoError;
use ferrum_proto::packets::{
    ClientboundKeepAlive, JoinGame, LoginStart, LoginSuccess, PingResponse, PlayerPositionAndLook,
    StatusResponse,
};
use ferrum_proto::registry::{encode_frame, Packet};
use ferrum_proto::types::{
    is_valid_username, Direction, GameMode, GameProfile, Location, Phase, Uuid,
};
use ferrum_proto::PROTOCOL_VERSION;
use ferrum_world::chunk::monotonic_ms;
use ferrum_world::generator::Generator;

use crate::perf::PerfMonitor;
use crate::player::{self, PlayerSession};
use crate::server::ServerState;

/// Frames longer than this are treated as a protocol violation.
pub const MAX_FRAME_BYTES: usize = 1 << 21;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(20);
const KEEP_ALIVE_TIMEOUT_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Fixed-window counter: at most `max_rate` events per window.
#[derive(Debug)]
pub struct RateLimit {
    last_reset_ms: u64,
    count: u32,
    max_rate: u32,
    window_ms: u64,
}

impl RateLimit {
    pub fn new(max_rate: u32, window_ms: u64) -> Self {
        Self {
            last_reset_ms: monotonic_ms(),
            count: 0,
            max_rate,
            window_ms,
        }
    }

    pub fn allow(&mut self) -> bool {
        let now = monotonic_ms();
        if now.saturating_sub(self.last_reset_ms) >= self.window_ms {
            self.last_reset_ms = now;
            self.count = 0;
        }
        if self.count < self.max_rate {
            self.count += 1;
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Frame assembly
// ---------------------------------------------------------------------------

/// Slice one complete frame off the accumulation buffer.
///
/// Returns `Ok(None)` while the length prefix or body is incomplete; the
/// caller waits for more bytes. Errors are fatal for the connection.
pub fn try_extract_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, ProtoError> {
    let mut length: u32 = 0;
    let mut consumed = 0;
    loop {
        if consumed >= buf.len() {
            return Ok(None);
        }
        let byte = buf[consumed];
        length |= ((byte & 0x7F) as u32) << (7 * consumed);
        consumed += 1;
        if byte & 0x80 == 0 {
            break;
        }
        if consumed == 5 {
            return Err(ProtoError::Overlong { max_bytes: 5 });
        }
    }

    let length = length as i32;
    if length < 0 || length as usize > MAX_FRAME_BYTES {
        return Err(ProtoError::FrameTooLarge {
            len: length.max(0) as usize,
            max: MAX_FRAME_BYTES,
        });
    }
    let length = length as usize;
    if buf.len() - consumed < length {
        return Ok(None);
    }

    buf.advance(consumed);
    Ok(Some(buf.split_to(length).freeze()))
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub enum WriteItem {
    Frame(Bytes),
    /// Flush everything queued ahead of it, then shut the socket down.
    Shutdown,
}

#[derive(Debug)]
pub struct Connection {
    id: u64,
    addr: SocketAddr,
    phase: AtomicU8,
    closed: AtomicBool,
    close_notify: Notify,
    outbound: UnboundedSender<WriteItem>,
    last_keep_alive_ms: AtomicU64,
    profile: Mutex<Option<GameProfile>>,
    entity_id: AtomicU32,
    location: Mutex<Location>,
    packet_limiter: Mutex<RateLimit>,
    perf: Arc<PerfMonitor>,
}

impl Connection {
    /// Build a connection plus the receiver its writer task drains. The
    /// receiver is handed back so tests can observe outbound frames without
    /// a socket.
    pub fn new(
        id: u64,
        addr: SocketAddr,
        perf: Arc<PerfMonitor>,
        packet_limit_per_second: u32,
    ) -> (Arc<Self>, UnboundedReceiver<WriteItem>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id,
            addr,
            phase: AtomicU8::new(Phase::Handshaking as u8),
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            outbound,
            last_keep_alive_ms: AtomicU64::new(0),
            profile: Mutex::new(None),
            entity_id: AtomicU32::new(0),
            location: Mutex::new(Location::default()),
            packet_limiter: Mutex::new(RateLimit::new(packet_limit_per_second, 1000)),
            perf,
        });
        (connection, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire)).unwrap_or(Phase::Handshaking)
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn profile(&self) -> Option<GameProfile> {
        self.profile.lock().unwrap().clone()
    }

    pub fn entity_id(&self) -> u32 {
        self.entity_id.load(Ordering::Relaxed)
    }

    pub fn last_keep_alive_ms(&self) -> u64 {
        self.last_keep_alive_ms.load(Ordering::Relaxed)
    }

    /// Queue a packet for this connection. A no-op once closed.
    pub fn send_packet(&self, packet: &Packet) {
        if self.is_closed() {
            return;
        }
        let frame = encode_frame(packet);
        let _ = self.outbound.send(WriteItem::Frame(frame));
    }

    /// Idempotent close: queued frames still flush, then the socket shuts
    /// down and pending reads are woken.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outbound.send(WriteItem::Shutdown);
        self.close_notify.notify_waiters();
    }

    /// Drive the socket until EOF, error, or close.
    pub async fn run(
        self: Arc<Self>,
        state: Arc<ServerState>,
        stream: TcpStream,
        outbound_rx: UnboundedReceiver<WriteItem>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {e}", self.addr);
        }

        let (mut read_half, write_half) = stream.into_split();
        let writer = tokio::spawn(write_loop(self.clone(), write_half, outbound_rx));

        let buffer_size = state.config.performance.network_buffer_size.max(1024);
        let mut buf = BytesMut::with_capacity(buffer_size);

        loop {
            tokio::select! {
                result = read_half.read_buf(&mut buf) => match result {
                    Ok(0) => {
                        debug!("Connection {} reached EOF", self.addr);
                        self.close();
                        break;
                    }
                    Ok(_) => {
                        if !self.drain_frames(&state, &mut buf) {
                            break;
                        }
                    }
                    Err(e) => {
                        info!("Read error from {}: {e}", self.addr);
                        self.close();
                        break;
                    }
                },
                _ = self.close_notify.notified() => break,
            }
            if self.is_closed() {
                break;
            }
        }

        self.close();
        let _ = writer.await;

        if let Some(profile) = self.profile() {
            if let Some(session) = state.players.by_uuid(&profile.uuid) {
                session.set_online(false);
                info!("Player {} disconnected", profile.username);
            }
        }
        debug!("Connection {} torn down", self.addr);
    }

    /// Process every complete frame in the buffer. Returns false when the
    /// connection died.
    pub fn drain_frames(self: &Arc<Self>, state: &Arc<ServerState>, buf: &mut BytesMut) -> bool {
        loop {
            match try_extract_frame(buf) {
                Ok(Some(frame)) => {
                    if !self.packet_limiter.lock().unwrap().allow() {
                        warn!("Connection {} exceeded the packet rate limit", self.addr);
                        self.close();
                        return false;
                    }
                    self.perf.record_packet(frame.len());
                    if let Err(e) = self.process_frame(state, &frame) {
                        warn!("Connection {}: {e}", self.addr);
                        self.close();
                        return false;
                    }
                    if self.is_closed() {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    warn!("Bad frame from {}: {e}", self.addr);
                    self.close();
                    return false;
                }
            }
        }
    }

    /// Decode and dispatch one packet frame.
    ///
    /// Unknown ids are dropped to stay compatible with harmless packets this
    /// server does not model; every other failure is fatal.
    fn process_frame(self: &Arc<Self>, state: &Arc<ServerState>, frame: &[u8]) -> Result<(), ProtoError> {
        let mut buf = PacketBuffer::from_bytes(frame);
        let id = buf.read_varint()?;
        let phase = self.phase();

        let packet = match state.registry.decode(phase, Direction::Serverbound, id, &mut buf) {
            Ok(packet) => packet,
            Err(e) if e.is_recoverable() => {
                debug!("Dropping packet from {}: {e}", self.addr);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match packet {
            Packet::Handshake(handshake) => {
                if handshake.protocol_version != PROTOCOL_VERSION {
                    return Err(ProtoError::ProtocolVersionMismatch {
                        expected: PROTOCOL_VERSION,
                        got: handshake.protocol_version,
                    });
                }
                match handshake.next_phase() {
                    Some(next) => {
                        debug!(
                            "Connection {} handshake -> {next:?} (host {}:{})",
                            self.addr, handshake.server_address, handshake.server_port
                        );
                        self.set_phase(next);
                    }
                    None => {
                        return Err(ProtoError::InvalidData(format!(
                            "handshake next_state {}",
                            handshake.next_state
                        )))
                    }
                }
            }

            Packet::StatusRequest(_) => {
                let response = StatusResponse::build(
                    &state.config.server.motd,
                    state.config.server.max_players,
                    state.players.online_count() as u32,
                );
                self.send_packet(&Packet::StatusResponse(response));
            }

            Packet::PingRequest(ping) => {
                self.send_packet(&Packet::PingResponse(PingResponse {
                    payload: ping.payload,
                }));
                self.close();
            }

            Packet::LoginStart(login) => self.handle_login(state, login),

            Packet::ServerboundKeepAlive(_) => {
                self.last_keep_alive_ms.store(monotonic_ms(), Ordering::Relaxed);
            }

            Packet::PlayerPosition(position) => self.handle_player_position(state, position),

            other => {
                debug!("Ignoring {} from {}", other.name(), self.addr);
            }
        }
        Ok(())
    }

    fn handle_login(self: &Arc<Self>, state: &Arc<ServerState>, login: LoginStart) {
        if !is_valid_username(&login.username) {
            info!(
                "Rejected login from {} with invalid username {:?}",
                self.addr, login.username
            );
            self.close();
            return;
        }

        let uuid = if state.config.server.online_mode && !login.uuid.is_zero() {
            login.uuid
        } else {
            Uuid::offline(&login.username)
        };
        let profile = GameProfile {
            uuid,
            username: login.username.clone(),
        };

        let session = match state.players.create(self.clone(), profile.clone()) {
            Ok(session) => session,
            Err(player::RegistryError::Duplicate) => {
                warn!("{} is already online, closing {}", login.username, self.addr);
                self.close();
                return;
            }
            Err(player::RegistryError::ServerFull) => {
                info!("Refused {}: server is full", login.username);
                self.close();
                return;
            }
        };

        *self.profile.lock().unwrap() = Some(profile);
        self.entity_id.store(session.entity_id, Ordering::Relaxed);
        *self.location.lock().unwrap() = session.spawn_location();

        self.send_packet(&Packet::LoginSuccess(LoginSuccess {
            uuid,
            username: login.username.clone(),
        }));
        self.set_phase(Phase::Play);
        // The join itself counts as the first keep-alive.
        self.last_keep_alive_ms.store(monotonic_ms(), Ordering::Relaxed);

        info!(
            "Player {} ({uuid}) logged in from {} (entity id {})",
            login.username, self.addr, session.entity_id
        );

        self.initialize_play_state(state, &session);
    }

    fn initialize_play_state(self: &Arc<Self>, state: &Arc<ServerState>, session: &Arc<PlayerSession>) {
        let config = &state.config;
        let spawn = session.spawn_location();
        let gamemode = GameMode::from_name(&config.server.gamemode);

        self.send_packet(&Packet::JoinGame(JoinGame {
            entity_id: session.entity_id as i32,
            hardcore: config.server.hardcore,
            gamemode: gamemode as u8,
            previous_gamemode: GameMode::Survival as u8,
            hashed_seed: config.world.seed,
            max_players: config.server.max_players as i32,
            view_distance: config.server.view_distance,
            simulation_distance: config.server.simulation_distance,
            is_flat: Generator::from_name(&config.world.generator) == Generator::Flat,
            ..JoinGame::default()
        }));

        self.send_packet(&Packet::PlayerPositionAndLook(PlayerPositionAndLook {
            x: spawn.x,
            y: spawn.y,
            z: spawn.z,
            yaw: spawn.yaw,
            pitch: spawn.pitch,
            flags: 0,
            teleport_id: 1,
            dismount_vehicle: false,
        }));

        player::update_chunk_view(session, state);

        tokio::spawn(keep_alive_loop(self.clone()));
    }

    fn handle_player_position(
        self: &Arc<Self>,
        state: &Arc<ServerState>,
        position: ferrum_proto::packets::PlayerPosition,
    ) {
        let Some(profile) = self.profile() else {
            return;
        };
        // The session is looked up fresh each time; the registry owns it.
        let Some(session) = state.players.by_uuid(&profile.uuid) else {
            return;
        };

        let old_chunk = session.chunk();
        let mut location = session.location();
        location.x = position.x;
        location.y = position.y;
        location.z = position.z;
        session.set_location(location);
        *self.location.lock().unwrap() = location;

        if session.chunk() != old_chunk {
            player::update_chunk_view(&session, state);
        }
    }
}

async fn write_loop(
    connection: Arc<Connection>,
    mut write_half: OwnedWriteHalf,
    mut rx: UnboundedReceiver<WriteItem>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            WriteItem::Frame(frame) => {
                if let Err(e) = write_half.write_all(&frame).await {
                    info!("Write error to {}: {e}", connection.addr);
                    connection.close();
                    break;
                }
                connection.perf.record_packet(frame.len());
            }
            WriteItem::Shutdown => break,
        }
    }
    let _ = write_half.shutdown().await;
}

/// Send a KeepAlive every 20 seconds; close after 30 seconds of silence.
async fn keep_alive_loop(connection: Arc<Connection>) {
    let mut interval = tokio::time::interval(KEEP_ALIVE_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        if connection.is_closed() {
            return;
        }
        let now = monotonic_ms();
        connection.send_packet(&Packet::ClientboundKeepAlive(ClientboundKeepAlive {
            id: now as i64,
        }));
        if now.saturating_sub(connection.last_keep_alive_ms()) > KEEP_ALIVE_TIMEOUT_MS {
            info!("Connection {} keep-alive timeout", connection.addr);
            connection.close();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use ferrum_proto::packets::{Handshake, PingRequest, ServerboundKeepAlive};
    use std::path::PathBuf;

    fn test_state() -> (Arc<ServerState>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("ferrum_conn_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = ServerConfig::default();
        config.world.name = dir.to_string_lossy().into_owned();
        config.world.generator = "void".into();
        config.performance.worker_threads = 1;
        config.server.max_players = 4;
        let state = ServerState::new(config).unwrap();
        (state, dir)
    }

    fn test_connection(state: &Arc<ServerState>) -> (Arc<Connection>, UnboundedReceiver<WriteItem>) {
        Connection::new(
            7,
            "127.0.0.1:50000".parse().unwrap(),
            state.perf.clone(),
            state.config.security.packet_limit_per_second,
        )
    }

    fn recv_frame(rx: &mut UnboundedReceiver<WriteItem>) -> Option<Bytes> {
        match rx.try_recv() {
            Ok(WriteItem::Frame(frame)) => Some(frame),
            _ => None,
        }
    }

    fn feed(conn: &Arc<Connection>, state: &Arc<ServerState>, bytes: &[u8]) -> bool {
        let mut buf = BytesMut::from(bytes);
        conn.drain_frames(state, &mut buf)
    }

    fn frame_for(packet: &Packet) -> Vec<u8> {
        encode_frame(packet).to_vec()
    }

    // ── Frame assembly ──────────────────────────────────────────────────

    #[test]
    fn partial_frames_wait_for_more_data() {
        let mut buf = BytesMut::new();
        assert!(try_extract_frame(&mut buf).unwrap().is_none());

        // Length prefix only.
        buf.extend_from_slice(&[0x05]);
        assert!(try_extract_frame(&mut buf).unwrap().is_none());
        // Partial body.
        buf.extend_from_slice(&[1, 2, 3]);
        assert!(try_extract_frame(&mut buf).unwrap().is_none());
        // Complete, plus the start of the next frame.
        buf.extend_from_slice(&[4, 5, 0x01]);
        let frame = try_extract_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.as_ref(), &[0x01]);
    }

    #[test]
    fn incomplete_length_prefix_waits() {
        // A multi-byte VarInt cut mid-way.
        let mut buf = BytesMut::from(&[0xAC_u8][..]);
        assert!(try_extract_frame(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&[0x02]);
        // 300-byte frame announced, no body yet.
        assert!(try_extract_frame(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversize_frame_is_fatal() {
        let mut buf = BytesMut::new();
        let mut pb = PacketBuffer::new();
        pb.write_varint((MAX_FRAME_BYTES + 1) as i32);
        buf.extend_from_slice(pb.as_slice());
        assert!(matches!(
            try_extract_frame(&mut buf),
            Err(ProtoError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn two_frames_in_one_read() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x01, 0xAA, 0x02, 0xBB, 0xCC]);
        assert_eq!(
            try_extract_frame(&mut buf).unwrap().unwrap().as_ref(),
            &[0xAA]
        );
        assert_eq!(
            try_extract_frame(&mut buf).unwrap().unwrap().as_ref(),
            &[0xBB, 0xCC]
        );
        assert!(try_extract_frame(&mut buf).unwrap().is_none());
    }

    // ── Rate limiting ───────────────────────────────────────────────────

    #[test]
    fn rate_limit_window() {
        let mut limit = RateLimit::new(3, 10_000);
        assert!(limit.allow());
        assert!(limit.allow());
        assert!(limit.allow());
        assert!(!limit.allow());
    }

    // ── Phase machine ───────────────────────────────────────────────────

    #[test]
    fn handshake_routes_to_status() {
        let (state, dir) = test_state();
        let (conn, mut rx) = test_connection(&state);

        let frame = frame_for(&Packet::Handshake(Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 1,
        }));
        // 16-byte frame, id 0x00.
        assert_eq!(frame[0], 0x10);
        assert_eq!(frame[1], 0x00);

        assert!(feed(&conn, &state, &frame));
        assert_eq!(conn.phase(), Phase::Status);
        assert!(recv_frame(&mut rx).is_none(), "no packet sent yet");
        assert!(!conn.is_closed());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn protocol_mismatch_closes() {
        let (state, dir) = test_state();
        let (conn, _rx) = test_connection(&state);

        let frame = frame_for(&Packet::Handshake(Handshake {
            protocol_version: 758,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 1,
        }));
        assert!(!feed(&conn, &state, &frame));
        assert!(conn.is_closed());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn status_exchange_and_ping() {
        let (state, dir) = test_state();
        let (conn, mut rx) = test_connection(&state);

        let handshake = frame_for(&Packet::Handshake(Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 1,
        }));
        assert!(feed(&conn, &state, &handshake));

        // StatusRequest frame is exactly `01 00`.
        assert!(feed(&conn, &state, &[0x01, 0x00]));
        let response = recv_frame(&mut rx).expect("status response");
        let mut buf = PacketBuffer::from_bytes(&response);
        let _frame_len = buf.read_varint().unwrap();
        assert_eq!(buf.read_varint().unwrap(), StatusResponse::ID);
        let json: serde_json::Value =
            serde_json::from_str(&buf.read_string().unwrap()).unwrap();
        assert_eq!(json["version"]["name"], "1.20.1");
        assert_eq!(json["version"]["protocol"], 763);

        // PingRequest with payload 42; the echo comes back byte-identical
        // and the connection closes.
        let ping = frame_for(&Packet::PingRequest(PingRequest { payload: 42 }));
        assert_eq!(
            ping,
            vec![0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A]
        );
        assert!(!feed(&conn, &state, &ping));
        let pong = recv_frame(&mut rx).expect("ping response");
        assert_eq!(pong.as_ref(), ping.as_slice());
        assert!(conn.is_closed());

        // Further sends are no-ops.
        conn.send_packet(&Packet::PingResponse(PingResponse { payload: 1 }));
        assert!(recv_frame(&mut rx).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_packet_is_dropped_not_fatal() {
        let (state, dir) = test_state();
        let (conn, _rx) = test_connection(&state);

        // Unknown id 0x55 in HANDSHAKING phase.
        assert!(feed(&conn, &state, &[0x01, 0x55]));
        assert!(!conn.is_closed());
        assert_eq!(conn.phase(), Phase::Handshaking);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn decode_error_closes() {
        let (state, dir) = test_state();
        let (conn, _rx) = test_connection(&state);

        // Truncated Handshake body: id 0x00 then nothing.
        assert!(!feed(&conn, &state, &[0x01, 0x00]));
        assert!(conn.is_closed());

        std::fs::remove_dir_all(&dir).ok();
    }

    // ── Login / PLAY ────────────────────────────────────────────────────

    fn login_frames(name: &str) -> Vec<u8> {
        let mut bytes = frame_for(&Packet::Handshake(Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 2,
        }));
        bytes.extend(frame_for(&Packet::LoginStart(LoginStart {
            username: name.into(),
            uuid: Uuid::ZERO,
        })));
        bytes
    }

    #[tokio::test]
    async fn login_reaches_play_and_streams_setup() {
        let (state, dir) = test_state();
        let (conn, mut rx) = test_connection(&state);

        assert!(feed(&conn, &state, &login_frames("Alex")));
        assert_eq!(conn.phase(), Phase::Play);
        assert_eq!(state.players.online_count(), 1);

        // LoginSuccess, JoinGame, PlayerPositionAndLook, UpdateViewPosition.
        let expected_ids = [0x02, 0x26, 0x3C, 0x4E];
        for expected in expected_ids {
            let frame = recv_frame(&mut rx).expect("setup packet");
            let mut buf = PacketBuffer::from_bytes(&frame);
            let _len = buf.read_varint().unwrap();
            assert_eq!(buf.read_varint().unwrap(), expected);
        }

        let session = state.players.by_name("Alex").unwrap();
        assert_eq!(conn.entity_id(), session.entity_id);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn duplicate_login_is_refused() {
        let (state, dir) = test_state();
        let (first, _rx1) = test_connection(&state);
        let (second, mut rx2) = Connection::new(
            8,
            "127.0.0.1:50001".parse().unwrap(),
            state.perf.clone(),
            500,
        );

        assert!(feed(&first, &state, &login_frames("Alex")));
        assert!(!feed(&second, &state, &login_frames("Alex")));
        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert_eq!(state.players.online_count(), 1);

        // The refused connection never saw LoginSuccess or JoinGame.
        assert!(recv_frame(&mut rx2).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn invalid_username_is_refused() {
        let (state, dir) = test_state();
        let (conn, _rx) = test_connection(&state);

        let mut bytes = frame_for(&Packet::Handshake(Handshake {
            protocol_version: 763,
            server_address: "localhost".into(),
            server_port: 25565,
            next_state: 2,
        }));
        bytes.extend(frame_for(&Packet::LoginStart(LoginStart {
            username: "no spaces!".into(),
            uuid: Uuid::ZERO,
        })));
        assert!(!feed(&conn, &state, &bytes));
        assert!(conn.is_closed());
        assert_eq!(state.players.online_count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn keep_alive_updates_timestamp() {
        let (state, dir) = test_state();
        let (conn, _rx) = test_connection(&state);

        assert!(feed(&conn, &state, &login_frames("Alex")));
        let at_login = conn.last_keep_alive_ms();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let frame = frame_for(&Packet::ServerboundKeepAlive(ServerboundKeepAlive {
            id: 99,
        }));
        assert!(feed(&conn, &state, &frame));
        assert!(conn.last_keep_alive_ms() >= at_login);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn movement_crossing_chunks_updates_the_view() {
        let (state, dir) = test_state();
        let (conn, mut rx) = test_connection(&state);

        assert!(feed(&conn, &state, &login_frames("Alex")));
        let session = state.players.by_name("Alex").unwrap();
        session.set_view_distance(2);

        // Let the initial window finish loading, then sync it.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while session.loaded_chunks().len() < 13 {
            assert!(std::time::Instant::now() < deadline, "window never filled");
            player::update_chunk_view(&session, &state);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        while recv_frame(&mut rx).is_some() {}

        // Cross from chunk (0,0) into (1,0).
        let frame = frame_for(&Packet::PlayerPosition(
            ferrum_proto::packets::PlayerPosition {
                x: 17.5,
                y: 65.0,
                z: 0.5,
                on_ground: true,
            },
        ));
        assert!(feed(&conn, &state, &frame));
        assert_eq!(session.chunk(), ferrum_proto::types::ChunkPos::new(1, 0));

        // First outbound packet after the move recenters the view.
        let first = recv_frame(&mut rx).expect("view recenter");
        let mut buf = PacketBuffer::from_bytes(&first);
        let _len = buf.read_varint().unwrap();
        assert_eq!(buf.read_varint().unwrap(), 0x4E);
        assert_eq!(buf.read_varint().unwrap(), 1);
        assert_eq!(buf.read_varint().unwrap(), 0);

        // Everything that follows is ChunkData (0x24) then UnloadChunk (0x1D);
        // the dropped column is exactly the disc difference.
        let mut unloaded = Vec::new();
        let mut seen_unload = false;
        while let Some(frame) = recv_frame(&mut rx) {
            let mut buf = PacketBuffer::from_bytes(&frame);
            let _len = buf.read_varint().unwrap();
            match buf.read_varint().unwrap() {
                0x24 => assert!(!seen_unload, "ChunkData after UnloadChunk"),
                0x1D => {
                    seen_unload = true;
                    unloaded.push((buf.read_i32().unwrap(), buf.read_i32().unwrap()));
                }
                other => panic!("unexpected packet 0x{other:02X}"),
            }
        }
        unloaded.sort();
        assert_eq!(
            unloaded,
            vec![(-2, 0), (-1, -1), (-1, 1), (0, -2), (0, 2)]
        );

        std::fs::remove_dir_all(&dir).ok();
    }
}
