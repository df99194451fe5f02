//! WebSocket Game Server
//!
//! Async WebSocket server for head-to-head play.
//! Routes room, readiness and swipe messages to the [`RoomManager`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::words::Word;
use crate::network::protocol::{ClientMessage, ServerMessage, ErrorCode};
use crate::network::session::{ConnectionId, RoomManager, SessionConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address.
    pub bind_addr: SocketAddr,
    /// Leaderboard HTTP bind address.
    pub http_addr: SocketAddr,
    /// Word list file.
    pub words_path: PathBuf,
    /// Leaderboard store file; in-memory when unset.
    pub leaderboard_path: Option<PathBuf>,
    /// Sockets beyond this many are turned away.
    pub max_connections: usize,
    /// Silent connections are dropped after this long.
    pub idle_timeout: Duration,
    /// How often rooms are swept.
    pub cleanup_interval: Duration,
    /// Room knobs.
    pub session: SessionConfig,
    /// Reported in the startup log.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            words_path: PathBuf::from("static/js/words-data.json"),
            leaderboard_path: None,
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(1),
            session: SessionConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Read overrides from `PARLANCE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a key lookup. Unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "PARLANCE_WS_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(addr) = parse_var(&lookup, "PARLANCE_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(path) = lookup("PARLANCE_WORDS_PATH").filter(|p| !p.is_empty()) {
            config.words_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("PARLANCE_LEADERBOARD_PATH").filter(|p| !p.is_empty()) {
            config.leaderboard_path = Some(PathBuf::from(path));
        }
        if let Some(max) = parse_var(&lookup, "PARLANCE_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "PARLANCE_RECONNECT_GRACE_SECS") {
            config.session.reconnect_grace = Duration::from_secs(secs);
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// The listener could not be bound or queried.
    #[error("Listener error: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Handshake or frame failure.
    #[error("WebSocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Bookkeeping for one open socket.
struct ConnectedClient {
    /// Server-assigned connection id.
    id: ConnectionId,
    /// When the handshake finished.
    connected_at: Instant,
    /// Last decoded client message.
    last_activity: Instant,
    /// Queue drained by the socket writer.
    sender: mpsc::Sender<ServerMessage>,
    /// Tells the reader to hang up. Taken once fired.
    close: Option<oneshot::Sender<()>>,
}

/// Accepts sockets and hands their messages to the rooms.
pub struct GameServer {
    /// Settings.
    config: ServerConfig,
    /// Room manager.
    rooms: Arc<RoomManager>,
    /// Open sockets by peer address.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Fired once on shutdown.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Server dealing from `words`.
    pub fn new(config: ServerConfig, words: Vec<Word>) -> Self {
        let rooms = RoomManager::new(words, config.session.clone());
        Self::with_rooms(config, rooms)
    }

    /// Create a server around an existing room manager.
    pub fn with_rooms(config: ServerConfig, rooms: RoomManager) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            rooms: Arc::new(rooms),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server v{} listening on {}", self.config.version, listener.local_addr()?);

        let cleanup_clients = self.clients.clone();
        let cleanup_rooms = self.rooms.clone();
        let cleanup_every = self.config.cleanup_interval;
        let idle_timeout = self.config.idle_timeout;

        // Idle sockets and expired rooms
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_rooms, cleanup_every, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let open = self.clients.read().await.len();
                            if open >= self.config.max_connections {
                                warn!("Turning away {}: {} sockets open", addr, open);
                                continue;
                            }

                            info!("Accepted {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("accept() failed: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Stopping game server");
                    self.rooms.broadcast(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Serve one socket on its own task.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let rooms = self.rooms.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = Self::handle_socket(stream, addr, clients, rooms, shutdown_rx).await {
                error!("Connection {} failed: {}", addr, e);
            }
        });
    }

    async fn handle_socket(
        stream: TcpStream,
        addr: SocketAddr,
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: Arc<RoomManager>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
        let connection = uuid::Uuid::new_v4();
        let (close_tx, mut close_rx) = oneshot::channel::<()>();

        // Track the socket
        {
            let mut clients = clients.write().await;
            clients.insert(addr, ConnectedClient {
                id: connection,
                connected_at: Instant::now(),
                last_activity: Instant::now(),
                sender: msg_tx.clone(),
                close: Some(close_tx),
            });
        }

        // Writer half. The room keeps a sender clone after a drop, so the
        // queue alone never closes; `hangup` flushes what is queued and
        // sends the close frame.
        let (hangup_tx, mut hangup_rx) = oneshot::channel::<()>();
        let mut sender_task = tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    msg = msg_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                    _ = &mut hangup_rx => {
                        while let Ok(msg) = msg_rx.try_recv() {
                            if let Ok(text) = msg.to_json() {
                                let _ = ws_sender.feed(Message::Text(text)).await;
                            }
                        }
                        break;
                    }
                };
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Dropping unencodable message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            let _ = ws_sender.close().await;
        });

        let _ = msg_tx.send(ServerMessage::Connected {
            message: "Connected to server".to_string(),
        }).await;

        // Reader half
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    if let Some(Ok(_)) = &msg {
                        // Any frame counts, protocol pings included
                        if let Some(client) = clients.write().await.get_mut(&addr) {
                            client.last_activity = Instant::now();
                        }
                    }

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let client_msg = match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(ServerMessage::error(
                                        ErrorCode::InvalidMessage,
                                        "Invalid message format",
                                    )).await;
                                    continue;
                                }
                            };

                            Self::handle_client_message(connection, client_msg, &rooms, &msg_tx).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("{} closed the socket", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("Read from {} failed: {}", addr, e);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = &mut close_rx => {
                    debug!("Hanging up on {}", addr);
                    break;
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        // Release the seat before forgetting the socket
        rooms.disconnect(connection).await;
        clients.write().await.remove(&addr);
        drop(msg_tx);
        let _ = hangup_tx.send(());
        if tokio::time::timeout(Duration::from_millis(250), &mut sender_task).await.is_err() {
            sender_task.abort();
        }

        info!("Closed {}", addr);
        Ok(())
    }

    /// Route one decoded message. Failures become a reply to the sender.
    async fn handle_client_message(
        connection: ConnectionId,
        msg: ClientMessage,
        rooms: &Arc<RoomManager>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let reply = match msg {
            ClientMessage::CreateGame { player_name } => {
                rooms.create_room(connection, &player_name, sender.clone()).await
                    .err()
                    .map(|e| e.to_message())
            }
            ClientMessage::JoinGame { room_code, player_name } => {
                rooms.join_room(&room_code, connection, &player_name, sender.clone()).await
                    .err()
                    .map(|e| {
                        debug!("Join {} refused: {}", room_code, e);
                        ServerMessage::JoinError { message: e.to_string() }
                    })
            }
            ClientMessage::PlayerReady { room_code } => {
                rooms.player_ready(&room_code, connection).await
                    .err()
                    .map(|e| e.to_message())
            }
            ClientMessage::SwipeAction(action) => {
                rooms.swipe(connection, &action).await
                    .err()
                    .map(|e| e.to_message())
            }
            ClientMessage::RejoinRoom { room_code, rejoin_token } => {
                rooms.rejoin(&room_code, &rejoin_token, connection, sender.clone()).await
                    .err()
                    .map(|e| ServerMessage::RejoinError { message: e.to_string() })
            }
            ClientMessage::LeaveRoom { room_code } => {
                if rooms.leave(connection).await.is_none() {
                    debug!("Leave for {} without a seat", room_code);
                }
                None
            }
            ClientMessage::Ping { timestamp } => {
                Some(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                })
            }
        };

        if let Some(reply) = reply {
            let _ = sender.send(reply).await;
        }
    }

    /// Periodic sweep of idle sockets and expired rooms.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: Arc<RoomManager>,
        every: Duration,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;
            let now = Instant::now();

            // Idle sockets are told why, then hung up on. Their own task
            // releases the seat and the slot.
            {
                let mut clients = clients.write().await;
                for (addr, client) in clients.iter_mut() {
                    if now.duration_since(client.last_activity) <= idle_timeout {
                        continue;
                    }
                    let Some(close) = client.close.take() else { continue };
                    let _ = client.sender.try_send(ServerMessage::error(ErrorCode::InternalError, "Idle timeout"));
                    let _ = close.send(());
                    info!(connection = %client.id, "Closing idle {} (open {:?})", addr, now.duration_since(client.connected_at));
                }
            }

            let removed = rooms.sweep(now).await;
            if removed > 0 {
                debug!("Swept {} rooms", removed);
            }
        }
    }

    /// Room manager.
    pub fn rooms(&self) -> Arc<RoomManager> {
        self.rooms.clone()
    }

    /// Settings.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Open sockets.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.room_count().await
    }
}
