//! Room Session Management
//!
//! Manages head-to-head rooms from creation to teardown. Each seat keeps its
//! own [`RoundState`] over a fixed copy of the dealt words, so every score the
//! server reports is computed here rather than taken from the client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::rng::{derive_deck_seed, DeterministicRng};
use crate::game::round::RoundState;
use crate::game::swipe::{resolve_swipe, GameMode};
use crate::game::words::{Word, WordDeck};
use crate::network::protocol::{
    ErrorCode, GameResult, OpponentProgress, RoomSnapshot, ServerMessage,
    SessionPhase, SwipeAction, SwipeConfirmation,
};

/// Per-connection identifier assigned by the server.
pub type ConnectionId = uuid::Uuid;

/// Longest stored display name, in characters.
pub const MAX_NAME_CHARS: usize = 20;

/// Name used when a player sends none.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// The two seats of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Seat {
    /// Created the room.
    Host,
    /// Joined by code.
    Guest,
}

impl Seat {
    /// The other seat.
    pub fn other(self) -> Seat {
        match self {
            Seat::Host => Seat::Guest,
            Seat::Guest => Seat::Host,
        }
    }
}

/// Connection state for reconnection support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Player is connected.
    Connected,
    /// Player disconnected, waiting for reconnect.
    Disconnected {
        /// When disconnection occurred.
        since: Instant,
    },
}

/// Configuration for rooms.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Words dealt per game (fewer if the pool is smaller).
    pub words_per_game: usize,
    /// How long a dropped seat is held.
    pub reconnect_grace: Duration,
    /// How long an ended room lingers before removal.
    pub ended_retention: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            words_per_game: crate::WORDS_PER_GAME,
            reconnect_grace: Duration::from_secs(10),
            ended_retention: Duration::from_secs(30),
        }
    }
}

/// Trim and cap a display name, substituting the default when empty.
pub fn normalize_name(raw: &str) -> String {
    let name: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim_end().to_string();
    if name.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        name
    }
}

/// Canonical form of a typed room code.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// A message addressed to one seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipient.
    pub to: Seat,
    /// Message.
    pub message: ServerMessage,
}

impl Outbound {
    fn new(to: Seat, message: ServerMessage) -> Self {
        Self { to, message }
    }
}

/// A player seated in a room.
#[derive(Debug)]
pub struct RoomPlayer {
    /// Current connection.
    pub connection: ConnectionId,
    /// Display name.
    pub name: String,
    /// Secret for reclaiming the seat.
    pub rejoin_token: String,
    /// Pressed ready.
    pub ready: bool,
    /// Connection state (for reconnection support).
    pub connection_state: ConnectionState,
    /// Authoritative round for this seat.
    round: RoundState,
    /// This seat's copy of the dealt words.
    deck: WordDeck,
    /// Message channel to this player.
    sender: mpsc::Sender<ServerMessage>,
}

impl RoomPlayer {
    /// Seat a connection with a fresh rejoin token.
    pub fn new(connection: ConnectionId, name: &str, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            connection,
            name: normalize_name(name),
            rejoin_token: uuid::Uuid::new_v4().simple().to_string(),
            ready: false,
            connection_state: ConnectionState::Connected,
            round: RoundState::new(),
            deck: WordDeck::fixed(Vec::new()),
            sender,
        }
    }

    /// Check if player is connected.
    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Connected)
    }

    /// Authoritative score.
    pub fn score(&self) -> u32 {
        self.round.score
    }

    /// Word cursor.
    pub fn word_index(&self) -> usize {
        self.round.word_index
    }

    /// Definition cursor.
    pub fn definition_index(&self) -> usize {
        self.round.definition_index
    }

    /// Done with the dealt words.
    pub fn finished(&self) -> bool {
        self.round.is_over
    }

    fn progress(&self) -> OpponentProgress {
        OpponentProgress {
            opponent_score: self.score(),
            opponent_word_index: self.word_index(),
            opponent_finished: self.finished(),
        }
    }

    fn confirmation(&self, points: u32) -> SwipeConfirmation {
        SwipeConfirmation {
            score: points,
            total_score: self.score(),
            word_index: self.word_index(),
            definition_index: self.definition_index(),
            finished: self.finished(),
        }
    }
}

/// A head-to-head room.
#[derive(Debug)]
pub struct GameRoom {
    code: String,
    phase: SessionPhase,
    config: SessionConfig,
    pool: Arc<Vec<Word>>,
    deck_seed: u64,
    words: Vec<Word>,
    host: RoomPlayer,
    guest: Option<RoomPlayer>,
    ended_at: Option<Instant>,
}

impl GameRoom {
    /// Open a room with its host seated.
    pub fn new(
        code: String,
        host: RoomPlayer,
        pool: Arc<Vec<Word>>,
        deck_seed: u64,
        config: SessionConfig,
    ) -> Self {
        Self {
            code,
            phase: SessionPhase::WaitingForOpponent,
            config,
            pool,
            deck_seed,
            words: Vec::new(),
            host,
            guest: None,
            ended_at: None,
        }
    }

    /// Room code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Dealt words (empty until the game starts).
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Player in a seat.
    pub fn player(&self, seat: Seat) -> Option<&RoomPlayer> {
        match seat {
            Seat::Host => Some(&self.host),
            Seat::Guest => self.guest.as_ref(),
        }
    }

    fn player_mut(&mut self, seat: Seat) -> Option<&mut RoomPlayer> {
        match seat {
            Seat::Host => Some(&mut self.host),
            Seat::Guest => self.guest.as_mut(),
        }
    }

    /// Seat held by a connection.
    pub fn seat_of(&self, connection: ConnectionId) -> Option<Seat> {
        if self.host.connection == connection {
            Some(Seat::Host)
        } else if self.guest.as_ref().is_some_and(|g| g.connection == connection) {
            Some(Seat::Guest)
        } else {
            None
        }
    }

    /// Seat matching a rejoin token.
    pub fn seat_for_token(&self, token: &str) -> Option<Seat> {
        [Seat::Host, Seat::Guest]
            .into_iter()
            .find(|seat| self.player(*seat).is_some_and(|p| p.rejoin_token == token))
    }

    /// Greeting for the host.
    pub fn created_message(&self) -> ServerMessage {
        ServerMessage::RoomCreated {
            room_code: self.code.clone(),
            player_name: self.host.name.clone(),
            rejoin_token: self.host.rejoin_token.clone(),
        }
    }

    /// Seat a guest.
    pub fn join(&mut self, guest: RoomPlayer) -> Result<Vec<Outbound>, SessionError> {
        if self.guest.is_some() {
            return Err(SessionError::RoomFull);
        }
        if self.phase != SessionPhase::WaitingForOpponent {
            return Err(SessionError::RoomNotJoinable);
        }

        let out = vec![
            Outbound::new(Seat::Guest, ServerMessage::RoomJoined {
                room_code: self.code.clone(),
                player_name: guest.name.clone(),
                opponent_name: self.host.name.clone(),
                rejoin_token: guest.rejoin_token.clone(),
            }),
            Outbound::new(Seat::Host, ServerMessage::OpponentJoined {
                opponent_name: guest.name.clone(),
            }),
        ];

        self.guest = Some(guest);
        self.phase = SessionPhase::Ready;
        Ok(out)
    }

    /// Mark a seat ready. Starts the game once both seats are ready.
    pub fn set_ready(&mut self, seat: Seat) -> Result<Vec<Outbound>, SessionError> {
        match self.phase {
            SessionPhase::WaitingForOpponent | SessionPhase::Ready => {}
            SessionPhase::InProgress => return Ok(Vec::new()),
            _ => return Err(SessionError::GameNotInProgress),
        }

        let player = self.player_mut(seat).ok_or(SessionError::NotInRoom)?;
        player.ready = true;

        let both_ready = self.host.ready && self.guest.as_ref().is_some_and(|g| g.ready);
        if !both_ready {
            return Ok(Vec::new());
        }

        self.start();
        let words = self.words.clone();
        Ok([Seat::Host, Seat::Guest]
            .into_iter()
            .filter_map(|seat| {
                let opponent = self.player(seat.other())?;
                Some(Outbound::new(seat, ServerMessage::GameStart {
                    words: words.clone(),
                    opponent_name: opponent.name.clone(),
                }))
            })
            .collect())
    }

    /// Deal the words and reset both rounds.
    fn start(&mut self) {
        let mut rng = DeterministicRng::new(self.deck_seed);
        let count = self.config.words_per_game.min(self.pool.len());
        let mut words = rng.sample(self.pool.as_slice(), count);
        for word in &mut words {
            rng.shuffle(&mut word.definitions);
        }
        self.words = words;

        for seat in [Seat::Host, Seat::Guest] {
            let words = self.words.clone();
            if let Some(player) = self.player_mut(seat) {
                player.deck = WordDeck::fixed(words);
                player.round = RoundState::new();
                player.round.reset_round(&mut player.deck);
            }
        }

        self.phase = SessionPhase::InProgress;
        info!(room = %self.code, words = self.words.len(), "Game started");
    }

    /// Replay a swipe on the sender's authoritative round.
    pub fn apply_swipe(&mut self, seat: Seat, action: &SwipeAction) -> Result<Vec<Outbound>, SessionError> {
        if self.phase != SessionPhase::InProgress {
            return Err(SessionError::GameNotInProgress);
        }
        if action.word_index >= self.words.len() {
            return Err(SessionError::InvalidWordIndex(action.word_index));
        }

        let code = self.code.clone();
        let player = self.player_mut(seat).ok_or(SessionError::NotInRoom)?;
        if player.finished() {
            return Err(SessionError::AlreadyFinished);
        }

        if (action.word_index, action.definition_index) != (player.word_index(), player.definition_index()) {
            debug!(
                room = %code,
                client = ?(action.word_index, action.definition_index),
                server = ?(player.word_index(), player.definition_index()),
                "Swipe out of sync"
            );
            return Ok(vec![
                Outbound::new(seat, ServerMessage::error(
                    ErrorCode::OutOfSync,
                    "Swipe does not match the current card",
                )),
                Outbound::new(seat, ServerMessage::SwipeConfirmed(player.confirmation(0))),
            ]);
        }

        let outcome = resolve_swipe(
            GameMode::Multiplayer,
            &mut player.round,
            &mut player.deck,
            action.direction,
            Some(action.swipe_time_ms),
        )
        .map_err(|_| SessionError::AlreadyFinished)?;
        player.round.take_events();

        if outcome.was_correct != action.is_correct {
            warn!(room = %code, player = %player.name, "Client verdict disagrees with server");
        }

        let mut out = vec![
            Outbound::new(seat, ServerMessage::SwipeConfirmed(player.confirmation(outcome.points))),
            Outbound::new(seat.other(), ServerMessage::OpponentProgress(player.progress())),
        ];

        let both_finished = self.host.finished() && self.guest.as_ref().is_some_and(|g| g.finished());
        if both_finished {
            out.extend(self.finish());
        }

        Ok(out)
    }

    /// End the game and address the result to each seat.
    fn finish(&mut self) -> Vec<Outbound> {
        self.phase = SessionPhase::Ended;
        self.ended_at = Some(Instant::now());

        let Some(guest) = self.guest.as_ref() else {
            return Vec::new();
        };
        let host = &self.host;

        let winner = match host.score().cmp(&guest.score()) {
            std::cmp::Ordering::Greater => Some(host.name.clone()),
            std::cmp::Ordering::Less => Some(guest.name.clone()),
            std::cmp::Ordering::Equal => None,
        };
        let is_tie = winner.is_none();

        info!(
            room = %self.code,
            host_score = host.score(),
            guest_score = guest.score(),
            winner = ?winner,
            "Game ended"
        );

        vec![
            Outbound::new(Seat::Host, ServerMessage::GameEnd(GameResult {
                your_score: host.score(),
                opponent_score: guest.score(),
                winner: winner.clone(),
                is_tie,
            })),
            Outbound::new(Seat::Guest, ServerMessage::GameEnd(GameResult {
                your_score: guest.score(),
                opponent_score: host.score(),
                winner,
                is_tie,
            })),
        ]
    }

    /// Mark the seat held by `connection` as dropped.
    pub fn mark_disconnected(&mut self, connection: ConnectionId, now: Instant) -> Option<Seat> {
        let seat = self.seat_of(connection)?;
        if let Some(player) = self.player_mut(seat) {
            player.connection_state = ConnectionState::Disconnected { since: now };
        }
        Some(seat)
    }

    /// Restore a seat to a new connection.
    pub fn rejoin(
        &mut self,
        token: &str,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
        now: Instant,
    ) -> Result<(Seat, Vec<Outbound>), SessionError> {
        let seat = self.seat_for_token(token).ok_or(SessionError::InvalidRejoinToken)?;
        let grace = self.config.reconnect_grace;

        let player = self.player_mut(seat).ok_or(SessionError::InvalidRejoinToken)?;
        if let ConnectionState::Disconnected { since } = player.connection_state {
            if now.saturating_duration_since(since) > grace {
                return Err(SessionError::RejoinExpired);
            }
        }

        player.connection = connection;
        player.sender = sender;
        player.connection_state = ConnectionState::Connected;

        let snapshot = self.snapshot(seat);
        Ok((seat, vec![Outbound::new(seat, ServerMessage::RoomRejoined(snapshot))]))
    }

    /// Seat whose grace window has run out.
    pub fn expired_seat(&self, now: Instant) -> Option<Seat> {
        [Seat::Host, Seat::Guest].into_iter().find(|seat| {
            self.player(*seat).is_some_and(|p| match p.connection_state {
                ConnectionState::Disconnected { since } => {
                    now.saturating_duration_since(since) > self.config.reconnect_grace
                }
                ConnectionState::Connected => false,
            })
        })
    }

    /// Ended and past its retention window.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.ended_at
            .is_some_and(|at| now.saturating_duration_since(at) >= self.config.ended_retention)
    }

    /// Notice for the seat left behind when `leaving` goes away.
    pub fn abandon(&mut self, leaving: Seat) -> Vec<Outbound> {
        let was_ended = self.phase == SessionPhase::Ended;
        self.phase = SessionPhase::Ended;
        self.ended_at.get_or_insert_with(Instant::now);

        let remaining = leaving.other();
        if was_ended || self.player(remaining).is_none() {
            return Vec::new();
        }
        vec![Outbound::new(remaining, ServerMessage::OpponentDisconnected {
            message: "Opponent disconnected".to_string(),
        })]
    }

    /// Rejoin state for a seat.
    pub fn snapshot(&self, seat: Seat) -> RoomSnapshot {
        let me = self.player(seat);
        let opponent = self.player(seat.other());

        RoomSnapshot {
            room_code: self.code.clone(),
            phase: self.phase,
            words: self.words.clone(),
            your_score: me.map_or(0, |p| p.score()),
            your_word_index: me.map_or(0, |p| p.word_index()),
            your_definition_index: me.map_or(0, |p| p.definition_index()),
            your_finished: me.is_some_and(|p| p.finished()),
            opponent_name: opponent.map(|p| p.name.clone()),
            opponent_score: opponent.map_or(0, |p| p.score()),
            opponent_word_index: opponent.map_or(0, |p| p.word_index()),
            opponent_finished: opponent.is_some_and(|p| p.finished()),
        }
    }

    /// Hand messages to the seats' channels. Disconnected seats are skipped.
    pub fn dispatch(&self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            let Some(player) = self.player(to) else { continue };
            if !player.is_connected() {
                continue;
            }
            if let Err(e) = player.sender.try_send(message) {
                warn!(room = %self.code, seat = ?to, "Dropping message: {}", e);
            }
        }
    }

    /// Connections seated in this room.
    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut ids = vec![self.host.connection];
        ids.extend(self.guest.as_ref().map(|g| g.connection));
        ids
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No room with that code.
    #[error("Room not found")]
    RoomNotFound,

    /// Both seats taken.
    #[error("Room is full")]
    RoomFull,

    /// Room is no longer accepting players.
    #[error("Room is not waiting for players")]
    RoomNotJoinable,

    /// Connection holds no seat in the room.
    #[error("Player not in room")]
    NotInRoom,

    /// Connection already holds a seat.
    #[error("Already in a room")]
    AlreadyInRoom,

    /// Room is not in play.
    #[error("Game not in progress")]
    GameNotInProgress,

    /// Word index outside the dealt words.
    #[error("Invalid word index {0}")]
    InvalidWordIndex(usize),

    /// Sender already finished.
    #[error("Already finished")]
    AlreadyFinished,

    /// Token matches no seat.
    #[error("Unknown rejoin token")]
    InvalidRejoinToken,

    /// Grace window passed.
    #[error("Seat is no longer held")]
    RejoinExpired,

    /// Could not allocate a room code.
    #[error("No room codes available")]
    CodesExhausted,
}

impl SessionError {
    /// Protocol error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::RoomNotFound
            | SessionError::InvalidRejoinToken
            | SessionError::RejoinExpired => ErrorCode::RoomNotFound,
            SessionError::RoomFull | SessionError::RoomNotJoinable => ErrorCode::RoomUnavailable,
            SessionError::NotInRoom => ErrorCode::NotInRoom,
            SessionError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            SessionError::GameNotInProgress => ErrorCode::GameNotInProgress,
            SessionError::InvalidWordIndex(_) => ErrorCode::InvalidWordIndex,
            SessionError::AlreadyFinished => ErrorCode::AlreadyFinished,
            SessionError::CodesExhausted => ErrorCode::ServerOverloaded,
        }
    }

    /// Generic error frame.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

// =============================================================================
// ROOM MANAGER
// =============================================================================

/// Attempts at finding an unused room code before giving up.
const CODE_ATTEMPTS: usize = 64;

/// Manages all active rooms.
pub struct RoomManager {
    /// Active rooms by code.
    rooms: RwLock<BTreeMap<String, Arc<RwLock<GameRoom>>>>,
    /// Connection to room code mapping.
    connections: RwLock<BTreeMap<ConnectionId, String>>,
    /// Words rooms deal from.
    pool: Arc<Vec<Word>>,
    /// Room knobs.
    config: SessionConfig,
    /// Code generator.
    rng: Mutex<DeterministicRng>,
    /// Mixed into deck seeds so reused codes deal fresh decks.
    nonce: AtomicU64,
}

impl RoomManager {
    /// Create a manager dealing from `pool`.
    pub fn new(pool: Vec<Word>, config: SessionConfig) -> Self {
        Self::with_rng(pool, config, DeterministicRng::from_entropy())
    }

    /// Create a manager with a given code generator.
    pub fn with_rng(pool: Vec<Word>, config: SessionConfig, rng: DeterministicRng) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            connections: RwLock::new(BTreeMap::new()),
            pool: Arc::new(pool),
            config,
            rng: Mutex::new(rng),
            nonce: AtomicU64::new(0),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a room hosted by `connection`. Sends `room_created`.
    pub async fn create_room(
        &self,
        connection: ConnectionId,
        player_name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<String, SessionError> {
        self.ensure_unseated(connection).await?;

        let mut rooms = self.rooms.write().await;
        let code = {
            let mut rng = self.rng.lock().await;
            (0..CODE_ATTEMPTS)
                .map(|_| rng.room_code())
                .find(|code| !rooms.contains_key(code))
                .ok_or(SessionError::CodesExhausted)?
        };

        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let host = RoomPlayer::new(connection, player_name, sender);
        let room = GameRoom::new(
            code.clone(),
            host,
            Arc::clone(&self.pool),
            derive_deck_seed(&code, nonce),
            self.config.clone(),
        );

        room.dispatch(vec![Outbound::new(Seat::Host, room.created_message())]);
        info!(room = %code, host = %room.host.name, "Room created");

        rooms.insert(code.clone(), Arc::new(RwLock::new(room)));
        drop(rooms);

        self.connections.write().await.insert(connection, code.clone());
        Ok(code)
    }

    /// Seat `connection` as guest of the room typed as `room_code`.
    pub async fn join_room(
        &self,
        room_code: &str,
        connection: ConnectionId,
        player_name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<String, SessionError> {
        self.ensure_unseated(connection).await?;

        let code = normalize_room_code(room_code);
        let room = self.get_room(&code).await.ok_or(SessionError::RoomNotFound)?;

        {
            let mut room = room.write().await;
            let guest = RoomPlayer::new(connection, player_name, sender);
            let out = room.join(guest)?;
            room.dispatch(out);
            info!(room = %code, "Guest joined");
        }

        self.connections.write().await.insert(connection, code.clone());
        Ok(code)
    }

    /// Mark `connection` ready.
    pub async fn player_ready(&self, room_code: &str, connection: ConnectionId) -> Result<(), SessionError> {
        let room = self.seated_room(room_code, connection).await?;
        let mut room = room.write().await;
        let seat = room.seat_of(connection).ok_or(SessionError::NotInRoom)?;
        let out = room.set_ready(seat)?;
        room.dispatch(out);
        Ok(())
    }

    /// Apply a swipe from `connection`.
    pub async fn swipe(&self, connection: ConnectionId, action: &SwipeAction) -> Result<(), SessionError> {
        let room = self.seated_room(&action.room_code, connection).await?;
        let mut room = room.write().await;
        let seat = room.seat_of(connection).ok_or(SessionError::NotInRoom)?;
        let out = room.apply_swipe(seat, action)?;
        room.dispatch(out);
        Ok(())
    }

    /// Restore a dropped seat to `connection`.
    pub async fn rejoin(
        &self,
        room_code: &str,
        token: &str,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), SessionError> {
        let code = normalize_room_code(room_code);
        if self.room_of(connection).await.is_some_and(|current| current != code) {
            self.ensure_unseated(connection).await?;
        }
        let room = self.get_room(&code).await.ok_or(SessionError::RoomNotFound)?;

        let previous = {
            let mut room = room.write().await;
            let seat = room.seat_for_token(token).ok_or(SessionError::InvalidRejoinToken)?;
            let previous = room.player(seat).map(|p| p.connection);
            let (_, out) = room.rejoin(token, connection, sender, Instant::now())?;
            room.dispatch(out);
            previous
        };

        let mut connections = self.connections.write().await;
        if let Some(previous) = previous {
            connections.remove(&previous);
        }
        connections.insert(connection, code.clone());
        info!(room = %code, "Seat restored");
        Ok(())
    }

    /// Leave the room held by `connection` and discard it.
    pub async fn leave(&self, connection: ConnectionId) -> Option<String> {
        let code = self.connections.read().await.get(&connection).cloned()?;
        let room = self.get_room(&code).await;

        if let Some(room) = room {
            let mut room = room.write().await;
            if let Some(seat) = room.seat_of(connection) {
                let out = room.abandon(seat);
                room.dispatch(out);
            }
        }

        self.discard(&code).await;
        info!(room = %code, "Room discarded after leave");
        Some(code)
    }

    /// Transport dropped for `connection`. The seat is held for the grace
    /// window; a seat in an ended room is released at once.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let Some(code) = self.connections.read().await.get(&connection).cloned() else {
            return;
        };
        let Some(room) = self.get_room(&code).await else {
            self.connections.write().await.remove(&connection);
            return;
        };

        let discard = {
            let mut room = room.write().await;
            match room.mark_disconnected(connection, Instant::now()) {
                Some(_) if room.phase() == SessionPhase::Ended => true,
                Some(seat) => {
                    debug!(room = %code, seat = ?seat, "Seat held for reconnect");
                    false
                }
                None => false,
            }
        };

        if discard {
            self.connections.write().await.remove(&connection);
        }
    }

    /// Remove stale ended rooms and rooms whose dropped seat ran out of grace.
    /// Returns the number of rooms removed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let rooms: Vec<(String, Arc<RwLock<GameRoom>>)> = self
            .rooms
            .read()
            .await
            .iter()
            .map(|(code, room)| (code.clone(), Arc::clone(room)))
            .collect();

        let mut removed = 0;
        for (code, room) in rooms {
            let remove = {
                let mut room = room.write().await;
                if room.is_stale(now) {
                    true
                } else if let Some(seat) = room.expired_seat(now) {
                    let out = room.abandon(seat);
                    room.dispatch(out);
                    info!(room = %code, seat = ?seat, "Reconnect grace expired");
                    true
                } else {
                    false
                }
            };

            if remove {
                self.discard(&code).await;
                removed += 1;
            }
        }
        removed
    }

    /// Get a room by code.
    pub async fn get_room(&self, code: &str) -> Option<Arc<RwLock<GameRoom>>> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Room code held by a connection.
    pub async fn room_of(&self, connection: ConnectionId) -> Option<String> {
        self.connections.read().await.get(&connection).cloned()
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Broadcast a message to every connected seat.
    pub async fn broadcast(&self, message: ServerMessage) {
        let rooms: Vec<_> = self.rooms.read().await.values().cloned().collect();
        for room in rooms {
            let room = room.read().await;
            let out = [Seat::Host, Seat::Guest]
                .into_iter()
                .map(|seat| Outbound::new(seat, message.clone()))
                .collect();
            room.dispatch(out);
        }
    }

    /// Fail if `connection` holds a live seat. A seat in an ended room is
    /// released so the player can start over.
    async fn ensure_unseated(&self, connection: ConnectionId) -> Result<(), SessionError> {
        let Some(code) = self.room_of(connection).await else {
            return Ok(());
        };
        if let Some(room) = self.get_room(&code).await {
            if room.read().await.phase() != SessionPhase::Ended {
                return Err(SessionError::AlreadyInRoom);
            }
        }
        self.connections.write().await.remove(&connection);
        Ok(())
    }

    async fn seated_room(
        &self,
        room_code: &str,
        connection: ConnectionId,
    ) -> Result<Arc<RwLock<GameRoom>>, SessionError> {
        let code = normalize_room_code(room_code);
        let room = self.get_room(&code).await.ok_or(SessionError::RoomNotFound)?;
        if room.read().await.seat_of(connection).is_none() {
            return Err(SessionError::NotInRoom);
        }
        Ok(room)
    }

    async fn discard(&self, code: &str) {
        let room = self.rooms.write().await.remove(code);
        if let Some(room) = room {
            let seated = room.read().await.connections();
            let mut connections = self.connections.write().await;
            for id in seated {
                if connections.get(&id).is_some_and(|c| c == code) {
                    connections.remove(&id);
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::swipe::Direction;
    use crate::game::words::fallback_words;

    fn player(name: &str) -> (RoomPlayer, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(32);
        (RoomPlayer::new(uuid::Uuid::new_v4(), name, tx), rx)
    }

    fn room() -> GameRoom {
        let (host, _) = player("Ada");
        GameRoom::new("ABC123".into(), host, Arc::new(fallback_words()), 7, SessionConfig::default())
    }

    fn started_room() -> GameRoom {
        let mut room = room();
        let (guest, _) = player("Bo");
        room.join(guest).unwrap();
        room.set_ready(Seat::Host).unwrap();
        room.set_ready(Seat::Guest).unwrap();
        room
    }

    fn swipe_at(room: &GameRoom, seat: Seat, direction: Direction, ms: u64) -> SwipeAction {
        let p = room.player(seat).unwrap();
        SwipeAction {
            room_code: room.code().to_string(),
            word_index: p.word_index(),
            definition_index: p.definition_index(),
            direction,
            swipe_time_ms: ms,
            is_correct: false,
        }
    }

    /// Accept the current card if true, reject otherwise.
    fn perfect(room: &GameRoom, seat: Seat, ms: u64) -> SwipeAction {
        let p = room.player(seat).unwrap();
        let truth = room.words()[p.word_index()].definitions[p.definition_index()].is_correct;
        let dir = if truth { Direction::Accept } else { Direction::Reject };
        SwipeAction { is_correct: true, ..swipe_at(room, seat, dir, ms) }
    }

    fn finish_seat(room: &mut GameRoom, seat: Seat, ms: u64) -> Vec<Outbound> {
        let mut last = Vec::new();
        while !room.player(seat).unwrap().finished() {
            let action = perfect(room, seat, ms);
            last = room.apply_swipe(seat, &action).unwrap();
        }
        last
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Ada  "), "Ada");
        assert_eq!(normalize_name("   "), DEFAULT_PLAYER_NAME);
        assert_eq!(normalize_name(&"x".repeat(30)).chars().count(), MAX_NAME_CHARS);
        assert_eq!(normalize_room_code(" abc123 "), "ABC123");
    }

    #[test]
    fn test_join_notifies_both_seats() {
        let mut room = room();
        let (guest, _) = player("Bo");
        let token = guest.rejoin_token.clone();

        let out = room.join(guest).unwrap();

        assert_eq!(room.phase(), SessionPhase::Ready);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].to, Seat::Guest);
        assert_eq!(out[0].message, ServerMessage::RoomJoined {
            room_code: "ABC123".into(),
            player_name: "Bo".into(),
            opponent_name: "Ada".into(),
            rejoin_token: token,
        });
        assert_eq!(out[1].message, ServerMessage::OpponentJoined { opponent_name: "Bo".into() });
    }

    #[test]
    fn test_third_player_rejected() {
        let mut room = room();
        room.join(player("Bo").0).unwrap();
        assert_eq!(room.join(player("Cy").0), Err(SessionError::RoomFull));
    }

    #[test]
    fn test_start_requires_both_ready() {
        let mut room = room();
        room.join(player("Bo").0).unwrap();

        assert!(room.set_ready(Seat::Host).unwrap().is_empty());
        assert_eq!(room.phase(), SessionPhase::Ready);

        let out = room.set_ready(Seat::Guest).unwrap();
        assert_eq!(room.phase(), SessionPhase::InProgress);
        assert_eq!(out.len(), 2);

        let ServerMessage::GameStart { words: host_words, opponent_name } = &out[0].message else {
            panic!("expected game_start");
        };
        assert_eq!(opponent_name, "Bo");
        let ServerMessage::GameStart { words: guest_words, opponent_name } = &out[1].message else {
            panic!("expected game_start");
        };
        assert_eq!(opponent_name, "Ada");
        assert_eq!(host_words, guest_words);
        assert_eq!(host_words.len(), 2);
    }

    #[test]
    fn test_ready_alone_does_not_start() {
        let mut room = room();
        assert!(room.set_ready(Seat::Host).unwrap().is_empty());
        assert_eq!(room.phase(), SessionPhase::WaitingForOpponent);
    }

    #[test]
    fn test_swipe_before_start_rejected() {
        let mut room = room();
        let action = SwipeAction {
            room_code: "ABC123".into(),
            word_index: 0,
            definition_index: 0,
            direction: Direction::Accept,
            swipe_time_ms: 0,
            is_correct: true,
        };
        assert_eq!(room.apply_swipe(Seat::Host, &action), Err(SessionError::GameNotInProgress));
    }

    #[test]
    fn test_server_scores_ignore_client_verdict() {
        let mut room = started_room();
        let good = perfect(&room, Seat::Host, 450);
        let flipped = if good.direction == Direction::Accept { Direction::Reject } else { Direction::Accept };
        // Lie about the verdict and flip the direction
        let lie = SwipeAction { direction: flipped, is_correct: true, ..good };

        let out = room.apply_swipe(Seat::Host, &lie).unwrap();
        let ServerMessage::SwipeConfirmed(confirm) = &out[0].message else {
            panic!("expected swipe_confirmed");
        };
        assert_eq!(confirm.score, 0);
        assert_eq!(confirm.total_score, 0);
    }

    #[test]
    fn test_correct_swipe_scores_speed_bonus() {
        let mut room = started_room();
        let action = perfect(&room, Seat::Host, 450);

        let out = room.apply_swipe(Seat::Host, &action).unwrap();

        let ServerMessage::SwipeConfirmed(confirm) = &out[0].message else {
            panic!("expected swipe_confirmed");
        };
        // 10 + streak 1 + (20 - 4.5 truncated)
        assert_eq!(confirm.score, 26);
        assert_eq!(confirm.total_score, 26);

        assert_eq!(out[1].to, Seat::Guest);
        assert_eq!(out[1].message, ServerMessage::OpponentProgress(OpponentProgress {
            opponent_score: 26,
            opponent_word_index: room.player(Seat::Host).unwrap().word_index(),
            opponent_finished: false,
        }));
    }

    #[test]
    fn test_out_of_sync_swipe_is_reconciled() {
        let mut room = started_room();
        let action = SwipeAction {
            definition_index: 3,
            ..perfect(&room, Seat::Guest, 100)
        };

        let out = room.apply_swipe(Seat::Guest, &action).unwrap();

        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0].message, ServerMessage::Error(e) if e.code == ErrorCode::OutOfSync));
        assert_eq!(out[1].message, ServerMessage::SwipeConfirmed(SwipeConfirmation {
            score: 0,
            total_score: 0,
            word_index: 0,
            definition_index: 0,
            finished: false,
        }));
        assert!(out.iter().all(|o| o.to == Seat::Guest));
    }

    #[test]
    fn test_invalid_word_index() {
        let mut room = started_room();
        let action = SwipeAction { word_index: 99, ..perfect(&room, Seat::Host, 0) };
        assert_eq!(room.apply_swipe(Seat::Host, &action), Err(SessionError::InvalidWordIndex(99)));
    }

    #[test]
    fn test_game_end_winner() {
        let mut room = started_room();
        // Host answers fast, guest slow
        let out = finish_seat(&mut room, Seat::Host, 0);
        assert!(!out.iter().any(|o| matches!(o.message, ServerMessage::GameEnd(_))));
        assert_eq!(room.phase(), SessionPhase::InProgress);

        let out = finish_seat(&mut room, Seat::Guest, 5_000);
        assert_eq!(room.phase(), SessionPhase::Ended);

        let results: Vec<_> = out
            .iter()
            .filter_map(|o| match &o.message {
                ServerMessage::GameEnd(r) => Some((o.to, r.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 2);

        let (_, host_view) = results.iter().find(|(s, _)| *s == Seat::Host).unwrap();
        let (_, guest_view) = results.iter().find(|(s, _)| *s == Seat::Guest).unwrap();
        assert_eq!(host_view.winner.as_deref(), Some("Ada"));
        assert_eq!(guest_view.winner.as_deref(), Some("Ada"));
        assert!(!host_view.is_tie);
        assert!(host_view.your_score > host_view.opponent_score);
        assert_eq!(host_view.your_score, guest_view.opponent_score);
    }

    #[test]
    fn test_game_end_tie() {
        let mut room = started_room();
        finish_seat(&mut room, Seat::Host, 300);
        let out = finish_seat(&mut room, Seat::Guest, 300);

        let end = out.iter().find_map(|o| match &o.message {
            ServerMessage::GameEnd(r) => Some(r.clone()),
            _ => None,
        });
        let end = end.unwrap();
        assert!(end.is_tie);
        assert_eq!(end.winner, None);
        assert_eq!(end.your_score, end.opponent_score);
    }

    #[test]
    fn test_finished_player_cannot_swipe() {
        let mut room = started_room();
        finish_seat(&mut room, Seat::Host, 300);
        let action = swipe_at(&room, Seat::Host, Direction::Accept, 0);
        let action = SwipeAction { word_index: 0, ..action };
        assert_eq!(room.apply_swipe(Seat::Host, &action), Err(SessionError::AlreadyFinished));
    }

    #[test]
    fn test_rejoin_within_grace() {
        let mut room = started_room();
        let host_conn = room.player(Seat::Host).unwrap().connection;
        let token = room.player(Seat::Host).unwrap().rejoin_token.clone();
        let t0 = Instant::now();

        room.mark_disconnected(host_conn, t0);
        assert!(!room.player(Seat::Host).unwrap().is_connected());
        assert_eq!(room.expired_seat(t0 + Duration::from_secs(5)), None);

        let (tx, _rx) = mpsc::channel(8);
        let new_conn = uuid::Uuid::new_v4();
        let (seat, out) = room.rejoin(&token, new_conn, tx, t0 + Duration::from_secs(5)).unwrap();

        assert_eq!(seat, Seat::Host);
        assert_eq!(room.seat_of(new_conn), Some(Seat::Host));
        let ServerMessage::RoomRejoined(snapshot) = &out[0].message else {
            panic!("expected room_rejoined");
        };
        assert_eq!(snapshot.phase, SessionPhase::InProgress);
        assert_eq!(snapshot.opponent_name.as_deref(), Some("Bo"));
        assert_eq!(snapshot.words.len(), 2);
    }

    #[test]
    fn test_rejoin_after_grace_fails() {
        let mut room = started_room();
        let guest_conn = room.player(Seat::Guest).unwrap().connection;
        let token = room.player(Seat::Guest).unwrap().rejoin_token.clone();
        let t0 = Instant::now();
        room.mark_disconnected(guest_conn, t0);

        let late = t0 + Duration::from_secs(11);
        assert_eq!(room.expired_seat(late), Some(Seat::Guest));

        let (tx, _rx) = mpsc::channel(8);
        let result = room.rejoin(&token, uuid::Uuid::new_v4(), tx, late);
        assert!(matches!(result, Err(SessionError::RejoinExpired)));
        assert!(matches!(
            room.rejoin("bogus", uuid::Uuid::new_v4(), mpsc::channel(1).0, t0),
            Err(SessionError::InvalidRejoinToken)
        ));
    }

    #[test]
    fn test_abandon_notifies_remaining_seat() {
        let mut room = started_room();
        let out = room.abandon(Seat::Host);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Seat::Guest);
        assert!(matches!(out[0].message, ServerMessage::OpponentDisconnected { .. }));
        assert_eq!(room.phase(), SessionPhase::Ended);
    }

    #[test]
    fn test_stale_after_retention() {
        let mut room = started_room();
        finish_seat(&mut room, Seat::Host, 0);
        finish_seat(&mut room, Seat::Guest, 0);

        let now = Instant::now();
        assert!(!room.is_stale(now));
        assert!(room.is_stale(now + Duration::from_secs(31)));
    }

    // -------------------------------------------------------------------------
    // Manager
    // -------------------------------------------------------------------------

    fn manager() -> RoomManager {
        RoomManager::with_rng(fallback_words(), SessionConfig::default(), DeterministicRng::new(11))
    }

    #[tokio::test]
    async fn test_manager_create_and_join() {
        let manager = manager();
        let (host_tx, mut host_rx) = mpsc::channel(16);
        let (guest_tx, mut guest_rx) = mpsc::channel(16);
        let host = uuid::Uuid::new_v4();
        let guest = uuid::Uuid::new_v4();

        let code = manager.create_room(host, "Ada", host_tx).await.unwrap();
        assert!(crate::core::rng::is_room_code(&code));
        assert!(matches!(host_rx.try_recv().unwrap(), ServerMessage::RoomCreated { .. }));

        let joined = manager.join_room(&code.to_lowercase(), guest, "Bo", guest_tx).await.unwrap();
        assert_eq!(joined, code);
        assert!(matches!(guest_rx.try_recv().unwrap(), ServerMessage::RoomJoined { .. }));
        assert!(matches!(host_rx.try_recv().unwrap(), ServerMessage::OpponentJoined { .. }));
        assert_eq!(manager.room_of(guest).await, Some(code));
    }

    #[tokio::test]
    async fn test_manager_join_unknown_then_retry() {
        let manager = manager();
        let host = uuid::Uuid::new_v4();
        let guest = uuid::Uuid::new_v4();
        let code = manager.create_room(host, "Ada", mpsc::channel(16).0).await.unwrap();

        let (guest_tx, _guest_rx) = mpsc::channel(16);
        let miss = manager.join_room("ZZZZZZ", guest, "Bo", guest_tx.clone()).await;
        assert_eq!(miss, Err(SessionError::RoomNotFound));
        assert_eq!(manager.room_of(guest).await, None);

        assert!(manager.join_room(&code, guest, "Bo", guest_tx).await.is_ok());
    }

    #[tokio::test]
    async fn test_manager_leave_discards_room() {
        let manager = manager();
        let host = uuid::Uuid::new_v4();
        let guest = uuid::Uuid::new_v4();
        let (guest_tx, mut guest_rx) = mpsc::channel(16);
        let code = manager.create_room(host, "Ada", mpsc::channel(16).0).await.unwrap();
        manager.join_room(&code, guest, "Bo", guest_tx).await.unwrap();
        let _ = guest_rx.try_recv();

        assert_eq!(manager.leave(host).await, Some(code.clone()));

        assert_eq!(manager.room_count().await, 0);
        assert!(matches!(guest_rx.try_recv().unwrap(), ServerMessage::OpponentDisconnected { .. }));
        assert_eq!(manager.room_of(guest).await, None);
    }

    #[tokio::test]
    async fn test_manager_sweep_expires_dropped_seat() {
        let manager = manager();
        let host = uuid::Uuid::new_v4();
        let guest = uuid::Uuid::new_v4();
        let (host_tx, mut host_rx) = mpsc::channel(16);
        let code = manager.create_room(host, "Ada", host_tx).await.unwrap();
        manager.join_room(&code, guest, "Bo", mpsc::channel(16).0).await.unwrap();
        while host_rx.try_recv().is_ok() {}

        manager.disconnect(guest).await;
        assert_eq!(manager.sweep(Instant::now()).await, 0);
        assert_eq!(manager.room_count().await, 1);

        let removed = manager.sweep(Instant::now() + Duration::from_secs(11)).await;
        assert_eq!(removed, 1);
        assert_eq!(manager.room_count().await, 0);
        assert!(matches!(host_rx.try_recv().unwrap(), ServerMessage::OpponentDisconnected { .. }));
    }

    #[tokio::test]
    async fn test_manager_rejoin_moves_connection() {
        let manager = manager();
        let host = uuid::Uuid::new_v4();
        let (host_tx, mut host_rx) = mpsc::channel(16);
        let code = manager.create_room(host, "Ada", host_tx).await.unwrap();
        let ServerMessage::RoomCreated { rejoin_token, .. } = host_rx.try_recv().unwrap() else {
            panic!("expected room_created");
        };

        manager.disconnect(host).await;
        let fresh = uuid::Uuid::new_v4();
        let (fresh_tx, mut fresh_rx) = mpsc::channel(16);
        manager.rejoin(&code, &rejoin_token, fresh, fresh_tx).await.unwrap();

        assert!(matches!(fresh_rx.try_recv().unwrap(), ServerMessage::RoomRejoined(_)));
        assert_eq!(manager.room_of(fresh).await, Some(code));
        assert_eq!(manager.room_of(host).await, None);
    }

    #[tokio::test]
    async fn test_manager_rejects_double_seat() {
        let manager = manager();
        let host = uuid::Uuid::new_v4();
        manager.create_room(host, "Ada", mpsc::channel(16).0).await.unwrap();
        let again = manager.create_room(host, "Ada", mpsc::channel(16).0).await;
        assert_eq!(again, Err(SessionError::AlreadyInRoom));
    }

    #[tokio::test]
    async fn test_manager_rejoin_from_another_live_room_is_refused() {
        let manager = manager();
        let host = uuid::Uuid::new_v4();
        let (host_tx, mut host_rx) = mpsc::channel(16);
        let first = manager.create_room(host, "Ada", host_tx).await.unwrap();
        let ServerMessage::RoomCreated { rejoin_token, .. } = host_rx.try_recv().unwrap() else {
            panic!("expected room_created");
        };
        manager.disconnect(host).await;

        // Seated elsewhere, this connection may not take over the old seat
        let busy = uuid::Uuid::new_v4();
        let second = manager.create_room(busy, "Bo", mpsc::channel(16).0).await.unwrap();
        let result = manager.rejoin(&first, &rejoin_token, busy, mpsc::channel(16).0).await;

        assert_eq!(result, Err(SessionError::AlreadyInRoom));
        assert_eq!(manager.room_of(busy).await, Some(second));
        assert_eq!(manager.room_count().await, 2);
    }
}
