//! Session Client
//!
//! Client side of a head-to-head game: a projection of the room that turns
//! user intents into [`ClientMessage`]s and server traffic into
//! [`ClientEvent`]s for the UI, plus a reconnecting WebSocket driver.
//!
//! The projection never touches the network. [`run_connection`] owns the
//! socket and feeds it through channels:
//!
//! ```text
//! UI intent -> SessionClient -> ClientMessage -> outgoing tx -> run_connection -> server
//! server -> run_connection -> ConnectionEvent -> events rx -> SessionClient -> ClientEvent -> UI
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn, instrument};

use crate::core::validate::{validate_player_name, validate_room_code, ValidationError};
use crate::game::play::{Card, CardId, GameLoop, PlayError, SwipeResult};
use crate::game::swipe::{Direction, GameMode};
use crate::game::words::{Word, WordDeck};
use crate::network::protocol::{
    ClientMessage, ErrorCode, GameResult, OpponentProgress, RoomSnapshot, ServerError,
    ServerMessage, SessionPhase, SwipeAction, SwipeConfirmation,
};

// =============================================================================
// ERRORS
// =============================================================================

/// Client-side failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Input rejected before anything was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Swipe rejected by the local game loop.
    #[error(transparent)]
    Play(#[from] PlayError),

    /// Intent not available in the current phase.
    #[error("Not available while {0:?}")]
    WrongPhase(SessionPhase),

    /// Reconnect attempts exhausted.
    #[error("Gave up after {0} reconnect attempts")]
    GaveUp(u32),
}

// =============================================================================
// CONNECTION DRIVER
// =============================================================================

/// Bounded reconnect schedule with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries after a failed or dropped connection.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Ping interval while connected, so a quiet lobby is not timed out.
    pub keepalive: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            keepalive: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1)).min(self.max_delay)
    }
}

/// Transport events, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// First connection established.
    Connected,
    /// Connection lost; a retry follows unless attempts are exhausted.
    Disconnected {
        /// What ended the connection.
        reason: String,
    },
    /// Connection re-established after a drop.
    Reconnected {
        /// Retries it took.
        attempts: u32,
    },
    /// A connection attempt failed.
    ConnectError {
        /// Error text.
        message: String,
    },
    /// Reconnect attempts exhausted. No further events follow.
    GaveUp {
        /// Retries made.
        attempts: u32,
    },
    /// A frame from the server.
    Message(ServerMessage),
}

/// Drive a WebSocket connection to `url` until `outgoing` closes or the
/// reconnect policy gives up.
///
/// Messages sent on `outgoing` while the socket is down are delivered after
/// the next successful connect.
#[instrument(skip(outgoing, events))]
pub async fn run_connection(
    url: String,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::Receiver<ClientMessage>,
    events: mpsc::Sender<ConnectionEvent>,
) -> Result<(), ClientError> {
    let mut retries = 0u32;
    let mut connected_before = false;

    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                let event = if connected_before {
                    info!("Reconnected to {} after {} attempts", url, retries);
                    ConnectionEvent::Reconnected { attempts: retries }
                } else {
                    info!("Connected to {}", url);
                    ConnectionEvent::Connected
                };
                if events.send(event).await.is_err() {
                    return Ok(());
                }
                connected_before = true;
                retries = 0;

                let (mut write, mut read) = ws_stream.split();
                let start = tokio::time::Instant::now() + policy.keepalive;
                let mut keepalive = tokio::time::interval_at(start, policy.keepalive);
                let reason = loop {
                    tokio::select! {
                        _ = keepalive.tick() => {
                            let ping = ClientMessage::Ping {
                                timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
                            };
                            let Ok(text) = ping.to_json() else { continue };
                            if let Err(e) = write.send(Message::Text(text)).await {
                                error!("Keepalive failed: {}", e);
                                break e.to_string();
                            }
                        }
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                                Ok(msg) => {
                                    if events.send(ConnectionEvent::Message(msg)).await.is_err() {
                                        let _ = write.close().await;
                                        return Ok(());
                                    }
                                }
                                Err(e) => warn!("Failed to parse server message: {} - {}", e, text),
                            },
                            Some(Ok(Message::Close(_))) | None => break "Server closed connection".to_string(),
                            Some(Err(e)) => {
                                error!("WebSocket read error: {}", e);
                                break e.to_string();
                            }
                            _ => {}
                        },
                        msg = outgoing.recv() => match msg {
                            Some(msg) => {
                                let text = match msg.to_json() {
                                    Ok(t) => t,
                                    Err(e) => {
                                        error!("Failed to serialize message: {}", e);
                                        continue;
                                    }
                                };
                                debug!("Sending: {}", text);
                                if let Err(e) = write.send(Message::Text(text)).await {
                                    error!("Failed to send message: {}", e);
                                    break e.to_string();
                                }
                            }
                            None => {
                                let _ = write.close().await;
                                return Ok(());
                            }
                        },
                    }
                };

                warn!("Disconnected from {}: {}", url, reason);
                if events.send(ConnectionEvent::Disconnected { reason }).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", url, e);
                let message = e.to_string();
                if events.send(ConnectionEvent::ConnectError { message }).await.is_err() {
                    return Ok(());
                }
            }
        }

        if retries >= policy.max_attempts {
            let _ = events.send(ConnectionEvent::GaveUp { attempts: retries }).await;
            return Err(ClientError::GaveUp(retries));
        }
        retries += 1;
        tokio::time::sleep(policy.delay_for(retries)).await;
    }
}

// =============================================================================
// CLIENT PROJECTION
// =============================================================================

/// What this end knows about the opponent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpponentView {
    /// Display name, once known.
    pub name: Option<String>,
    /// Last reported score.
    pub score: u32,
    /// Last reported word cursor.
    pub word_index: usize,
    /// Opponent is done.
    pub finished: bool,
}

impl OpponentView {
    /// Older than what is already shown.
    fn is_stale(&self, progress: &OpponentProgress) -> bool {
        progress.opponent_word_index < self.word_index
            || (progress.opponent_word_index == self.word_index && progress.opponent_score < self.score)
    }
}

/// Notifications for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport is up.
    Online,
    /// Transport dropped; the seat is held while reconnecting.
    ConnectionLost,
    /// Our room is open.
    RoomCreated {
        /// Code to share.
        room_code: String,
    },
    /// We took the guest seat.
    RoomJoined {
        /// Room code.
        room_code: String,
        /// Host name.
        opponent_name: String,
    },
    /// A guest arrived in our room.
    OpponentJoined {
        /// Guest name.
        opponent_name: String,
    },
    /// Join refused; the player may try another code.
    JoinFailed {
        /// Reason.
        message: String,
    },
    /// Play begins.
    GameStarted {
        /// Opponent name.
        opponent_name: String,
        /// First card.
        card: Option<Card>,
    },
    /// Authoritative score for one of our swipes.
    ScoreConfirmed {
        /// Points for that swipe.
        points: u32,
        /// Authoritative total.
        total_score: u32,
    },
    /// Local cursor moved to the server's position.
    Resynced {
        /// Card now on top.
        card: Option<Card>,
    },
    /// Opponent progress changed.
    OpponentUpdated(OpponentView),
    /// Both players finished.
    GameEnded(GameResult),
    /// Opponent is gone; back in the lobby.
    OpponentLeft {
        /// Server notice.
        message: String,
    },
    /// Seat restored after a reconnect.
    Rejoined {
        /// Room phase.
        phase: SessionPhase,
        /// Card now on top.
        card: Option<Card>,
    },
    /// Multiplayer unavailable; continue alone.
    SinglePlayer {
        /// Why.
        reason: String,
    },
    /// Error frame from the server.
    ServerError(ServerError),
}

/// Result of feeding a connection event to the client.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Frames to send.
    pub outgoing: Vec<ClientMessage>,
    /// Notifications for the UI.
    pub events: Vec<ClientEvent>,
}

impl Reaction {
    fn events(events: Vec<ClientEvent>) -> Self {
        Self { outgoing: Vec::new(), events }
    }
}

/// Position a confirmation is expected to report, plus the optimistic
/// total right after that swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    word_index: usize,
    definition_index: usize,
    finished: bool,
    score_after: u32,
}

impl Cursor {
    fn matches(&self, c: &SwipeConfirmation) -> bool {
        (self.word_index, self.definition_index, self.finished)
            == (c.word_index, c.definition_index, c.finished)
    }
}

/// Client projection of a head-to-head room.
#[derive(Debug, Default)]
pub struct SessionClient {
    phase: SessionPhase,
    player_name: Option<String>,
    room_code: Option<String>,
    rejoin_token: Option<String>,
    opponent: OpponentView,
    game: Option<GameLoop>,
    word_shown_at: Option<Instant>,
    unconfirmed: VecDeque<Cursor>,
    resync_pending: bool,
    last_result: Option<GameResult>,
    single_player: bool,
}

impl SessionClient {
    /// Create a client in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Local phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Room code, when seated.
    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    /// Rejoin token, when seated.
    pub fn rejoin_token(&self) -> Option<&str> {
        self.rejoin_token.as_deref()
    }

    /// Name as accepted by the server.
    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    /// Opponent projection.
    pub fn opponent(&self) -> &OpponentView {
        &self.opponent
    }

    /// Multiplayer game loop, while a game is dealt.
    pub fn game(&self) -> Option<&GameLoop> {
        self.game.as_ref()
    }

    /// Local (optimistic, then reconciled) score.
    pub fn score(&self) -> u32 {
        self.game.as_ref().map_or(0, |g| g.round().score)
    }

    /// Result of the last finished game.
    pub fn last_result(&self) -> Option<&GameResult> {
        self.last_result.as_ref()
    }

    /// Multiplayer has been abandoned for this session.
    pub fn is_single_player(&self) -> bool {
        self.single_player
    }

    // -------------------------------------------------------------------------
    // Intents
    // -------------------------------------------------------------------------

    /// Open a room.
    pub fn create_game(&mut self, player_name: &str) -> Result<ClientMessage, ClientError> {
        self.ensure_unseated()?;
        let player_name = validate_player_name(player_name)?;

        self.player_name = Some(player_name.clone());
        Ok(ClientMessage::CreateGame { player_name })
    }

    /// Ask to join a room by code.
    pub fn join_game(&mut self, room_code: &str, player_name: &str) -> Result<ClientMessage, ClientError> {
        self.ensure_unseated()?;
        let room_code = validate_room_code(room_code)?;
        let player_name = validate_player_name(player_name)?;

        self.player_name = Some(player_name.clone());
        Ok(ClientMessage::JoinGame { room_code, player_name })
    }

    /// Signal readiness.
    pub fn ready(&mut self) -> Result<ClientMessage, ClientError> {
        match (&self.room_code, self.phase) {
            (Some(room_code), SessionPhase::WaitingForOpponent | SessionPhase::Ready) => {
                Ok(ClientMessage::PlayerReady { room_code: room_code.clone() })
            }
            _ => Err(ClientError::WrongPhase(self.phase)),
        }
    }

    /// Swipe the card on top. Applied optimistically; the returned frame
    /// carries the card's position and the time since its word was shown.
    pub fn swipe(
        &mut self,
        card: CardId,
        direction: Direction,
        now: Instant,
    ) -> Result<(SwipeResult, ClientMessage), ClientError> {
        let (Some(room_code), SessionPhase::InProgress) = (&self.room_code, self.phase) else {
            return Err(ClientError::WrongPhase(self.phase));
        };
        let game = self.game.as_mut().ok_or(ClientError::WrongPhase(self.phase))?;
        let shown = game.current_card().ok_or(PlayError::RoundOver)?;

        let elapsed = self
            .word_shown_at
            .map_or(0, |at| now.saturating_duration_since(at).as_millis() as u64);
        let result = game.swipe(card, direction, Some(elapsed))?;

        let round = game.round();
        self.unconfirmed.push_back(Cursor {
            word_index: round.word_index,
            definition_index: round.definition_index,
            finished: round.is_over,
            score_after: round.score,
        });
        if result.next_card.as_ref().map_or(true, |next| next.word_index != shown.word_index) {
            self.word_shown_at = Some(now);
        }

        let message = ClientMessage::SwipeAction(SwipeAction {
            room_code: room_code.clone(),
            word_index: shown.word_index,
            definition_index: shown.definition_index,
            direction,
            swipe_time_ms: elapsed,
            is_correct: result.outcome.was_correct,
        });
        Ok((result, message))
    }

    /// Leave the room and return to the lobby.
    pub fn leave(&mut self) -> Option<ClientMessage> {
        let room_code = self.room_code.clone()?;
        self.reset_to_lobby();
        Some(ClientMessage::LeaveRoom { room_code })
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Apply a transport event.
    pub fn handle(&mut self, event: ConnectionEvent, now: Instant) -> Reaction {
        match event {
            ConnectionEvent::Connected => Reaction::events(vec![ClientEvent::Online]),
            ConnectionEvent::Disconnected { .. } => Reaction::events(vec![ClientEvent::ConnectionLost]),
            ConnectionEvent::Reconnected { .. } => {
                let outgoing = match (&self.room_code, &self.rejoin_token) {
                    (Some(room_code), Some(rejoin_token)) if self.phase != SessionPhase::Ended => {
                        vec![ClientMessage::RejoinRoom {
                            room_code: room_code.clone(),
                            rejoin_token: rejoin_token.clone(),
                        }]
                    }
                    _ => Vec::new(),
                };
                Reaction { outgoing, events: vec![ClientEvent::Online] }
            }
            ConnectionEvent::ConnectError { .. } => Reaction::default(),
            ConnectionEvent::GaveUp { attempts } => {
                let reason = format!("Could not reach the server after {} attempts", attempts);
                Reaction::events(vec![self.fall_back(reason)])
            }
            ConnectionEvent::Message(msg) => Reaction::events(self.handle_message(msg, now)),
        }
    }

    /// Apply a server frame.
    pub fn handle_message(&mut self, msg: ServerMessage, now: Instant) -> Vec<ClientEvent> {
        match msg {
            ServerMessage::Connected { .. } | ServerMessage::Pong { .. } => Vec::new(),

            ServerMessage::RoomCreated { room_code, player_name, rejoin_token } => {
                self.seat(&room_code, player_name, rejoin_token);
                self.phase = SessionPhase::WaitingForOpponent;
                vec![ClientEvent::RoomCreated { room_code }]
            }

            ServerMessage::RoomJoined { room_code, player_name, opponent_name, rejoin_token } => {
                self.seat(&room_code, player_name, rejoin_token);
                self.opponent.name = Some(opponent_name.clone());
                self.phase = SessionPhase::Ready;
                vec![ClientEvent::RoomJoined { room_code, opponent_name }]
            }

            ServerMessage::OpponentJoined { opponent_name } => {
                self.opponent.name = Some(opponent_name.clone());
                self.phase = SessionPhase::Ready;
                vec![ClientEvent::OpponentJoined { opponent_name }]
            }

            ServerMessage::JoinError { message } => vec![ClientEvent::JoinFailed { message }],

            ServerMessage::GameStart { words, opponent_name } => {
                let card = self.deal(words, now);
                self.opponent = OpponentView { name: Some(opponent_name.clone()), ..Default::default() };
                self.phase = SessionPhase::InProgress;
                vec![ClientEvent::GameStarted { opponent_name, card }]
            }

            ServerMessage::SwipeConfirmed(confirmation) => self.confirm(&confirmation, now),

            ServerMessage::OpponentProgress(progress) => {
                if self.opponent.is_stale(&progress) {
                    debug!(?progress, "Discarding stale opponent progress");
                    return Vec::new();
                }
                self.opponent.score = progress.opponent_score;
                self.opponent.word_index = progress.opponent_word_index;
                self.opponent.finished = progress.opponent_finished;
                vec![ClientEvent::OpponentUpdated(self.opponent.clone())]
            }

            ServerMessage::GameEnd(result) => {
                if let Some(game) = self.game.as_mut() {
                    game.reconcile_score(result.your_score);
                }
                self.phase = SessionPhase::Ended;
                self.unconfirmed.clear();
                self.last_result = Some(result.clone());
                vec![ClientEvent::GameEnded(result)]
            }

            ServerMessage::OpponentDisconnected { message } => {
                self.reset_to_lobby();
                vec![ClientEvent::OpponentLeft { message }]
            }

            ServerMessage::RoomRejoined(snapshot) => self.restore(snapshot, now),

            ServerMessage::RejoinError { message } => vec![self.fall_back(message)],

            ServerMessage::Error(error) => {
                if error.code == ErrorCode::OutOfSync {
                    self.resync_pending = true;
                }
                vec![ClientEvent::ServerError(error)]
            }

            ServerMessage::Shutdown { reason } => vec![self.fall_back(reason)],
        }
    }

    fn confirm(&mut self, confirmation: &SwipeConfirmation, now: Instant) -> Vec<ClientEvent> {
        let Some(game) = self.game.as_mut() else {
            return Vec::new();
        };

        let mut events = vec![ClientEvent::ScoreConfirmed {
            points: confirmation.score,
            total_score: confirmation.total_score,
        }];

        let expected = self.unconfirmed.pop_front();
        match expected {
            Some(cursor) if !self.resync_pending && cursor.matches(confirmation) => {
                // Later swipes are still in flight; keep their optimistic points
                let ahead = game.round().score.saturating_sub(cursor.score_after);
                game.reconcile_score(confirmation.total_score + ahead);
            }
            _ => {
                debug!(?expected, ?confirmation, "Realigning to server cursor");
                self.resync_pending = false;
                self.unconfirmed.clear();
                game.reconcile_score(confirmation.total_score);
                let card = game.realign(
                    confirmation.word_index,
                    confirmation.definition_index,
                    confirmation.finished,
                );
                self.word_shown_at = Some(now);
                events.push(ClientEvent::Resynced { card });
            }
        }
        events
    }

    fn restore(&mut self, snapshot: RoomSnapshot, now: Instant) -> Vec<ClientEvent> {
        self.room_code = Some(snapshot.room_code);
        self.phase = snapshot.phase;
        self.opponent = OpponentView {
            name: snapshot.opponent_name,
            score: snapshot.opponent_score,
            word_index: snapshot.opponent_word_index,
            finished: snapshot.opponent_finished,
        };

        let card = if snapshot.words.is_empty() {
            self.game = None;
            None
        } else {
            self.deal(snapshot.words, now);
            let game = self.game.as_mut();
            game.and_then(|game| {
                game.reconcile_score(snapshot.your_score);
                game.realign(
                    snapshot.your_word_index,
                    snapshot.your_definition_index,
                    snapshot.your_finished,
                )
            })
        };

        info!(phase = ?self.phase, "Seat restored");
        vec![ClientEvent::Rejoined { phase: self.phase, card }]
    }

    fn deal(&mut self, words: Vec<Word>, now: Instant) -> Option<Card> {
        let mut game = GameLoop::new(GameMode::Multiplayer, WordDeck::fixed(words));
        let card = game.start();
        self.game = Some(game);
        self.word_shown_at = Some(now);
        self.unconfirmed.clear();
        self.resync_pending = false;
        card
    }

    fn seat(&mut self, room_code: &str, player_name: String, rejoin_token: String) {
        self.room_code = Some(room_code.to_string());
        self.player_name = Some(player_name);
        self.rejoin_token = Some(rejoin_token);
        self.single_player = false;
    }

    fn ensure_unseated(&self) -> Result<(), ClientError> {
        match self.phase {
            SessionPhase::Lobby | SessionPhase::Ended => Ok(()),
            phase => Err(ClientError::WrongPhase(phase)),
        }
    }

    fn reset_to_lobby(&mut self) {
        self.phase = SessionPhase::Lobby;
        self.room_code = None;
        self.rejoin_token = None;
        self.opponent = OpponentView::default();
        self.game = None;
        self.word_shown_at = None;
        self.unconfirmed.clear();
        self.resync_pending = false;
    }

    fn fall_back(&mut self, reason: String) -> ClientEvent {
        warn!("Falling back to single-player: {}", reason);
        self.reset_to_lobby();
        self.single_player = true;
        ClientEvent::SinglePlayer { reason }
    }
}

// =============================================================================
// TESTS
// =============================================================================
