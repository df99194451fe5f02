//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message tagged with its event name:
//! `{"type": "<event>", ...fields}`.

use serde::{Serialize, Deserialize};

use crate::game::swipe::Direction;
use crate::game::words::Word;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a new room as host.
    CreateGame {
        /// Display name.
        #[serde(default)]
        player_name: String,
    },

    /// Join an existing room as guest.
    JoinGame {
        /// Room code as typed by the player.
        room_code: String,
        /// Display name.
        #[serde(default)]
        player_name: String,
    },

    /// Ready to start.
    PlayerReady {
        /// Room code.
        room_code: String,
    },

    /// Decision on a card.
    SwipeAction(SwipeAction),

    /// Reclaim a seat after a dropped connection.
    RejoinRoom {
        /// Room code.
        room_code: String,
        /// Token issued when the seat was taken.
        rejoin_token: String,
    },

    /// Leave the room for good.
    LeaveRoom {
        /// Room code.
        room_code: String,
    },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// A decision on a dealt card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeAction {
    /// Room code.
    pub room_code: String,
    /// Word position the client believes is current.
    pub word_index: usize,
    /// Definition position the client believes is current.
    pub definition_index: usize,
    /// Swipe direction (`"left"` / `"right"`).
    pub direction: Direction,
    /// Time since the card was shown.
    #[serde(default)]
    pub swipe_time_ms: u64,
    /// Client's own verdict. Informational only.
    #[serde(default)]
    pub is_correct: bool,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting on connect.
    Connected { message: String },

    /// Room opened; sent to the host.
    RoomCreated {
        /// Allocated room code.
        room_code: String,
        /// Host name as stored.
        player_name: String,
        /// Token for reclaiming the seat.
        rejoin_token: String,
    },

    /// Seat taken; sent to the guest.
    RoomJoined {
        /// Room code.
        room_code: String,
        /// Guest name as stored.
        player_name: String,
        /// Host name.
        opponent_name: String,
        /// Token for reclaiming the seat.
        rejoin_token: String,
    },

    /// A guest arrived; sent to the host.
    OpponentJoined { opponent_name: String },

    /// Join refused.
    JoinError { message: String },

    /// Both players ready; play begins.
    GameStart {
        /// Dealt words, identical for both players.
        words: Vec<Word>,
        /// Opponent name.
        opponent_name: String,
    },

    /// Authoritative result of the sender's swipe.
    SwipeConfirmed(SwipeConfirmation),

    /// Opponent's progress.
    OpponentProgress(OpponentProgress),

    /// Both players finished.
    GameEnd(GameResult),

    /// Opponent left or did not come back in time.
    OpponentDisconnected { message: String },

    /// Seat restored.
    RoomRejoined(RoomSnapshot),

    /// Seat could not be restored.
    RejoinError { message: String },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Swipe confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeConfirmation {
    /// Points for this swipe.
    pub score: u32,
    /// Authoritative total.
    pub total_score: u32,
    /// Server word cursor after the swipe.
    pub word_index: usize,
    /// Server definition cursor after the swipe.
    #[serde(default)]
    pub definition_index: usize,
    /// All dealt words are done.
    #[serde(default)]
    pub finished: bool,
}

/// Opponent progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentProgress {
    /// Opponent total.
    pub opponent_score: u32,
    /// Opponent word cursor.
    pub opponent_word_index: usize,
    /// Opponent is done.
    pub opponent_finished: bool,
}

/// Final result, from the recipient's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// Recipient's score.
    pub your_score: u32,
    /// Opponent's score.
    pub opponent_score: u32,
    /// Winner's name; `None` on a tie.
    pub winner: Option<String>,
    /// Scores are equal.
    pub is_tie: bool,
}

/// State handed back on a successful rejoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room code.
    pub room_code: String,
    /// Room phase.
    pub phase: SessionPhase,
    /// Dealt words (empty before the game starts).
    pub words: Vec<Word>,
    /// Recipient's score.
    pub your_score: u32,
    /// Recipient's word cursor.
    pub your_word_index: usize,
    /// Recipient's definition cursor.
    pub your_definition_index: usize,
    /// Recipient is done.
    pub your_finished: bool,
    /// Opponent name, if seated.
    pub opponent_name: Option<String>,
    /// Opponent score.
    pub opponent_score: u32,
    /// Opponent word cursor.
    pub opponent_word_index: usize,
    /// Opponent is done.
    pub opponent_finished: bool,
}

/// Room lifecycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Not in a room.
    #[default]
    Lobby,
    /// Room open, no guest yet.
    WaitingForOpponent,
    /// Both seated, readiness pending.
    Ready,
    /// Words dealt, play under way.
    InProgress,
    /// Both finished.
    Ended,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be parsed.
    InvalidMessage,
    /// Room not found.
    RoomNotFound,
    /// Room is full or already playing.
    RoomUnavailable,
    /// Sender has no seat in the room.
    NotInRoom,
    /// Sender already holds a seat elsewhere.
    AlreadyInRoom,
    /// Room is not in play.
    GameNotInProgress,
    /// Word index outside the dealt words.
    InvalidWordIndex,
    /// Swipe addressed a card other than the current one.
    OutOfSync,
    /// Sender already finished.
    AlreadyFinished,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl ServerMessage {
    /// Build an error frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::words::fallback_words;

    #[test]
    fn test_swipe_action_wire_format() {
        let json = r#"{
            "type": "swipe_action",
            "room_code": "ABC123",
            "word_index": 2,
            "definition_index": 1,
            "direction": "right",
            "swipe_time_ms": 450,
            "is_correct": true
        }"#;

        match ClientMessage::from_json(json).unwrap() {
            ClientMessage::SwipeAction(action) => {
                assert_eq!(action.room_code, "ABC123");
                assert_eq!(action.word_index, 2);
                assert_eq!(action.direction, Direction::Accept);
                assert_eq!(action.swipe_time_ms, 450);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_create_game_name_defaults() {
        let msg = ClientMessage::from_json(r#"{"type": "create_game"}"#).unwrap();
        assert_eq!(msg, ClientMessage::CreateGame { player_name: String::new() });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(ClientMessage::from_json(r#"{"type": "teleport"}"#).is_err());
    }

    #[test]
    fn test_game_start_carries_words_in_file_format() {
        let msg = ServerMessage::GameStart {
            words: fallback_words(),
            opponent_name: "Bo".into(),
        };
        let json = msg.to_json().unwrap();

        assert!(json.starts_with(r#"{"type":"game_start""#));
        assert!(json.contains(r#""word":"Serendipity""#));
        assert!(json.contains(r#""correct":true"#));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_game_end_shape() {
        let msg = ServerMessage::GameEnd(GameResult {
            your_score: 40,
            opponent_score: 40,
            winner: None,
            is_tie: true,
        });
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "game_end");
        assert_eq!(value["winner"], serde_json::Value::Null);
        assert_eq!(value["is_tie"], true);
    }

    #[test]
    fn test_error_codes() {
        let json = ServerMessage::error(ErrorCode::OutOfSync, "Swipe does not match").to_json().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("out_of_sync"));
    }

    #[test]
    fn test_phase_names() {
        let json = serde_json::to_string(&SessionPhase::WaitingForOpponent).unwrap();
        assert_eq!(json, "\"waiting_for_opponent\"");
    }
}
