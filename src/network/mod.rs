//! Network Layer
//!
//! Real-time head-to-head play over WebSocket.
//! Scores are computed by `game/` on the server; clients only project them.

pub mod protocol;
pub mod session;
pub mod server;
pub mod client;

pub use protocol::{
    ClientMessage, ServerMessage, SwipeAction, SwipeConfirmation,
    OpponentProgress, GameResult, RoomSnapshot, SessionPhase, ErrorCode,
};
pub use session::{GameRoom, RoomManager, SessionConfig, SessionError, Seat, ConnectionId};
pub use server::{GameServer, ServerConfig, GameServerError};
pub use client::{
    SessionClient, ClientEvent, ClientError, ConnectionEvent, ReconnectPolicy, run_connection,
};
