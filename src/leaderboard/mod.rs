//! Leaderboard
//!
//! Score submissions, ranking and stats, served over HTTP.
//!
//! - `board`: The score store
//! - `api`: axum routes (`/api/submit-score`, `/api/leaderboard`, `/api/stats`, `/health`)

pub mod board;
pub mod api;

pub use board::{
    Leaderboard, LeaderboardError, LeaderboardRow, ScoreEntry, ScoreSubmission, Stats,
    format_time_ago, MAX_LEADERBOARD_ROWS,
};
pub use api::{router, AppState};
