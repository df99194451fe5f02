//! Input validation shared by the client and the leaderboard.

use crate::core::rng::is_room_code;

/// Longest accepted display name, in characters.
pub const MAX_PLAYER_NAME_CHARS: usize = 20;

/// Rejected user input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Name is empty after trimming.
    #[error("Please enter your name")]
    EmptyName,

    /// Name is longer than allowed.
    #[error("Name must be {max} characters or less")]
    NameTooLong {
        /// Limit in characters.
        max: usize,
    },

    /// Room code is not six letters or digits.
    #[error("Invalid room code: {0:?}")]
    InvalidRoomCode(String),
}

/// Trimmed display name, or why it is unusable.
pub fn validate_player_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_PLAYER_NAME_CHARS {
        return Err(ValidationError::NameTooLong { max: MAX_PLAYER_NAME_CHARS });
    }
    Ok(name.to_string())
}

/// Canonical room code (trimmed, upper-cased), or why it is unusable.
pub fn validate_room_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_uppercase();
    if !is_room_code(&code) {
        return Err(ValidationError::InvalidRoomCode(raw.to_string()));
    }
    Ok(code)
}
