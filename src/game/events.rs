//! Round Events
//!
//! Notifications emitted by the round state machine for the rendering,
//! dictionary and persistence collaborators. Events are queued on the round
//! and drained by whoever drives it.

use serde::{Serialize, Deserialize};

/// Final figures for a finished round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Final score.
    pub score: u32,
    /// Correct decisions.
    pub correct: u32,
    /// Incorrect decisions.
    pub incorrect: u32,
    /// Longest streak reached.
    pub max_streak: u32,
    /// Words completed.
    pub words_learned: u32,
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    /// A decision was resolved.
    Feedback {
        /// Whether the decision was correct.
        correct: bool,
        /// Points awarded (0 when incorrect).
        points: u32,
        /// Score after the decision.
        score: u32,
        /// Streak after the decision.
        streak: u32,
    },

    /// A word was finished; carries the finished word for lookup.
    WordCompleted {
        /// The word just completed.
        word: String,
    },

    /// The round is over.
    GameOver(RoundSummary),
}

impl RoundEvent {
    /// Create feedback for a correct decision.
    pub fn correct(points: u32, score: u32, streak: u32) -> Self {
        RoundEvent::Feedback { correct: true, points, score, streak }
    }

    /// Create feedback for an incorrect decision.
    pub fn incorrect(score: u32) -> Self {
        RoundEvent::Feedback { correct: false, points: 0, score, streak: 0 }
    }

    /// Whether this event ends the round.
    pub fn is_game_over(&self) -> bool {
        matches!(self, RoundEvent::GameOver(_))
    }
}
