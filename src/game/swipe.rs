//! Swipe Resolution
//!
//! Single entry point that turns a directional decision on the presented
//! card into round transitions. Mode-specific rules are selected by the
//! [`GameMode`] tag rather than by swapping handlers at runtime.

use serde::{Serialize, Deserialize};

use crate::game::round::{ExhaustionPolicy, RoundState};
use crate::game::words::WordDeck;

/// Play mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Wrong guesses cost the streak, never the round.
    Lenient,
    /// Any wrong guess ends the round.
    #[default]
    Competitive,
    /// Head-to-head: wrong guesses score nothing, speed earns a bonus.
    Multiplayer,
}

impl GameMode {
    /// Policy when a word runs out of candidates.
    pub fn exhaustion_policy(self) -> ExhaustionPolicy {
        match self {
            GameMode::Competitive => ExhaustionPolicy::EndRound,
            GameMode::Lenient | GameMode::Multiplayer => ExhaustionPolicy::AdvanceWord,
        }
    }

    /// Whether response time feeds the score.
    pub fn uses_speed_bonus(self) -> bool {
        self == GameMode::Multiplayer
    }
}

/// Swipe direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Swipe right: "this is the definition".
    #[serde(rename = "right")]
    Accept,
    /// Swipe left: "this is not the definition".
    #[serde(rename = "left")]
    Reject,
}

impl Direction {
    /// True for [`Direction::Accept`].
    pub fn is_accept(self) -> bool {
        self == Direction::Accept
    }
}

/// What a resolved swipe did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwipeOutcome {
    /// The decision matched the card.
    pub was_correct: bool,
    /// The card was a true definition.
    pub definition_was_true: bool,
    /// Points awarded.
    pub points: u32,
    /// The swipe finished the word.
    pub word_completed: bool,
    /// The round ended on this swipe.
    pub round_over: bool,
}

/// Swipe could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwipeError {
    /// Round already ended.
    #[error("Round is over")]
    RoundOver,

    /// No card at the current position.
    #[error("No card at word {word_index}, definition {definition_index}")]
    NoCard {
        /// Word position.
        word_index: usize,
        /// Definition position.
        definition_index: usize,
    },
}

/// Resolve one decision on the presented card.
///
/// The transition is atomic: on error nothing has been mutated.
pub fn resolve_swipe(
    mode: GameMode,
    state: &mut RoundState,
    deck: &mut WordDeck,
    direction: Direction,
    elapsed_ms: Option<u64>,
) -> Result<SwipeOutcome, SwipeError> {
    if state.is_over {
        return Err(SwipeError::RoundOver);
    }

    let definition_was_true = state
        .current_definition(deck)
        .map(|d| d.is_correct)
        .ok_or(SwipeError::NoCard {
            word_index: state.word_index,
            definition_index: state.definition_index,
        })?;

    let was_correct = direction.is_accept() == definition_was_true;
    let words_before = state.words_learned;
    let mut points = 0;

    if was_correct {
        let elapsed = if mode.uses_speed_bonus() { elapsed_ms } else { None };
        points = state.register_correct(elapsed);

        if definition_was_true {
            state.advance_word(deck);
        } else {
            state.advance_definition(deck, mode.exhaustion_policy());
        }
    } else {
        state.register_incorrect();

        match mode {
            GameMode::Competitive => state.end_round(),
            GameMode::Lenient | GameMode::Multiplayer => {
                if definition_was_true {
                    // Missed the true definition; the word is used up
                    state.advance_word(deck);
                } else {
                    state.advance_definition(deck, mode.exhaustion_policy());
                }
            }
        }
    }

    Ok(SwipeOutcome {
        was_correct,
        definition_was_true,
        points,
        word_completed: state.words_learned > words_before,
        round_over: state.is_over,
    })
}

// =============================================================================
// TESTS
// =============================================================================
