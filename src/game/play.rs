//! Game Loop
//!
//! Drives a [`RoundState`] from user decisions. Each dealt card carries a
//! [`CardId`]; input addresses a card by id, and only one decision may be in
//! flight at a time (the swipe animation window on a real front end).

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::game::events::{RoundEvent, RoundSummary};
use crate::game::round::RoundState;
use crate::game::swipe::{resolve_swipe, Direction, GameMode, SwipeError, SwipeOutcome};
use crate::game::words::WordDeck;

/// Identifier of a dealt card. Strictly increasing within a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CardId(pub u64);

/// A card as presented to the player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card id.
    pub id: CardId,
    /// Target word.
    pub word: String,
    /// Candidate definition text.
    pub definition: String,
    /// Position of the word in the deck.
    pub word_index: usize,
    /// Position of the definition within the word.
    pub definition_index: usize,
}

/// A decision that has been accepted but not yet applied.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingSwipe {
    card: CardId,
    direction: Direction,
    elapsed_ms: Option<u64>,
}

impl PendingSwipe {
    /// Card the decision targets.
    pub fn card(&self) -> CardId {
        self.card
    }

    /// Decision direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

/// Result of an applied decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwipeResult {
    /// What the decision did to the round.
    pub outcome: SwipeOutcome,
    /// Next card, if the round continues.
    pub next_card: Option<Card>,
}

/// Decision rejected by the loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    /// Another decision is still being resolved.
    #[error("A swipe is already in flight for card {0:?}")]
    SwipeInFlight(CardId),

    /// The addressed card is no longer on top.
    #[error("Card {got:?} is stale (current: {current:?})")]
    StaleCard {
        /// Card on top.
        current: Option<CardId>,
        /// Card addressed.
        got: CardId,
    },

    /// Round has ended.
    #[error("Round is over")]
    RoundOver,

    /// Swipe resolution failed.
    #[error(transparent)]
    Swipe(#[from] SwipeError),
}

/// Round driver for one player.
#[derive(Debug)]
pub struct GameLoop {
    mode: GameMode,
    deck: WordDeck,
    round: RoundState,
    current: Option<CardId>,
    next_id: u64,
    in_flight: Option<CardId>,
}

impl GameLoop {
    /// Create a loop. Call [`GameLoop::start`] to deal the first card.
    pub fn new(mode: GameMode, deck: WordDeck) -> Self {
        Self {
            mode,
            deck,
            round: RoundState::new(),
            current: None,
            next_id: 0,
            in_flight: None,
        }
    }

    /// Play mode.
    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Switch mode for the next round.
    pub fn set_mode(&mut self, mode: GameMode) {
        self.mode = mode;
    }

    /// Active deck.
    pub fn deck(&self) -> &WordDeck {
        &self.deck
    }

    /// Round state.
    pub fn round(&self) -> &RoundState {
        &self.round
    }

    /// Current figures.
    pub fn summary(&self) -> RoundSummary {
        self.round.summary()
    }

    /// Whether the round has ended.
    pub fn is_over(&self) -> bool {
        self.round.is_over
    }

    /// Reset the round and deal the first card.
    pub fn start(&mut self) -> Option<Card> {
        self.round.reset_round(&mut self.deck);
        self.in_flight = None;
        self.deal()
    }

    /// Card on top, if any.
    pub fn current_card(&self) -> Option<Card> {
        let id = self.current?;
        self.card_at_cursor(id)
    }

    /// Accept a decision on `card`. Holds the in-flight guard until the
    /// pending swipe is finished or cancelled.
    pub fn begin_swipe(
        &mut self,
        card: CardId,
        direction: Direction,
        elapsed_ms: Option<u64>,
    ) -> Result<PendingSwipe, PlayError> {
        if let Some(active) = self.in_flight {
            return Err(PlayError::SwipeInFlight(active));
        }
        if self.round.is_over {
            return Err(PlayError::RoundOver);
        }
        if self.current != Some(card) {
            return Err(PlayError::StaleCard { current: self.current, got: card });
        }

        self.in_flight = Some(card);
        Ok(PendingSwipe { card, direction, elapsed_ms })
    }

    /// Apply a pending decision and deal the next card.
    pub fn finish_swipe(&mut self, pending: PendingSwipe) -> Result<SwipeResult, PlayError> {
        if self.in_flight != Some(pending.card) {
            return Err(PlayError::StaleCard { current: self.current, got: pending.card });
        }
        self.in_flight = None;

        let outcome = resolve_swipe(
            self.mode,
            &mut self.round,
            &mut self.deck,
            pending.direction,
            pending.elapsed_ms,
        )?;

        debug!(
            card = pending.card.0,
            correct = outcome.was_correct,
            points = outcome.points,
            "Swipe resolved"
        );

        let next_card = self.deal();
        Ok(SwipeResult { outcome, next_card })
    }

    /// Drop a pending decision without touching the round.
    pub fn cancel_swipe(&mut self, pending: PendingSwipe) {
        if self.in_flight == Some(pending.card) {
            self.in_flight = None;
        }
    }

    /// Begin and finish in one step.
    pub fn swipe(
        &mut self,
        card: CardId,
        direction: Direction,
        elapsed_ms: Option<u64>,
    ) -> Result<SwipeResult, PlayError> {
        let pending = self.begin_swipe(card, direction, elapsed_ms)?;
        self.finish_swipe(pending)
    }

    /// Overwrite the score with an authoritative value.
    pub fn reconcile_score(&mut self, authoritative: u32) {
        self.round.reconcile_score(authoritative);
    }

    /// Move the cursors to an authoritative position and deal from there.
    /// Any decision in flight is dropped, and a round this end believed
    /// finished is reopened if the authority says otherwise.
    pub fn realign(&mut self, word_index: usize, definition_index: usize, finished: bool) -> Option<Card> {
        self.in_flight = None;
        if finished || word_index >= self.deck.len() {
            self.round.end_round();
            return self.deal();
        }

        self.round.is_over = false;
        self.round.word_index = word_index;
        self.round.definition_index = definition_index;
        if self.round.current_definition(&self.deck).is_none() {
            self.round.definition_index = 0;
        }
        self.deal()
    }

    /// Take pending round events (consumes them).
    pub fn take_events(&mut self) -> Vec<RoundEvent> {
        self.round.take_events()
    }

    fn deal(&mut self) -> Option<Card> {
        if self.round.is_over {
            self.current = None;
            return None;
        }

        let id = CardId(self.next_id);
        self.next_id += 1;
        self.current = Some(id);
        self.card_at_cursor(id)
    }

    fn card_at_cursor(&self, id: CardId) -> Option<Card> {
        let word = self.deck.word(self.round.word_index)?;
        let definition = self.round.current_definition(&self.deck)?;
        Some(Card {
            id,
            word: word.text.clone(),
            definition: definition.text.clone(),
            word_index: self.round.word_index,
            definition_index: self.round.definition_index,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
