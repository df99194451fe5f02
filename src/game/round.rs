//! Round State Machine
//!
//! Pointers, score and streak bookkeeping for one playthrough. Every
//! operation takes the active [`WordDeck`] explicitly; the round never owns
//! or reaches for a global word list.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::game::events::{RoundEvent, RoundSummary};
use crate::game::scoring::points_for;
use crate::game::words::{Definition, WordDeck};

/// What happens when a word runs out of definitions without a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Move on to the next word.
    AdvanceWord,
    /// The round is lost.
    EndRound,
}

/// State of the active round.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoundState {
    /// Position of the current word in the deck.
    pub word_index: usize,
    /// Position of the current definition within the word.
    pub definition_index: usize,
    /// Accumulated score.
    pub score: u32,
    /// Correct decisions this round.
    pub correct_count: u32,
    /// Incorrect decisions this round.
    pub incorrect_count: u32,
    /// Consecutive correct decisions.
    pub streak: u32,
    /// Longest streak this round.
    pub max_streak: u32,
    /// Words completed this round.
    pub words_learned: u32,
    /// Deck positions used in the current reshuffle cycle. Survives resets.
    pub used_word_indices: BTreeSet<usize>,
    /// Round has ended.
    pub is_over: bool,

    /// Events generated since the last drain
    #[serde(skip)]
    pending_events: Vec<RoundEvent>,
}

impl RoundState {
    /// Create a fresh round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over: zero the round, keep the used-word set, reshuffle the deck.
    pub fn reset_round(&mut self, deck: &mut WordDeck) {
        self.word_index = 0;
        self.definition_index = 0;
        self.score = 0;
        self.correct_count = 0;
        self.incorrect_count = 0;
        self.streak = 0;
        self.max_streak = 0;
        self.words_learned = 0;
        self.is_over = deck.is_empty();
        self.pending_events.clear();

        deck.shuffle_words();
    }

    /// Definition currently presented, if the round is active.
    pub fn current_definition<'a>(&self, deck: &'a WordDeck) -> Option<&'a Definition> {
        if self.is_over {
            return None;
        }
        deck.definition(self.word_index, self.definition_index)
    }

    /// Move to the next candidate of the current word.
    pub fn advance_definition(&mut self, deck: &mut WordDeck, policy: ExhaustionPolicy) {
        if self.is_over {
            return;
        }

        self.definition_index += 1;
        let available = deck.word(self.word_index).map_or(0, |w| w.definitions.len());

        if self.definition_index >= available {
            // Ran out of candidates without a match
            match policy {
                ExhaustionPolicy::AdvanceWord => self.advance_word(deck),
                ExhaustionPolicy::EndRound => self.end_round(),
            }
        }
    }

    /// Finish the current word and move to the next.
    pub fn advance_word(&mut self, deck: &mut WordDeck) {
        if self.is_over {
            return;
        }

        let finished = deck.word(self.word_index).map(|w| w.text.clone());

        self.used_word_indices.insert(self.word_index);
        self.words_learned += 1;
        self.word_index += 1;
        self.definition_index = 0;

        if let Some(word) = finished {
            self.pending_events.push(RoundEvent::WordCompleted { word });
        }

        if self.word_index >= deck.len() {
            if deck.reshuffles() && self.used_word_indices.len() >= deck.len() {
                self.used_word_indices.clear();
                deck.shuffle_words();
                self.word_index = 0;
            } else {
                self.end_round();
                return;
            }
        }

        deck.shuffle_definitions(self.word_index);
    }

    /// End the round. Idempotent.
    pub fn end_round(&mut self) {
        if self.is_over {
            return;
        }
        self.is_over = true;
        self.max_streak = self.max_streak.max(self.streak);
        self.pending_events.push(RoundEvent::GameOver(self.summary()));
    }

    /// Credit a correct decision. Returns the points awarded.
    pub fn register_correct(&mut self, elapsed_ms: Option<u64>) -> u32 {
        self.correct_count += 1;
        self.streak += 1;
        self.max_streak = self.max_streak.max(self.streak);

        let points = points_for(self.streak, elapsed_ms);
        self.score += points;

        self.pending_events.push(RoundEvent::correct(points, self.score, self.streak));
        points
    }

    /// Record an incorrect decision.
    pub fn register_incorrect(&mut self) {
        self.incorrect_count += 1;
        self.streak = 0;
        self.pending_events.push(RoundEvent::incorrect(self.score));
    }

    /// Overwrite the score with an authoritative value.
    pub fn reconcile_score(&mut self, authoritative: u32) {
        self.score = authoritative;
    }

    /// Current figures.
    pub fn summary(&self) -> RoundSummary {
        RoundSummary {
            score: self.score,
            correct: self.correct_count,
            incorrect: self.incorrect_count,
            max_streak: self.max_streak,
            words_learned: self.words_learned,
        }
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// =============================================================================
// TESTS
// =============================================================================
