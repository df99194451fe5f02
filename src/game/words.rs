//! Word Data
//!
//! Words, their candidate definitions, and the deck a round plays through.

use std::path::Path;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::core::rng::DeterministicRng;

/// One candidate definition shown on a card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Card text.
    pub text: String,
    /// Whether this is a true definition of the word.
    #[serde(rename = "correct")]
    pub is_correct: bool,
}

impl Definition {
    /// Create a definition.
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self { text: text.into(), is_correct }
    }
}

/// A target word with its ordered candidate definitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    /// The word itself.
    #[serde(rename = "word")]
    pub text: String,
    /// Candidate definitions, in presentation order.
    pub definitions: Vec<Definition>,
}

impl Word {
    /// Create a word.
    pub fn new(text: impl Into<String>, definitions: Vec<Definition>) -> Self {
        Self { text: text.into(), definitions }
    }

    /// Number of true definitions.
    pub fn correct_count(&self) -> usize {
        self.definitions.iter().filter(|d| d.is_correct).count()
    }
}

/// Failure to load the word list.
#[derive(Debug, thiserror::Error)]
pub enum WordLoadError {
    /// File could not be read.
    #[error("Failed to read word data: {0}")]
    Io(#[from] std::io::Error),

    /// File is not a valid word list.
    #[error("Malformed word data: {0}")]
    Parse(#[from] serde_json::Error),

    /// No playable words after filtering.
    #[error("Word data contains no playable words")]
    Empty,
}

/// Parse a JSON word list, dropping words without definitions.
pub fn parse_words(json: &str) -> Result<Vec<Word>, WordLoadError> {
    let raw: Vec<Word> = serde_json::from_str(json)?;
    let words: Vec<Word> = raw
        .into_iter()
        .filter(|w| {
            if w.definitions.is_empty() {
                warn!("Skipping word {:?} with no definitions", w.text);
                return false;
            }
            if w.correct_count() == 0 {
                warn!("Word {:?} has no correct definition", w.text);
            }
            true
        })
        .collect();

    if words.is_empty() {
        return Err(WordLoadError::Empty);
    }
    Ok(words)
}

/// Load a word list from disk.
pub fn load_words(path: impl AsRef<Path>) -> Result<Vec<Word>, WordLoadError> {
    let json = std::fs::read_to_string(path)?;
    parse_words(&json)
}

/// Load a word list, substituting the built-in set on any failure.
pub fn load_words_or_fallback(path: impl AsRef<Path>) -> Vec<Word> {
    let path = path.as_ref();
    match load_words(path) {
        Ok(words) => {
            info!("Loaded {} words from {}", words.len(), path.display());
            words
        }
        Err(e) => {
            warn!("{} ({}); using built-in word set", e, path.display());
            fallback_words()
        }
    }
}

/// Built-in words so the game stays playable offline.
pub fn fallback_words() -> Vec<Word> {
    vec![
        Word::new("Serendipity", vec![
            Definition::new("The occurrence of events by chance in a happy way", true),
            Definition::new("A type of tropical fruit with sweet flesh", false),
            Definition::new("The study of ancient civilizations", false),
            Definition::new("A pleasant surprise or unexpected discovery", true),
            Definition::new("The fear of being in crowded places", false),
        ]),
        Word::new("Ephemeral", vec![
            Definition::new("Lasting for a very short time", true),
            Definition::new("Related to ancient Greek philosophy", false),
            Definition::new("Extremely large in size", false),
            Definition::new("Having a fleeting or transitory nature", true),
            Definition::new("The practice of herbal medicine", false),
        ]),
    ]
}

// =============================================================================
// WORD DECK
// =============================================================================

/// How a deck behaves when the round runs past its last word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeckCycle {
    /// Reshuffle words (and each next word's definitions) and keep going.
    Reshuffle,
    /// Order was fixed elsewhere (server deal); running out ends the run.
    Fixed,
}

/// The active word sequence a round indexes into.
#[derive(Clone, Debug)]
pub struct WordDeck {
    words: Vec<Word>,
    cycle: DeckCycle,
    rng: DeterministicRng,
}

impl WordDeck {
    /// Deck that reshuffles between cycles.
    pub fn reshuffling(words: Vec<Word>, rng: DeterministicRng) -> Self {
        Self { words, cycle: DeckCycle::Reshuffle, rng }
    }

    /// Deck whose order never changes locally.
    pub fn fixed(words: Vec<Word>) -> Self {
        Self { words, cycle: DeckCycle::Fixed, rng: DeterministicRng::default() }
    }

    /// Whether this deck may be reordered.
    pub fn reshuffles(&self) -> bool {
        self.cycle == DeckCycle::Reshuffle
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if the deck has no words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at a position.
    pub fn word(&self, index: usize) -> Option<&Word> {
        self.words.get(index)
    }

    /// Definition at a position.
    pub fn definition(&self, word_index: usize, definition_index: usize) -> Option<&Definition> {
        self.words.get(word_index)?.definitions.get(definition_index)
    }

    /// All words in current order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Reshuffle the word order. No-op for fixed decks.
    pub fn shuffle_words(&mut self) {
        if self.reshuffles() {
            self.rng.shuffle(&mut self.words);
        }
    }

    /// Reshuffle one word's definitions. No-op for fixed decks.
    pub fn shuffle_definitions(&mut self, index: usize) {
        if !self.reshuffles() {
            return;
        }
        if let Some(word) = self.words.get_mut(index) {
            self.rng.shuffle(&mut word.definitions);
        }
    }
}
