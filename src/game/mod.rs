//! Game Logic Module
//!
//! Everything needed to play a round, independent of transport.
//!
//! ## Module Structure
//!
//! - `words`: Word data, loading, and the active deck
//! - `round`: Round state machine (pointers, score, streak, termination)
//! - `swipe`: Mode-tagged swipe resolution
//! - `scoring`: Points policy
//! - `play`: Card-addressed game loop with the in-flight guard
//! - `events`: Round events for rendering and collaborators
//! - `learnt`: Learnt-word store
//! - `dictionary`: Dictionary lookup schema

pub mod words;
pub mod round;
pub mod swipe;
pub mod scoring;
pub mod play;
pub mod events;
pub mod learnt;
pub mod dictionary;

// Re-export key types
pub use words::{Word, Definition, WordDeck, DeckCycle, WordLoadError};
pub use round::{RoundState, ExhaustionPolicy};
pub use swipe::{GameMode, Direction, SwipeOutcome, SwipeError, resolve_swipe};
pub use scoring::points_for;
pub use play::{GameLoop, Card, CardId, PendingSwipe, SwipeResult, PlayError};
pub use events::{RoundEvent, RoundSummary};
pub use learnt::{LearntWord, LearntWords};
pub use dictionary::{DictionaryEntry, DictionaryLookup};
