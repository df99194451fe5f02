//! Core primitives.
//!
//! Seeded randomness shared by the single-player deck and the session server,
//! and the input checks both ends apply to names and room codes.

pub mod rng;
pub mod validate;

// Re-export core types
pub use rng::{DeterministicRng, derive_deck_seed, is_room_code};
pub use validate::{ValidationError, validate_player_name, validate_room_code};
