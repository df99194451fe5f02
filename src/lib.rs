//! # Parlance
//!
//! Vocabulary swipe game: pick the right definition for a word by swiping
//! cards, alone or head-to-head against another player.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         PARLANCE                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Shared primitives                        │
//! │  ├── rng.rs       - Seeded Xorshift128+, shuffles, room codes│
//! │  └── validate.rs  - Player name and room code checks         │
//! │                                                              │
//! │  game/            - Round logic (transport independent)      │
//! │  ├── words.rs     - Word data and the active deck            │
//! │  ├── round.rs     - Round state machine                      │
//! │  ├── swipe.rs     - Mode-tagged swipe resolution             │
//! │  ├── scoring.rs   - Points policy                            │
//! │  ├── play.rs      - Card-addressed game loop                 │
//! │  ├── events.rs    - Round events                             │
//! │  ├── learnt.rs    - Learnt-word store                        │
//! │  └── dictionary.rs- Dictionary lookup schema                 │
//! │                                                              │
//! │  network/         - Head-to-head over WebSocket              │
//! │  ├── protocol.rs  - Message types                            │
//! │  ├── session.rs   - Authoritative rooms                      │
//! │  ├── server.rs    - WebSocket server                         │
//! │  └── client.rs    - Client projection and reconnecting driver│
//! │                                                              │
//! │  leaderboard/     - Scores over HTTP                         │
//! │  ├── board.rs     - Score store, rank, stats                 │
//! │  └── api.rs       - axum routes                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Score Authority
//!
//! In a head-to-head game each client scores its swipes optimistically, and
//! the server replays every swipe on its own copy of the dealt words. The
//! server's totals are final; clients overwrite their score on every
//! confirmation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod leaderboard;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::words::{Word, Definition, WordDeck};
pub use game::round::RoundState;
pub use game::swipe::{GameMode, Direction, resolve_swipe};
pub use game::play::{GameLoop, Card, CardId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Words dealt to each player in a head-to-head game.
pub const WORDS_PER_GAME: usize = 5;
