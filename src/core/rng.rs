//! Seeded Random Number Generator
//!
//! Xorshift128+ generator used for deck shuffles and room codes.
//! Given the same seed it produces the same sequence on every platform,
//! which keeps shuffles reproducible in tests and replays.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Alphabet used for room codes.
pub const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use parlance::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(7);
/// let mut b = DeterministicRng::new(7);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seed the generator. The two state words are spread out with
    /// SplitMix64 so small or sequential seeds are fine.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift is stuck at zero
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Seed from the wall clock.
    ///
    /// Used for interactive play where reproducibility does not matter.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self::new(derive_seed(b"PARLANCE_ENTROPY_V1", &nanos.to_le_bytes()))
    }

    /// Next raw output.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Low half of the next output.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Uniform-ish value below `max`; zero when `max` is zero.
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Modulo bias is negligible for deck-sized bounds
        (self.next_u64() % max as u64) as u32
    }

    /// In-place Fisher-Yates.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let len = slice.len();
        for i in (1..len).rev() {
            let j = self.next_int((i + 1) as u32) as usize;
            slice.swap(i, j);
        }
    }

    /// Return a shuffled copy, leaving the input untouched.
    pub fn shuffled<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut out = items.to_vec();
        self.shuffle(&mut out);
        out
    }

    /// Pick up to `count` distinct elements in random order.
    pub fn sample<T: Clone>(&mut self, items: &[T], count: usize) -> Vec<T> {
        let mut out = self.shuffled(items);
        out.truncate(count);
        out
    }

    /// Generate a 6-character `[A-Z0-9]` room code.
    pub fn room_code(&mut self) -> String {
        (0..ROOM_CODE_LEN)
            .map(|_| {
                let idx = self.next_int(ROOM_CODE_ALPHABET.len() as u32) as usize;
                ROOM_CODE_ALPHABET[idx] as char
            })
            .collect()
    }

    /// Raw state words.
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Resume from words returned by [`state`](Self::state).
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 step.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Hash a domain tag and payload down to a 64-bit seed.
pub fn derive_seed(domain: &[u8], payload: &[u8]) -> u64 {
    let digest = Sha256::new()
        .chain_update(domain)
        .chain_update(payload)
        .finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Derive the deck seed for a room.
///
/// Mixes the room code with a server nonce so two rooms that happen to
/// reuse a code (after the first was discarded) still deal different decks.
pub fn derive_deck_seed(room_code: &str, nonce: u64) -> u64 {
    let mut payload = room_code.as_bytes().to_vec();
    payload.extend_from_slice(&nonce.to_le_bytes());
    derive_seed(b"PARLANCE_DECK_V1", &payload)
}

/// Check that a string is a well-formed room code.
pub fn is_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b))
}

// =============================================================================
// TESTS
// =============================================================================
