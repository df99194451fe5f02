//! Scoring policy.

/// Points for any correct decision before bonuses.
pub const BASE_POINTS: u32 = 10;

/// Largest speed bonus, awarded to instant answers.
pub const MAX_SPEED_BONUS: u32 = 20;

/// Milliseconds per lost bonus point.
pub const SPEED_BONUS_STEP_MS: u64 = 100;

/// Points for a correct decision.
///
/// `streak` is the streak including this decision. `elapsed_ms` is only
/// supplied in head-to-head play and adds a bonus that decays from 20 to 0
/// over the first two seconds. Fractional bonus is truncated.
pub fn points_for(streak: u32, elapsed_ms: Option<u64>) -> u32 {
    BASE_POINTS + streak + elapsed_ms.map_or(0, speed_bonus)
}

/// `max(0, 20 - elapsed/100)`, truncated to an integer.
pub fn speed_bonus(elapsed_ms: u64) -> u32 {
    let lost = elapsed_ms.div_ceil(SPEED_BONUS_STEP_MS);
    (MAX_SPEED_BONUS as u64).saturating_sub(lost) as u32
}
