//! Score store: submissions, ranking and aggregate stats.
//!
//! Kept in memory and, when a path is configured, mirrored to a JSON file
//! after every submission.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::validate::{validate_player_name, ValidationError};

/// Rows returned by [`Leaderboard::top`].
pub const MAX_LEADERBOARD_ROWS: usize = 50;

/// A stored score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Trimmed player name.
    pub player_name: String,
    /// Final score.
    pub score: u32,
    /// Words completed in the round.
    pub words_learned: u32,
    /// When the score was submitted.
    pub game_date: DateTime<Utc>,
}

/// Body of a score submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    /// Player name, untrimmed.
    #[serde(default)]
    pub player_name: String,
    /// Final score.
    #[serde(default)]
    pub score: u32,
    /// Words completed in the round.
    #[serde(default)]
    pub words_learned: u32,
}

/// A ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// 1-based position.
    pub rank: usize,
    /// Player name.
    pub player_name: String,
    /// Score.
    pub score: u32,
    /// Words completed.
    pub words_learned: u32,
    /// Relative submission time.
    pub time_ago: String,
}

/// Aggregate figures over every stored score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of stored scores.
    pub total_games: usize,
    /// Best score.
    pub highest_score: u32,
    /// Mean score, truncated.
    pub average_score: u32,
    /// Sum of words completed.
    pub total_words_learned: u64,
}

/// Leaderboard failures.
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    /// Submission rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Store file could not be read or written.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Store file is not valid JSON.
    #[error("Failed to decode scores: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The score store.
#[derive(Debug, Default)]
pub struct Leaderboard {
    entries: Vec<ScoreEntry>,
    path: Option<PathBuf>,
}

impl Leaderboard {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store backed by a JSON file. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LeaderboardError> {
        let path = path.into();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|source| LeaderboardError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };

        info!("Loaded {} scores from {}", entries.len(), path.display());
        Ok(Self { entries, path: Some(path) })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of stored scores.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been submitted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store a score and return its rank: one more than the number of
    /// stored scores strictly greater. Nothing is kept if persisting fails.
    pub fn submit(&mut self, submission: ScoreSubmission, now: DateTime<Utc>) -> Result<usize, LeaderboardError> {
        let player_name = validate_player_name(&submission.player_name)?;

        self.entries.push(ScoreEntry {
            player_name,
            score: submission.score,
            words_learned: submission.words_learned,
            game_date: now,
        });
        if let Err(e) = self.save() {
            self.entries.pop();
            return Err(e);
        }

        let rank = self.rank_of(submission.score);
        debug!(score = submission.score, rank, "Score submitted");
        Ok(rank)
    }

    /// Rank a score would take.
    pub fn rank_of(&self, score: u32) -> usize {
        1 + self.entries.iter().filter(|e| e.score > score).count()
    }

    /// Best `limit` scores, highest first, newest first among equals.
    pub fn top(&self, limit: usize, now: DateTime<Utc>) -> Vec<LeaderboardRow> {
        let mut sorted: Vec<&ScoreEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score).then(b.game_date.cmp(&a.game_date)));

        sorted
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, e)| LeaderboardRow {
                rank: i + 1,
                player_name: e.player_name.clone(),
                score: e.score,
                words_learned: e.words_learned,
                time_ago: format_time_ago(e.game_date, now),
            })
            .collect()
    }

    /// Aggregate figures. Zeros when empty.
    pub fn stats(&self) -> Stats {
        if self.entries.is_empty() {
            return Stats::default();
        }

        let total: u64 = self.entries.iter().map(|e| u64::from(e.score)).sum();
        Stats {
            total_games: self.entries.len(),
            highest_score: self.entries.iter().map(|e| e.score).max().unwrap_or(0),
            average_score: (total / self.entries.len() as u64) as u32,
            total_words_learned: self.entries.iter().map(|e| u64::from(e.words_learned)).sum(),
        }
    }

    fn save(&self) -> Result<(), LeaderboardError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| LeaderboardError::Io { path: path.display().to_string(), source };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, text).map_err(io_err)?;
        Ok(())
    }
}

/// Relative age of a timestamp: "2 days ago", "1 hour ago", "5 minutes ago"
/// or "Just now".
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(then);

    let (count, unit) = if diff.num_days() > 0 {
        (diff.num_days(), "day")
    } else if diff.num_hours() > 0 {
        (diff.num_hours(), "hour")
    } else if diff.num_minutes() > 0 {
        (diff.num_minutes(), "minute")
    } else {
        return "Just now".to_string();
    };

    let plural = if count > 1 { "s" } else { "" };
    format!("{} {}{} ago", count, unit, plural)
}
