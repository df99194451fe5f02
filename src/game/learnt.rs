//! Learnt Words
//!
//! Personal record of completed words, most recent first, optionally
//! carrying the dictionary entry fetched when the word was completed.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::game::dictionary::DictionaryEntry;

/// A remembered word.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearntWord {
    /// The word as first recorded.
    pub word: String,
    /// When it was added or last refreshed.
    pub date_added: DateTime<Utc>,
    /// Dictionary entry, when one was fetched.
    #[serde(default)]
    pub dictionary_data: Option<DictionaryEntry>,
}

/// Store failure.
#[derive(Debug, thiserror::Error)]
pub enum LearntStoreError {
    /// Filesystem failure.
    #[error("Failed to access {path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure.
    #[error("Failed to encode learnt words: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Upsert-only collection keyed by case-insensitive word.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearntWords {
    words: Vec<LearntWord>,
}

impl LearntWords {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed word.
    ///
    /// New words go to the front. A word already present is only touched
    /// when `dictionary` is supplied, in which case its data and date are
    /// refreshed in place.
    pub fn add(&mut self, word: &str, dictionary: Option<DictionaryEntry>, now: DateTime<Utc>) {
        let key = word.to_lowercase();
        if let Some(existing) = self.words.iter_mut().find(|w| w.word.to_lowercase() == key) {
            if dictionary.is_some() {
                existing.dictionary_data = dictionary;
                existing.date_added = now;
            }
            return;
        }

        self.words.insert(0, LearntWord {
            word: word.to_string(),
            date_added: now,
            dictionary_data: dictionary,
        });
    }

    /// Find a word, ignoring case.
    pub fn get(&self, word: &str) -> Option<&LearntWord> {
        let key = word.to_lowercase();
        self.words.iter().find(|w| w.word.to_lowercase() == key)
    }

    /// Words, most recent first.
    pub fn list(&self) -> &[LearntWord] {
        &self.words
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if nothing has been learnt.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Load from a JSON file. Missing or unreadable data yields an empty store.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No learnt words at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Discarding unreadable learnt words at {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Write to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), LearntStoreError> {
        let io_err = |source| LearntStoreError::Io { path: path.display().to_string(), source };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(io_err)?;
        Ok(())
    }
}
