//! Dictionary Lookup
//!
//! Typed schema for the free-dictionary API response shown after a word is
//! completed. Transport lives with the front end; this module only owns the
//! shape of the data and the collaborator interface.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

/// Public endpoint the front end queries.
pub const LOOKUP_ENDPOINT: &str = "https://api.dictionaryapi.dev/api/v2/entries/en";

/// One dictionary entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Headword.
    pub word: String,
    /// Primary phonetic spelling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
    /// Alternative pronunciations.
    #[serde(default)]
    pub phonetics: Vec<Phonetic>,
    /// Senses grouped by part of speech.
    #[serde(default)]
    pub meanings: Vec<Meaning>,
}

/// A pronunciation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phonetic {
    /// IPA spelling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Audio clip URL; may be empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

/// Senses for one part of speech.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meaning {
    /// e.g. "adjective".
    pub part_of_speech: String,
    /// Senses in dictionary order.
    #[serde(default)]
    pub definitions: Vec<Sense>,
}

/// A single definition with optional usage example.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sense {
    /// Definition text.
    pub definition: String,
    /// Usage example.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Synonyms, possibly empty.
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl DictionaryEntry {
    /// First pronunciation that has an audio clip.
    pub fn audio_url(&self) -> Option<&str> {
        self.phonetics
            .iter()
            .filter_map(|p| p.audio.as_deref())
            .find(|a| !a.is_empty())
    }
}

/// Lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// Response body did not match the schema.
    #[error("Malformed dictionary response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Lookup could not be performed.
    #[error("Dictionary unavailable: {0}")]
    Unavailable(String),
}

/// Request URL for a word. The word becomes a single percent-encoded path
/// segment.
pub fn lookup_url(word: &str) -> String {
    format!("{}/{}", LOOKUP_ENDPOINT, encode_segment(&word.trim().to_lowercase()))
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// Parse a lookup response body. The API answers with an array; only the
/// first entry is used.
pub fn parse_lookup_response(body: &str) -> Result<Option<DictionaryEntry>, DictionaryError> {
    let entries: Vec<DictionaryEntry> = serde_json::from_str(body)?;
    Ok(entries.into_iter().next())
}

/// Source of dictionary entries.
pub trait DictionaryLookup {
    /// Look up a word. `Ok(None)` when the word is unknown.
    fn lookup(&self, word: &str) -> Result<Option<DictionaryEntry>, DictionaryError>;
}

/// In-memory dictionary keyed by lower-cased word.
#[derive(Clone, Debug, Default)]
pub struct StaticDictionary {
    entries: BTreeMap<String, DictionaryEntry>,
}

impl StaticDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, entry: DictionaryEntry) {
        self.entries.insert(entry.word.to_lowercase(), entry);
    }
}

impl DictionaryLookup for StaticDictionary {
    fn lookup(&self, word: &str) -> Result<Option<DictionaryEntry>, DictionaryError> {
        Ok(self.entries.get(&word.trim().to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"[
        {
            "word": "ephemeral",
            "phonetic": "/ɪˈfɛm(ə)ɹəl/",
            "phonetics": [
                {"text": "/ɪˈfɛm(ə)ɹəl/", "audio": ""},
                {"audio": "https://example.org/ephemeral-us.mp3"}
            ],
            "meanings": [
                {
                    "partOfSpeech": "adjective",
                    "definitions": [
                        {"definition": "Lasting for a short period of time.", "synonyms": ["fleeting"], "example": "ephemeral fame"}
                    ]
                },
                {
                    "partOfSpeech": "noun",
                    "definitions": [{"definition": "Something which lasts for a short time."}]
                }
            ]
        },
        {"word": "ephemeral", "meanings": []}
    ]"#;

    #[test]
    fn test_parse_takes_first_entry() {
        let entry = parse_lookup_response(RESPONSE).unwrap().unwrap();

        assert_eq!(entry.word, "ephemeral");
        assert_eq!(entry.meanings.len(), 2);
        assert_eq!(entry.meanings[0].part_of_speech, "adjective");
        assert_eq!(entry.meanings[0].definitions[0].synonyms, vec!["fleeting"]);
        assert_eq!(entry.meanings[1].definitions[0].example, None);
        assert_eq!(entry.audio_url(), Some("https://example.org/ephemeral-us.mp3"));
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert_eq!(parse_lookup_response("[]").unwrap(), None);
        // Unknown words come back as an object, not an array
        let not_found = r#"{"title": "No Definitions Found"}"#;
        assert!(matches!(parse_lookup_response(not_found), Err(DictionaryError::Parse(_))));
    }

    #[test]
    fn test_lookup_url_lowercases() {
        assert_eq!(lookup_url(" Serendipity "), format!("{}/serendipity", LOOKUP_ENDPOINT));
    }

    #[test]
    fn test_lookup_url_encodes_the_word() {
        assert_eq!(lookup_url("ad hoc"), format!("{}/ad%20hoc", LOOKUP_ENDPOINT));
        assert_eq!(lookup_url("rock'n/roll"), format!("{}/rock%27n%2Froll", LOOKUP_ENDPOINT));
        assert_eq!(lookup_url("café"), format!("{}/caf%C3%A9", LOOKUP_ENDPOINT));
    }

    #[test]
    fn test_static_dictionary_is_case_insensitive() {
        let mut dict = StaticDictionary::new();
        dict.insert(DictionaryEntry { word: "Lucid".into(), ..Default::default() });

        assert!(dict.lookup("LUCID").unwrap().is_some());
        assert!(dict.lookup("opaque").unwrap().is_none());
    }
}
