//! Candidate items produced by the primary generation call
//!
//! The provider returns kind-specific records ([`WordCandidate`],
//! [`PhraseCandidate`]); both are normalised into [`CandidateItem`] before
//! deduplication and enrichment.

use crate::services::output_shape::{OutputShape, Shaped};
use serde::{Deserialize, Serialize};

/// Word record as returned by the word-candidate prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordCandidate {
    pub id: i64,
    pub word: String,
    /// Part of speech
    pub pos: String,
}

impl Shaped for WordCandidate {
    fn output_shape() -> OutputShape {
        OutputShape::object([
            ("id", OutputShape::Integer),
            ("word", OutputShape::String),
            ("pos", OutputShape::String),
        ])
    }
}

/// Phrase record as returned by the phrase-candidate prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseCandidate {
    pub id: i64,
    pub collocation: String,
    /// Sentence of the material the phrase was taken from
    pub from_text: String,
    pub example: String,
    pub difficulty: String,
}

impl Shaped for PhraseCandidate {
    fn output_shape() -> OutputShape {
        OutputShape::object([
            ("id", OutputShape::Integer),
            ("collocation", OutputShape::String),
            ("from_text", OutputShape::String),
            ("example", OutputShape::String),
            ("difficulty", OutputShape::String),
        ])
    }
}

/// Kind-independent candidate
///
/// `text` is the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateItem {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl CandidateItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos: None,
            difficulty: None,
            example: None,
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<WordCandidate> for CandidateItem {
    fn from(candidate: WordCandidate) -> Self {
        Self {
            text: candidate.word.trim().to_string(),
            pos: non_blank(candidate.pos),
            difficulty: None,
            example: None,
        }
    }
}

impl From<PhraseCandidate> for CandidateItem {
    fn from(candidate: PhraseCandidate) -> Self {
        Self {
            text: candidate.collocation.trim().to_string(),
            pos: None,
            difficulty: non_blank(candidate.difficulty),
            example: non_blank(candidate.example),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_candidate_normalises() {
        let item: CandidateItem = WordCandidate {
            id: 1,
            word: " orbit ".to_string(),
            pos: "noun".to_string(),
        }
        .into();
        assert_eq!(item.text, "orbit");
        assert_eq!(item.pos.as_deref(), Some("noun"));
        assert_eq!(item.difficulty, None);
    }

    #[test]
    fn test_phrase_candidate_drops_blank_metadata() {
        let item: CandidateItem = PhraseCandidate {
            id: 3,
            collocation: "take off".to_string(),
            from_text: "The plane will take off soon.".to_string(),
            example: "  ".to_string(),
            difficulty: "B1".to_string(),
        }
        .into();
        assert_eq!(item.text, "take off");
        assert_eq!(item.difficulty.as_deref(), Some("B1"));
        assert_eq!(item.example, None);
    }

    #[test]
    fn test_candidate_list_shape_matches_wire_record() {
        let payload = serde_json::json!([{ "id": 1, "word": "orbit", "pos": "noun" }]);
        assert!(Vec::<WordCandidate>::output_shape().validate(&payload).is_ok());

        let missing_pos = serde_json::json!([{ "id": 1, "word": "orbit" }]);
        assert!(Vec::<WordCandidate>::output_shape().validate(&missing_pos).is_err());
    }
}
