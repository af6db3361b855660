//! Enrichment records and the final enriched item

use crate::models::candidate::CandidateItem;
use crate::services::output_shape::{OutputShape, Shaped};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Word meaning as returned by the word-meaning prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordMeaning {
    pub id: i64,
    pub word: String,
    pub pos: String,
    pub meaning: String,
    #[serde(rename = "jp-meaning")]
    pub jp_meaning: String,
}

impl Shaped for WordMeaning {
    fn output_shape() -> OutputShape {
        OutputShape::object([
            ("id", OutputShape::Integer),
            ("word", OutputShape::String),
            ("pos", OutputShape::String),
            ("meaning", OutputShape::String),
            ("jp-meaning", OutputShape::String),
        ])
    }
}

/// Phrase meaning as returned by the phrase-meaning prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseMeaning {
    pub id: i64,
    pub phrase: String,
    pub meaning: String,
    #[serde(rename = "jp-meaning")]
    pub jp_meaning: String,
    pub example: String,
}

impl Shaped for PhraseMeaning {
    fn output_shape() -> OutputShape {
        OutputShape::object([
            ("id", OutputShape::Integer),
            ("phrase", OutputShape::String),
            ("meaning", OutputShape::String),
            ("jp-meaning", OutputShape::String),
            ("example", OutputShape::String),
        ])
    }
}

/// How prominent an item is in its material
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn from_occurrences(count: usize) -> Self {
        match count {
            0 | 1 => Importance::Low,
            2 => Importance::Medium,
            _ => Importance::High,
        }
    }

    /// Case-insensitive whole-word occurrence count of `text` in `content`
    pub fn for_text(text: &str, content: &str) -> Self {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Importance::Low;
        }
        Self::from_occurrences(count_whole_words(&needle, &content.to_lowercase()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        }
    }
}

/// Matches of `needle` not touching a letter or digit on either side
fn count_whole_words(needle: &str, haystack: &str) -> usize {
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .count()
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Importance {
    type Err = newln_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Importance::Low),
            "medium" => Ok(Importance::Medium),
            "high" => Ok(Importance::High),
            other => Err(newln_common::Error::InvalidInput(format!(
                "Unknown importance: {}",
                other
            ))),
        }
    }
}

/// Candidate combined with its enrichment, ready to persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub text: String,
    pub meaning: String,
    pub translated_meaning: String,
    pub example: Option<String>,
    pub pos: Option<String>,
    pub difficulty: Option<String>,
    pub importance: Importance,
}

impl EnrichedItem {
    /// Combine a candidate with its looked-up meaning
    ///
    /// The enrichment example wins over the candidate's own example.
    pub fn from_parts(
        candidate: CandidateItem,
        meaning: String,
        translated_meaning: String,
        example: Option<String>,
        content: &str,
    ) -> Self {
        let importance = Importance::for_text(&candidate.text, content);
        Self {
            example: example
                .filter(|e| !e.trim().is_empty())
                .or(candidate.example),
            text: candidate.text,
            meaning,
            translated_meaning,
            pos: candidate.pos,
            difficulty: candidate.difficulty,
            importance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_thresholds() {
        assert_eq!(Importance::from_occurrences(0), Importance::Low);
        assert_eq!(Importance::from_occurrences(1), Importance::Low);
        assert_eq!(Importance::from_occurrences(2), Importance::Medium);
        assert_eq!(Importance::from_occurrences(3), Importance::High);
        assert_eq!(Importance::from_occurrences(40), Importance::High);
    }

    #[test]
    fn test_importance_counts_case_insensitively() {
        let content = "Orbit the moon. The orbit was stable. ORBIT again.";
        assert_eq!(Importance::for_text("orbit", content), Importance::High);
        assert_eq!(Importance::for_text("moon", content), Importance::Low);
        assert_eq!(Importance::for_text("  ", content), Importance::Low);
    }

    #[test]
    fn test_importance_ignores_partial_words() {
        assert_eq!(Importance::for_text("art", "start the cart"), Importance::Low);
        assert_eq!(Importance::for_text("art", "Art, art and artists"), Importance::Medium);
        assert_eq!(
            Importance::for_text("take off", "take off; take off. Takeoff!"),
            Importance::Medium
        );
    }

    #[test]
    fn test_meaning_wire_names() {
        let meaning: WordMeaning = serde_json::from_str(
            r#"{"id": 1, "word": "orbit", "pos": "noun", "meaning": "a path", "jp-meaning": "軌道"}"#,
        )
        .unwrap();
        assert_eq!(meaning.jp_meaning, "軌道");
    }

    #[test]
    fn test_enrichment_example_falls_back_to_candidate() {
        let mut candidate = CandidateItem::new("take off");
        candidate.example = Some("We take off at noon.".to_string());

        let item = EnrichedItem::from_parts(
            candidate,
            "leave the ground".to_string(),
            "離陸する".to_string(),
            Some(String::new()),
            "take off, take off",
        );
        assert_eq!(item.example.as_deref(), Some("We take off at noon."));
        assert_eq!(item.importance, Importance::Medium);
    }
}
