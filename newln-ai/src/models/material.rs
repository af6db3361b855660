//! Material and stored artifact records

use crate::models::enriched::Importance;
use chrono::{DateTime, Utc};
use newln_common::{ArtifactKind, JobStatus};
use serde::{Deserialize, Serialize};

/// Submission payload for a new material
#[derive(Debug, Clone, Deserialize)]
pub struct NewMaterial {
    pub title: String,
    pub content: String,
}

/// Partial edit of a material; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterialUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// User-submitted text document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub material_key: String,
    pub title: String,
    pub content: String,
    pub word_count: i64,
    pub status: JobStatus,
    pub has_pending_word_list: bool,
    pub has_pending_phrase_list: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One generated list (phrase or word) of a material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactList {
    pub id: i64,
    pub material_key: String,
    pub kind: ArtifactKind,
    pub title: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Persisted enriched item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredItem {
    pub id: i64,
    pub list_id: i64,
    pub text: String,
    pub meaning: String,
    pub translated_meaning: String,
    pub example: Option<String>,
    pub pos: Option<String>,
    pub difficulty: Option<String>,
    pub importance: Importance,
}

/// List with its items
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactListDetail {
    #[serde(flatten)]
    pub list: ArtifactList,
    pub items: Vec<StoredItem>,
}

/// Material with every list generated for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDetail {
    #[serde(flatten)]
    pub material: Material,
    pub lists: Vec<ArtifactListDetail>,
}

/// Whitespace-separated word count
pub fn count_words(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   "), 0);
        assert_eq!(count_words("one two\nthree\tfour "), 4);
    }
}
