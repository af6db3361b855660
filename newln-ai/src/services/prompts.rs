//! Prompt templates
//!
//! Four templates drive list generation and one drives tutor chat; each
//! contains a `{{TEXT}}` placeholder.
//! Built-in defaults can be overridden per template by a file of the same
//! name in the configured prompts directory.

use newln_common::{ArtifactKind, Error, Result};
use std::path::Path;
use tracing::{debug, info};

const TEXT_PLACEHOLDER: &str = "{{TEXT}}";

/// Template slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Candidate words from the material text
    Words,
    /// Meanings for a batch of words
    WordMeanings,
    /// Candidate phrases from the material text
    Phrases,
    /// Meanings for a batch of phrases
    PhraseMeanings,
    /// Tutor reply about a material
    Chat,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 5] = [
        PromptTemplate::Words,
        PromptTemplate::WordMeanings,
        PromptTemplate::Phrases,
        PromptTemplate::PhraseMeanings,
        PromptTemplate::Chat,
    ];

    /// Candidate-generation template for `kind`
    pub fn candidates(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Phrase => PromptTemplate::Phrases,
            ArtifactKind::Word => PromptTemplate::Words,
        }
    }

    /// Enrichment template for `kind`
    pub fn meanings(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Phrase => PromptTemplate::PhraseMeanings,
            ArtifactKind::Word => PromptTemplate::WordMeanings,
        }
    }

    /// Override file name inside the prompts directory
    pub fn file_name(&self) -> &'static str {
        match self {
            PromptTemplate::Words => "generate_words.txt",
            PromptTemplate::WordMeanings => "generate_words_meanings.txt",
            PromptTemplate::Phrases => "generate_phrases.txt",
            PromptTemplate::PhraseMeanings => "generate_phrases_meanings.txt",
            PromptTemplate::Chat => "chat.txt",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            PromptTemplate::Words => {
                "You are building a vocabulary list for an English learner.\n\
                 From the text below, pick the words worth studying. Skip names, \
                 numbers and very common function words.\n\
                 Return a JSON array of objects with fields \"id\" (1-based integer), \
                 \"word\" (dictionary form) and \"pos\" (part of speech).\n\n\
                 Text:\n{{TEXT}}"
            }
            PromptTemplate::WordMeanings => {
                "For each word in the JSON list below, give a short English definition \
                 and a Japanese translation.\n\
                 Return a JSON array of objects with fields \"id\", \"word\", \"pos\", \
                 \"meaning\" and \"jp-meaning\". Keep \"word\" exactly as given.\n\n\
                 Words:\n{{TEXT}}"
            }
            PromptTemplate::Phrases => {
                "You are building a phrase list for an English learner.\n\
                 From the text below, pick collocations and idiomatic phrases worth studying.\n\
                 Return a JSON array of objects with fields \"id\" (1-based integer), \
                 \"collocation\", \"from_text\" (the sentence it appears in), \
                 \"example\" (a new example sentence) and \"difficulty\" (CEFR level).\n\n\
                 Text:\n{{TEXT}}"
            }
            PromptTemplate::PhraseMeanings => {
                "For each phrase in the JSON list below, give a short English definition, \
                 a Japanese translation and one example sentence.\n\
                 Return a JSON array of objects with fields \"id\", \"phrase\", \"meaning\", \
                 \"jp-meaning\" and \"example\". Keep \"phrase\" exactly as given.\n\n\
                 Phrases:\n{{TEXT}}"
            }
            PromptTemplate::Chat => {
                "You are an English tutor. The learner is studying the material below.\n\
                 Reply to the learner's last message in a few plain sentences. \
                 Explain words and phrases with short examples.\n\n\
                 {{TEXT}}"
            }
        }
    }

    fn index(&self) -> usize {
        match self {
            PromptTemplate::Words => 0,
            PromptTemplate::WordMeanings => 1,
            PromptTemplate::Phrases => 2,
            PromptTemplate::PhraseMeanings => 3,
            PromptTemplate::Chat => 4,
        }
    }
}

/// Loaded prompt templates
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    templates: [String; 5],
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            templates: PromptTemplate::ALL.map(|t| t.builtin().to_string()),
        }
    }
}

impl PromptSet {
    /// Built-in templates, overridden by any files present in `dir`
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut prompts = Self::default();
        let Some(dir) = dir else {
            return Ok(prompts);
        };

        for template in PromptTemplate::ALL {
            let path = dir.join(template.file_name());
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    if !text.contains(TEXT_PLACEHOLDER) {
                        return Err(Error::Config(format!(
                            "Prompt template {} has no {} placeholder",
                            path.display(),
                            TEXT_PLACEHOLDER
                        )));
                    }
                    info!("Loaded prompt override: {}", path.display());
                    prompts.templates[template.index()] = text;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("No override for {}, using built-in", template.file_name());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(prompts)
    }

    /// Replace one template
    pub fn with_template(mut self, template: PromptTemplate, text: impl Into<String>) -> Self {
        self.templates[template.index()] = text.into();
        self
    }

    pub fn template(&self, template: PromptTemplate) -> &str {
        &self.templates[template.index()]
    }

    /// Substitute `text` for every `{{TEXT}}` placeholder
    pub fn render(&self, template: PromptTemplate, text: &str) -> String {
        self.template(template).replace(TEXT_PLACEHOLDER, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_templates_have_placeholder() {
        let prompts = PromptSet::default();
        for template in PromptTemplate::ALL {
            assert!(prompts.template(template).contains(TEXT_PLACEHOLDER));
        }
    }

    #[test]
    fn test_render_substitutes_text() {
        let prompts = PromptSet::default();
        let rendered = prompts.render(PromptTemplate::Words, "The orbit decayed.");
        assert!(rendered.contains("The orbit decayed."));
        assert!(!rendered.contains(TEXT_PLACEHOLDER));
    }

    #[test]
    fn test_file_overrides_single_template() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("generate_phrases.txt"), "PHRASES: {{TEXT}}").unwrap();

        let prompts = PromptSet::load(Some(dir.path())).unwrap();
        assert_eq!(prompts.render(PromptTemplate::Phrases, "abc"), "PHRASES: abc");
        assert_eq!(
            prompts.template(PromptTemplate::Words),
            PromptSet::default().template(PromptTemplate::Words)
        );
    }

    #[test]
    fn test_override_without_placeholder_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("generate_words.txt"), "no placeholder").unwrap();
        assert!(matches!(PromptSet::load(Some(dir.path())), Err(Error::Config(_))));
    }

    #[test]
    fn test_kind_template_mapping() {
        assert_eq!(PromptTemplate::candidates(ArtifactKind::Word), PromptTemplate::Words);
        assert_eq!(
            PromptTemplate::meanings(ArtifactKind::Phrase),
            PromptTemplate::PhraseMeanings
        );
    }
}
