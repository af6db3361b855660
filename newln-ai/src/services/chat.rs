//! Tutor chat about a material
//!
//! Stateless: the client sends the prior turns with every message, and the
//! reply is one free-text generation call sharing the client's concurrency
//! cap and retry policy.

use crate::services::generation_client::{GenerationClient, GenerationError};
use crate::services::prompts::{PromptSet, PromptTemplate};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Who said a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Learner,
    Tutor,
}

impl Speaker {
    fn label(&self) -> &'static str {
        match self {
            Speaker::Learner => "Learner",
            Speaker::Tutor => "Tutor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub message: String,
}

/// Material, transcript and new message as substituted into the chat template
pub fn conversation_text(content: &str, history: &[ChatTurn], message: &str) -> String {
    let mut text = String::with_capacity(content.len() + message.len() + 64);
    let _ = writeln!(text, "Material:\n{}\n", content.trim());
    text.push_str("Conversation:\n");
    for turn in history {
        let _ = writeln!(text, "{}: {}", turn.speaker.label(), turn.message.trim());
    }
    let _ = write!(text, "{}: {}", Speaker::Learner.label(), message.trim());
    text
}

/// Ask the tutor for a reply to `message`
pub async fn tutor_reply(
    client: &GenerationClient,
    prompts: &PromptSet,
    content: &str,
    history: &[ChatTurn],
    message: &str,
) -> Result<String, GenerationError> {
    let prompt = prompts.render(
        PromptTemplate::Chat,
        &conversation_text(content, history, message),
    );
    let reply = client.generate_text(&prompt).await?;
    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_lists_turns_in_order() {
        let history = vec![
            ChatTurn {
                speaker: Speaker::Learner,
                message: "What does orbit mean?".to_string(),
            },
            ChatTurn {
                speaker: Speaker::Tutor,
                message: " A curved path. ".to_string(),
            },
        ];

        let text = conversation_text("The satellite keeps its orbit.", &history, "Example?");

        assert!(text.starts_with("Material:\nThe satellite keeps its orbit.\n"));
        assert!(text.ends_with(
            "Learner: What does orbit mean?\nTutor: A curved path.\nLearner: Example?"
        ));
    }

    #[test]
    fn test_speaker_wire_names() {
        let turn: ChatTurn =
            serde_json::from_str(r#"{"speaker": "tutor", "message": "hi"}"#).unwrap();
        assert_eq!(turn.speaker, Speaker::Tutor);
    }
}
