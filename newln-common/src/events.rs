//! Job status, artifact kinds and the progress event wire format
//!
//! Progress events travel as JSON strings from the broadcaster to streaming
//! clients. Two shapes exist on the wire:
//!
//! ```text
//! {"status": "processing"}
//! {"event": "words_stored", "data": [...]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a material or one of its generation sub-jobs
///
/// Transitions are monotonic: `Pending → Processing → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet picked up
    Pending,
    /// Generation in progress
    Processing,
    /// All artifacts generated and stored
    Completed,
    /// At least one artifact failed
    Failed,
}

/// Rejected status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and Failed are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is the single legal step forward from `self`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Validate and return the next status
    pub fn transition_to(self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown job status: {}",
                other
            ))),
        }
    }
}

/// The two artifact kinds generated for every material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Phrase,
    Word,
}

impl ArtifactKind {
    /// Both kinds, in the order sub-jobs are launched
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Phrase, ArtifactKind::Word];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Phrase => "phrase",
            ArtifactKind::Word => "word",
        }
    }

    /// Event name published once this kind's list is stored
    pub fn stored_event(&self) -> &'static str {
        match self {
            ArtifactKind::Phrase => "phrases_stored",
            ArtifactKind::Word => "words_stored",
        }
    }

    /// Title given to the list created for this kind
    pub fn default_list_title(&self) -> &'static str {
        match self {
            ArtifactKind::Phrase => "Default Phrase List",
            ArtifactKind::Word => "Default Word List",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phrase" => Ok(ArtifactKind::Phrase),
            "word" => Ok(ArtifactKind::Word),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown artifact kind: {}",
                other
            ))),
        }
    }
}

/// Progress event streamed to observers of one material
///
/// The material key is the broadcaster topic and is not repeated on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    /// Material-level status change
    Status { status: JobStatus },
    /// Named event with an optional payload
    Named {
        event: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
    },
}

impl ProgressEvent {
    pub fn status(status: JobStatus) -> Self {
        ProgressEvent::Status { status }
    }

    /// Sub-job stored its list; `data` is the stored payload
    pub fn stored(kind: ArtifactKind, data: Value) -> Self {
        ProgressEvent::Named {
            event: kind.stored_event().to_string(),
            data,
        }
    }

    /// Captured failure, with a human-readable message
    pub fn error(kind: Option<ArtifactKind>, message: impl Into<String>) -> Self {
        let mut data = serde_json::Map::new();
        if let Some(kind) = kind {
            data.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
        }
        data.insert("message".to_string(), Value::String(message.into()));
        ProgressEvent::Named {
            event: "error".to_string(),
            data: Value::Object(data),
        }
    }

    /// Event name: the status string for status events
    pub fn name(&self) -> &str {
        match self {
            ProgressEvent::Status { status } => status.as_str(),
            ProgressEvent::Named { event, .. } => event,
        }
    }

    /// Encode as the transport string
    pub fn to_message(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to encode progress event {}: {}", self.name(), e);
                format!(r#"{{"event":"{}"}}"#, self.name())
            }
        }
    }

    /// Decode a transport string
    pub fn from_message(message: &str) -> crate::Result<Self> {
        serde_json::from_str(message)
            .map_err(|e| crate::Error::InvalidInput(format!("Malformed progress event: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use JobStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        // No skipping processing, no regression, nothing out of terminal states
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Processing));

        assert_eq!(
            Completed.transition_to(Failed),
            Err(InvalidTransition { from: Completed, to: Failed })
        );
    }

    #[test]
    fn test_status_event_wire_format() {
        let event = ProgressEvent::status(JobStatus::Processing);
        assert_eq!(event.to_message(), r#"{"status":"processing"}"#);
        assert_eq!(event.name(), "processing");
    }

    #[test]
    fn test_named_event_wire_format() {
        let event = ProgressEvent::stored(ArtifactKind::Word, json!([{"text": "orbit"}]));
        let value: Value = serde_json::from_str(&event.to_message()).unwrap();
        assert_eq!(value["event"], "words_stored");
        assert_eq!(value["data"][0]["text"], "orbit");
    }

    #[test]
    fn test_error_event_carries_message_and_kind() {
        let event = ProgressEvent::error(Some(ArtifactKind::Phrase), "no phrases generated");
        let value: Value = serde_json::from_str(&event.to_message()).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["kind"], "phrase");
        assert_eq!(value["data"]["message"], "no phrases generated");
    }

    #[test]
    fn test_from_message_parses_both_shapes() {
        assert_eq!(
            ProgressEvent::from_message(r#"{"status":"failed"}"#).unwrap(),
            ProgressEvent::status(JobStatus::Failed)
        );
        let named = ProgressEvent::from_message(r#"{"event":"phrases_stored","data":[]}"#).unwrap();
        assert_eq!(named.name(), "phrases_stored");
        assert!(ProgressEvent::from_message("not json").is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }
}
