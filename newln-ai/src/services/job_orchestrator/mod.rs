//! Job orchestrator
//!
//! Drives generation for one material: the phrase and word sub-jobs run as
//! concurrent tasks, their outcomes are aggregated into a single final status,
//! and every transition is published through the [`ProgressBroadcaster`].
//!
//! **Status sequence per material:**
//! `pending → processing → {completed | failed}`
//!
//! **Failure semantics:**
//! - A failed sub-job never cancels or blocks its sibling
//! - Each failure is published as an `error` event
//! - Any failure makes the material `failed`; lists that succeeded stay stored
//! - Nothing propagates out of [`JobOrchestrator::run`]
//!
//! **Deadline:** once it elapses the orchestrator stops waiting. Tasks already
//! running are detached, not aborted, and may still persist their list.

mod sub_job;

pub use sub_job::SubJobError;

use crate::db::MaterialStore;
use crate::services::generation_client::GenerationClient;
use crate::services::progress_broadcaster::ProgressBroadcaster;
use crate::services::prompts::PromptSet;
use futures::stream::{FuturesUnordered, StreamExt};
use newln_common::config::OrchestratorSettings;
use newln_common::{ArtifactKind, JobStatus, ProgressEvent};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Collaborators shared by every task of every job
pub(crate) struct PipelineContext {
    pub(crate) client: Arc<GenerationClient>,
    pub(crate) store: Arc<dyn MaterialStore>,
    pub(crate) broadcaster: ProgressBroadcaster,
    pub(crate) prompts: Arc<PromptSet>,
    pub(crate) batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum candidates per enrichment call
    pub enrichment_batch_size: usize,
    /// How long `run` waits for both sub-jobs
    pub deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

impl From<&OrchestratorSettings> for OrchestratorConfig {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            enrichment_batch_size: settings.enrichment_batch_size,
            deadline: Duration::from_secs(settings.deadline_secs),
        }
    }
}

/// Result of one orchestration
#[derive(Debug)]
pub struct JobOutcome {
    pub material_key: String,
    pub status: JobStatus,
    /// Items stored per successful sub-job
    pub stored: Vec<(ArtifactKind, usize)>,
    pub errors: Vec<SubJobError>,
}

/// Tracks which sub-jobs have concluded
///
/// A final status exists only once every sub-job has reported.
#[derive(Debug)]
struct CompletionTracker {
    outstanding: HashSet<ArtifactKind>,
    failed: bool,
}

impl CompletionTracker {
    fn new() -> Self {
        Self {
            outstanding: ArtifactKind::ALL.into_iter().collect(),
            failed: false,
        }
    }

    fn record(&mut self, kind: ArtifactKind, succeeded: bool) {
        if !self.outstanding.remove(&kind) {
            warn!(kind = %kind, "Duplicate sub-job report ignored");
            return;
        }
        self.failed |= !succeeded;
    }

    fn final_status(&self) -> Option<JobStatus> {
        if !self.outstanding.is_empty() {
            return None;
        }
        Some(if self.failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        })
    }
}

/// Coordinates phrase and word generation for materials
pub struct JobOrchestrator {
    ctx: Arc<PipelineContext>,
    deadline: Duration,
}

impl JobOrchestrator {
    pub fn new(
        client: Arc<GenerationClient>,
        store: Arc<dyn MaterialStore>,
        broadcaster: ProgressBroadcaster,
        prompts: Arc<PromptSet>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(PipelineContext {
                client,
                store,
                broadcaster,
                prompts,
                batch_size: config.enrichment_batch_size.max(1),
            }),
            deadline: config.deadline,
        }
    }

    /// Templates shared with the rest of the service
    pub fn prompts(&self) -> &Arc<PromptSet> {
        &self.ctx.prompts
    }

    /// Run as a detached background task
    pub fn spawn(self: &Arc<Self>, material_key: String, content: String) -> JoinHandle<JobOutcome> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run(&material_key, &content).await })
    }

    /// Generate both lists for a material and report the final status
    pub async fn run(&self, material_key: &str, content: &str) -> JobOutcome {
        let start_time = Instant::now();
        info!(material_key, "Generation started");

        let mut status = self
            .advance(material_key, JobStatus::Pending, JobStatus::Processing)
            .await;

        let key: Arc<str> = Arc::from(material_key);
        let content: Arc<str> = Arc::from(content);
        let deadline = tokio::time::Instant::now() + self.deadline;

        let mut pending: FuturesUnordered<_> = ArtifactKind::ALL
            .into_iter()
            .map(|kind| {
                let handle = tokio::spawn(sub_job::run_sub_job(
                    self.ctx.clone(),
                    kind,
                    key.clone(),
                    content.clone(),
                ));
                async move { (kind, tokio::time::timeout_at(deadline, handle).await) }
            })
            .collect();

        let mut tracker = CompletionTracker::new();
        let mut stored = Vec::new();
        let mut errors = Vec::new();

        let final_status = loop {
            let Some((kind, joined)) = pending.next().await else {
                error!(material_key, "Sub-jobs ended without a final status");
                break tracker.final_status().unwrap_or(JobStatus::Failed);
            };

            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => Err(SubJobError::TaskAborted {
                    kind,
                    message: join_err.to_string(),
                }),
                // Dropping the handle detaches the task; it keeps running
                Err(_elapsed) => Err(SubJobError::DeadlineExceeded {
                    kind,
                    seconds: self.deadline.as_secs(),
                }),
            };

            match outcome {
                Ok(count) => {
                    stored.push((kind, count));
                    tracker.record(kind, true);
                }
                Err(e) => {
                    error!(material_key, kind = %kind, error = %e, "Sub-job failed");
                    self.ctx
                        .broadcaster
                        .publish_event(material_key, &ProgressEvent::error(Some(kind), e.to_string()));
                    errors.push(e);
                    tracker.record(kind, false);
                }
            }

            if let Some(final_status) = tracker.final_status() {
                break final_status;
            }
        };

        status = self.advance(material_key, status, final_status).await;

        info!(
            material_key,
            status = %status,
            errors = errors.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Generation finished"
        );

        JobOutcome {
            material_key: material_key.to_string(),
            status,
            stored,
            errors,
        }
    }

    /// Apply a status transition: persist, then publish
    ///
    /// Illegal transitions are logged and leave the status unchanged. A failed
    /// status write is logged; the event is still published.
    async fn advance(&self, material_key: &str, current: JobStatus, next: JobStatus) -> JobStatus {
        let next = match current.transition_to(next) {
            Ok(next) => next,
            Err(e) => {
                error!(material_key, error = %e, "Rejected status transition");
                return current;
            }
        };

        if let Err(e) = self.ctx.store.update_material_status(material_key, next).await {
            error!(material_key, status = %next, error = %e, "Failed to persist material status");
        }
        self.ctx
            .broadcaster
            .publish_event(material_key, &ProgressEvent::status(next));
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_defers_until_both_concluded() {
        let mut tracker = CompletionTracker::new();
        assert_eq!(tracker.final_status(), None);

        tracker.record(ArtifactKind::Word, true);
        assert_eq!(tracker.final_status(), None);

        tracker.record(ArtifactKind::Phrase, true);
        assert_eq!(tracker.final_status(), Some(JobStatus::Completed));
    }

    #[test]
    fn test_tracker_any_failure_fails() {
        let mut tracker = CompletionTracker::new();
        tracker.record(ArtifactKind::Phrase, false);
        assert_eq!(tracker.final_status(), None);

        tracker.record(ArtifactKind::Word, true);
        assert_eq!(tracker.final_status(), Some(JobStatus::Failed));
    }

    #[test]
    fn test_tracker_ignores_duplicate_reports() {
        let mut tracker = CompletionTracker::new();
        tracker.record(ArtifactKind::Word, true);
        tracker.record(ArtifactKind::Word, false);
        tracker.record(ArtifactKind::Phrase, true);
        assert_eq!(tracker.final_status(), Some(JobStatus::Completed));
    }

    #[test]
    fn test_config_from_settings() {
        let config = OrchestratorConfig::from(&OrchestratorSettings {
            enrichment_batch_size: 30,
            deadline_secs: 12,
        });
        assert_eq!(config.enrichment_batch_size, 30);
        assert_eq!(config.deadline, Duration::from_secs(12));
    }
}
