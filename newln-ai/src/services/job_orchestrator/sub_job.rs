//! One artifact kind's pipeline
//!
//! primary generation → chunk → concurrent enrichment → persist → publish

use super::PipelineContext;
use crate::models::{
    CandidateItem, EnrichedItem, PhraseCandidate, PhraseMeaning, WordCandidate, WordMeaning,
};
use crate::services::chunker::chunk_unique;
use crate::services::generation_client::GenerationError;
use crate::services::prompts::PromptTemplate;
use newln_common::{ArtifactKind, JobStatus, ProgressEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a sub-job failed
///
/// The `Display` text is what observers see in the `error` event.
#[derive(Debug, Error)]
pub enum SubJobError {
    #[error("{kind} generation failed: {source}")]
    Generation {
        kind: ArtifactKind,
        source: GenerationError,
    },

    #[error("{kind} list could not be saved: {source}")]
    Persistence {
        kind: ArtifactKind,
        source: newln_common::Error,
    },

    #[error("no {kind} items were generated")]
    ZeroResults { kind: ArtifactKind },

    #[error("{kind} generation did not finish within {seconds}s")]
    DeadlineExceeded { kind: ArtifactKind, seconds: u64 },

    #[error("{kind} task ended abnormally: {message}")]
    TaskAborted { kind: ArtifactKind, message: String },
}

impl SubJobError {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            SubJobError::Generation { kind, .. }
            | SubJobError::Persistence { kind, .. }
            | SubJobError::ZeroResults { kind }
            | SubJobError::DeadlineExceeded { kind, .. }
            | SubJobError::TaskAborted { kind, .. } => *kind,
        }
    }
}

fn generation(kind: ArtifactKind) -> impl FnOnce(GenerationError) -> SubJobError {
    move |source| SubJobError::Generation { kind, source }
}

fn persistence(kind: ArtifactKind) -> impl FnOnce(newln_common::Error) -> SubJobError {
    move |source| SubJobError::Persistence { kind, source }
}

/// Run the sub-job for `kind`; returns the number of stored items
///
/// On failure the list (if created) is marked failed, best effort.
pub(crate) async fn run_sub_job(
    ctx: Arc<PipelineContext>,
    kind: ArtifactKind,
    material_key: Arc<str>,
    content: Arc<str>,
) -> Result<usize, SubJobError> {
    let list_id = ctx
        .store
        .create_artifact_list(&material_key, kind)
        .await
        .map_err(persistence(kind))?;

    let result = generate_and_store(&ctx, kind, &material_key, &content, list_id).await;

    if let Err(e) = &result {
        warn!(material_key = %material_key, kind = %kind, error = %e, "Sub-job failed");
        if let Err(store_err) = ctx.store.update_list_status(list_id, JobStatus::Failed).await {
            warn!(
                material_key = %material_key,
                list_id,
                error = %store_err,
                "Failed to mark list as failed"
            );
        }
    }

    result
}

async fn generate_and_store(
    ctx: &Arc<PipelineContext>,
    kind: ArtifactKind,
    material_key: &str,
    content: &Arc<str>,
    list_id: i64,
) -> Result<usize, SubJobError> {
    ctx.store
        .update_list_status(list_id, JobStatus::Processing)
        .await
        .map_err(persistence(kind))?;

    let candidates = generate_candidates(ctx, kind, content)
        .await
        .map_err(generation(kind))?;
    if candidates.is_empty() {
        return Err(SubJobError::ZeroResults { kind });
    }

    let batches = chunk_unique(candidates, ctx.batch_size);
    info!(
        material_key,
        kind = %kind,
        batches = batches.len(),
        "Enriching candidates"
    );

    // Enrichment starts only after primary generation succeeded
    let handles: Vec<JoinHandle<Result<Vec<EnrichedItem>, SubJobError>>> = batches
        .into_iter()
        .map(|batch| tokio::spawn(enrich_batch(ctx.clone(), kind, batch, content.clone())))
        .collect();

    let mut enriched = Vec::new();
    let mut first_error = None;
    for handle in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(SubJobError::TaskAborted {
                kind,
                message: join_err.to_string(),
            }),
        };
        match outcome {
            Ok(items) => enriched.extend(items),
            Err(e) => {
                warn!(material_key, kind = %kind, error = %e, "Enrichment batch failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if enriched.is_empty() {
        return Err(SubJobError::ZeroResults { kind });
    }

    ctx.store
        .bulk_insert_items(list_id, &enriched)
        .await
        .map_err(persistence(kind))?;
    ctx.store
        .update_list_status(list_id, JobStatus::Completed)
        .await
        .map_err(persistence(kind))?;

    let cleared = match kind {
        ArtifactKind::Phrase => ctx.store.update_pending_phrase_list(material_key, false).await,
        ArtifactKind::Word => ctx.store.update_pending_word_list(material_key, false).await,
    };
    cleared.map_err(persistence(kind))?;

    let count = enriched.len();
    let data = serde_json::to_value(&enriched).unwrap_or_default();
    ctx.broadcaster
        .publish_event(material_key, &ProgressEvent::stored(kind, data));

    info!(material_key, kind = %kind, items = count, "List stored");
    Ok(count)
}

async fn generate_candidates(
    ctx: &PipelineContext,
    kind: ArtifactKind,
    content: &str,
) -> Result<Vec<CandidateItem>, GenerationError> {
    let prompt = ctx.prompts.render(PromptTemplate::candidates(kind), content);

    let candidates: Vec<CandidateItem> = match kind {
        ArtifactKind::Word => ctx
            .client
            .generate_as::<Vec<WordCandidate>>(&prompt)
            .await?
            .into_iter()
            .map(CandidateItem::from)
            .collect(),
        ArtifactKind::Phrase => ctx
            .client
            .generate_as::<Vec<PhraseCandidate>>(&prompt)
            .await?
            .into_iter()
            .map(CandidateItem::from)
            .collect(),
    };

    Ok(candidates
        .into_iter()
        .filter(|c| !c.text.is_empty())
        .collect())
}

/// Meaning returned for one batch entry
struct Meaning {
    /// 1-based position in the batch, as sent in the prompt
    id: i64,
    text: String,
    meaning: String,
    translated: String,
    example: Option<String>,
}

async fn enrich_batch(
    ctx: Arc<PipelineContext>,
    kind: ArtifactKind,
    batch: Vec<CandidateItem>,
    content: Arc<str>,
) -> Result<Vec<EnrichedItem>, SubJobError> {
    let prompt = ctx
        .prompts
        .render(PromptTemplate::meanings(kind), &batch_payload(kind, &batch).to_string());

    let meanings: Vec<Meaning> = match kind {
        ArtifactKind::Word => ctx
            .client
            .generate_as::<Vec<WordMeaning>>(&prompt)
            .await
            .map_err(generation(kind))?
            .into_iter()
            .map(|m| Meaning {
                id: m.id,
                text: m.word,
                meaning: m.meaning,
                translated: m.jp_meaning,
                example: None,
            })
            .collect(),
        ArtifactKind::Phrase => ctx
            .client
            .generate_as::<Vec<PhraseMeaning>>(&prompt)
            .await
            .map_err(generation(kind))?
            .into_iter()
            .map(|m| Meaning {
                id: m.id,
                text: m.phrase,
                meaning: m.meaning,
                translated: m.jp_meaning,
                example: Some(m.example),
            })
            .collect(),
    };

    Ok(match_meanings(kind, batch, meanings, &content))
}

/// JSON list of the batch, as inserted into the meaning prompt
fn batch_payload(kind: ArtifactKind, batch: &[CandidateItem]) -> Value {
    let items: Vec<Value> = batch
        .iter()
        .enumerate()
        .map(|(i, item)| match kind {
            ArtifactKind::Word => json!({
                "id": i + 1,
                "word": item.text,
                "pos": item.pos.as_deref().unwrap_or_default(),
            }),
            ArtifactKind::Phrase => json!({
                "id": i + 1,
                "phrase": item.text,
            }),
        })
        .collect();
    Value::Array(items)
}

/// Pair each candidate with the meaning returned for it
///
/// A meaning is placed by its `id` first, then by exact text, then by
/// case-insensitive text, always into a candidate that has no meaning yet.
/// Candidates left without a meaning are dropped; unplaced meanings are
/// ignored.
fn match_meanings(
    kind: ArtifactKind,
    batch: Vec<CandidateItem>,
    meanings: Vec<Meaning>,
    content: &str,
) -> Vec<EnrichedItem> {
    let mut slots: Vec<Option<Meaning>> = batch.iter().map(|_| None).collect();

    let mut by_text = Vec::new();
    for meaning in meanings {
        let position = usize::try_from(meaning.id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .filter(|&i| i < slots.len() && slots[i].is_none());
        match position {
            Some(i) => slots[i] = Some(meaning),
            None => by_text.push(meaning),
        }
    }

    let mut ignored = 0;
    for meaning in by_text {
        let text = meaning.text.trim();
        let lowered = text.to_lowercase();
        let position = (0..batch.len())
            .find(|&i| slots[i].is_none() && batch[i].text == text)
            .or_else(|| {
                (0..batch.len())
                    .find(|&i| slots[i].is_none() && batch[i].text.to_lowercase() == lowered)
            });
        match position {
            Some(i) => slots[i] = Some(meaning),
            None => ignored += 1,
        }
    }
    if ignored > 0 {
        debug!(kind = %kind, extra = ignored, "Ignoring meanings for unknown items");
    }

    let mut enriched = Vec::with_capacity(batch.len());
    for (candidate, slot) in batch.into_iter().zip(slots) {
        match slot {
            Some(m) => enriched.push(EnrichedItem::from_parts(
                candidate,
                m.meaning,
                m.translated,
                m.example,
                content,
            )),
            None => warn!(kind = %kind, text = %candidate.text, "No meaning returned, item dropped"),
        }
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Importance;

    fn meaning(id: i64, text: &str) -> Meaning {
        Meaning {
            id,
            text: text.to_string(),
            meaning: format!("def {}", text),
            translated: format!("訳 {}", text),
            example: None,
        }
    }

    #[test]
    fn test_match_by_id_ignores_echoed_case() {
        let batch = vec![CandidateItem::new("orbit"), CandidateItem::new("take off")];
        let meanings = vec![meaning(2, "Take off"), meaning(1, "Orbit")];

        let enriched = match_meanings(ArtifactKind::Phrase, batch, meanings, "orbit");
        let texts: Vec<&str> = enriched.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["orbit", "take off"]);
        assert_eq!(enriched[0].meaning, "def Orbit");
        assert_eq!(enriched[1].meaning, "def Take off");
    }

    #[test]
    fn test_match_falls_back_to_text_and_drops_missing() {
        let batch = vec![
            CandidateItem::new("orbit"),
            CandidateItem::new("comet"),
            CandidateItem::new("moon"),
        ];
        // Ids out of range: placed by text; "sun" matches nothing
        let meanings = vec![meaning(9, "moon"), meaning(0, " orbit "), meaning(12, "sun")];

        let enriched = match_meanings(ArtifactKind::Word, batch, meanings, "orbit orbit moon");
        let texts: Vec<&str> = enriched.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["orbit", "moon"]);
        assert_eq!(enriched[0].meaning, "def  orbit ");
        assert_eq!(enriched[0].importance, Importance::Medium);
        assert_eq!(enriched[1].importance, Importance::Low);
    }

    #[test]
    fn test_match_case_insensitive_after_duplicate_id() {
        let batch = vec![CandidateItem::new("orbit"), CandidateItem::new("take off")];
        // Both claim id 1; the second is placed by case-insensitive text
        let meanings = vec![meaning(1, "orbit"), meaning(1, "TAKE OFF")];

        let enriched = match_meanings(ArtifactKind::Phrase, batch, meanings, "");
        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[1].text, "take off");
        assert_eq!(enriched[1].meaning, "def TAKE OFF");
    }

    #[test]
    fn test_batch_payload_numbers_items() {
        let mut word = CandidateItem::new("orbit");
        word.pos = Some("noun".to_string());
        let payload = batch_payload(ArtifactKind::Word, &[word, CandidateItem::new("drift")]);
        assert_eq!(payload[0]["id"], 1);
        assert_eq!(payload[0]["pos"], "noun");
        assert_eq!(payload[1]["word"], "drift");
        assert_eq!(payload[1]["pos"], "");

        let payload = batch_payload(ArtifactKind::Phrase, &[CandidateItem::new("take off")]);
        assert_eq!(payload[0]["phrase"], "take off");
    }

    #[test]
    fn test_error_messages_name_kind() {
        let err = SubJobError::ZeroResults { kind: ArtifactKind::Word };
        assert_eq!(err.to_string(), "no word items were generated");
        assert_eq!(err.kind(), ArtifactKind::Word);

        let err = SubJobError::Generation {
            kind: ArtifactKind::Phrase,
            source: GenerationError::EmptyResponse,
        };
        assert_eq!(err.to_string(), "phrase generation failed: No content generated");
    }
}
