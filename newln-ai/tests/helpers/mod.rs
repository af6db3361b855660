//! Shared test utilities
//!
//! - [`FakeBackend`]: scripted generation backend with an in-flight counter
//! - [`Script`]: canned provider responses for the prompt templates
//! - [`InstrumentedStore`]: SQLite store recording status writes, with
//!   injectable persistence failures

#![allow(dead_code)]

use async_trait::async_trait;
use newln_ai::db::{init_memory_pool, MaterialStore, SqliteMaterialStore};
use newln_ai::models::{
    ArtifactList, EnrichedItem, Material, MaterialUpdate, NewMaterial, StoredItem,
};
use newln_ai::services::{
    GenerationBackend, GenerationClient, GenerationClientConfig, GenerationError, JobOrchestrator,
    OrchestratorConfig, OutputShape, ProgressBroadcaster, PromptSet, PromptTemplate,
};
use newln_ai::utils::RetryPolicy;
use newln_common::{ArtifactKind, JobStatus};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

/// Generation backend answering through a closure
pub struct FakeBackend {
    responder: Responder,
    delay: Duration,
    calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(
        responder: impl Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Backend serving `script` for the templates from [`test_prompts`]
    pub fn scripted(script: Script) -> Self {
        Self::new(move |prompt| script.respond(prompt))
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls whose prompt starts with `header`
    pub fn prompts_with_header(&self, header: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.lines().next() == Some(header))
            .count()
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn complete(
        &self,
        prompt: &str,
        _shape: Option<&OutputShape>,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.responder)(prompt);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Templates whose first line names the template, for routing in [`Script`]
pub fn test_prompts() -> PromptSet {
    PromptSet::default()
        .with_template(PromptTemplate::Words, "WORDS\n{{TEXT}}")
        .with_template(PromptTemplate::WordMeanings, "WORD_MEANINGS\n{{TEXT}}")
        .with_template(PromptTemplate::Phrases, "PHRASES\n{{TEXT}}")
        .with_template(PromptTemplate::PhraseMeanings, "PHRASE_MEANINGS\n{{TEXT}}")
        .with_template(PromptTemplate::Chat, "CHAT\n{{TEXT}}")
}

/// Canned provider behaviour
#[derive(Clone, Default)]
pub struct Script {
    pub words: Vec<String>,
    pub phrases: Vec<String>,
    /// Error returned for the word-candidate call
    pub word_error: Option<GenerationError>,
    /// Error returned for the phrase-candidate call
    pub phrase_error: Option<GenerationError>,
    /// Meanings are omitted for these texts
    pub missing_meanings: Vec<String>,
    /// Any meaning batch containing this text fails with the error
    pub meaning_error: Option<(String, GenerationError)>,
    /// Error returned for chat calls
    pub chat_error: Option<GenerationError>,
}

impl Script {
    pub fn new(words: &[&str], phrases: &[&str]) -> Self {
        Self {
            words: words.iter().map(|s| s.to_string()).collect(),
            phrases: phrases.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn respond(&self, prompt: &str) -> Result<String, GenerationError> {
        let (header, body) = prompt.split_once('\n').unwrap_or((prompt, ""));
        if header == "CHAT" {
            if let Some(err) = &self.chat_error {
                return Err(err.clone());
            }
            let last = body.lines().last().unwrap_or_default();
            return Ok(format!("Tutor answer to [{}]", last));
        }
        let payload = match header {
            "WORDS" => {
                if let Some(err) = &self.word_error {
                    return Err(err.clone());
                }
                self.words
                    .iter()
                    .enumerate()
                    .map(|(i, w)| json!({ "id": i + 1, "word": w, "pos": "noun" }))
                    .collect::<Vec<_>>()
            }
            "PHRASES" => {
                if let Some(err) = &self.phrase_error {
                    return Err(err.clone());
                }
                self.phrases
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        json!({
                            "id": i + 1,
                            "collocation": p,
                            "from_text": format!("... {} ...", p),
                            "example": format!("Example with {}.", p),
                            "difficulty": "B1",
                        })
                    })
                    .collect()
            }
            "WORD_MEANINGS" => self
                .batch(body, "word")?
                .into_iter()
                .map(|(id, word)| {
                    json!({
                        "id": id,
                        "word": word,
                        "pos": "noun",
                        "meaning": format!("meaning of {}", word),
                        "jp-meaning": format!("意味 {}", word),
                    })
                })
                .collect(),
            "PHRASE_MEANINGS" => self
                .batch(body, "phrase")?
                .into_iter()
                .map(|(id, phrase)| {
                    json!({
                        "id": id,
                        "phrase": phrase,
                        "meaning": format!("meaning of {}", phrase),
                        "jp-meaning": format!("意味 {}", phrase),
                        "example": format!("They said {}.", phrase),
                    })
                })
                .collect(),
            other => {
                return Err(GenerationError::Status {
                    status: 400,
                    message: format!("unexpected prompt {}", other),
                })
            }
        };
        Ok(Value::Array(payload).to_string())
    }

    fn batch(&self, body: &str, field: &str) -> Result<Vec<(i64, String)>, GenerationError> {
        let items: Vec<Value> = serde_json::from_str(body).unwrap();
        if let Some((text, err)) = &self.meaning_error {
            if items.iter().any(|item| item[field] == text.as_str()) {
                return Err(err.clone());
            }
        }
        Ok(items
            .iter()
            .map(|item| {
                (
                    item["id"].as_i64().unwrap(),
                    item[field].as_str().unwrap().to_string(),
                )
            })
            .filter(|(_, text)| !self.missing_meanings.contains(text))
            .collect())
    }
}

/// Retry policy without real waiting
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        factor: 2,
        max_jitter: Duration::ZERO,
    }
}

pub fn client_config(max_concurrent_calls: usize, max_attempts: u32) -> GenerationClientConfig {
    GenerationClientConfig {
        max_concurrent_calls,
        retry_policy: fast_retry(max_attempts),
        requests_per_minute: None,
    }
}

/// SQLite store that records status writes and can fail bulk inserts
pub struct InstrumentedStore {
    inner: SqliteMaterialStore,
    fail_bulk_insert: AtomicBool,
    status_history: Mutex<Vec<JobStatus>>,
}

impl InstrumentedStore {
    pub async fn new() -> Self {
        Self {
            inner: SqliteMaterialStore::new(init_memory_pool().await.unwrap()),
            fail_bulk_insert: AtomicBool::new(false),
            status_history: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_bulk_insert(&self) {
        self.fail_bulk_insert.store(true, Ordering::SeqCst);
    }

    /// Material statuses written, in order
    pub fn status_history(&self) -> Vec<JobStatus> {
        self.status_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl MaterialStore for InstrumentedStore {
    async fn create_material(&self, new: &NewMaterial) -> newln_common::Result<Material> {
        self.inner.create_material(new).await
    }

    async fn get_material(&self, material_key: &str) -> newln_common::Result<Option<Material>> {
        self.inner.get_material(material_key).await
    }

    async fn get_material_status(
        &self,
        material_key: &str,
    ) -> newln_common::Result<Option<JobStatus>> {
        self.inner.get_material_status(material_key).await
    }

    async fn list_materials(&self, search: Option<&str>) -> newln_common::Result<Vec<Material>> {
        self.inner.list_materials(search).await
    }

    async fn update_material(
        &self,
        material_key: &str,
        update: &MaterialUpdate,
    ) -> newln_common::Result<Material> {
        self.inner.update_material(material_key, update).await
    }

    async fn delete_material(&self, material_key: &str) -> newln_common::Result<()> {
        self.inner.delete_material(material_key).await
    }

    async fn create_artifact_list(
        &self,
        material_key: &str,
        kind: ArtifactKind,
    ) -> newln_common::Result<i64> {
        self.inner.create_artifact_list(material_key, kind).await
    }

    async fn bulk_insert_items(
        &self,
        list_id: i64,
        items: &[EnrichedItem],
    ) -> newln_common::Result<()> {
        if self.fail_bulk_insert.load(Ordering::SeqCst) {
            return Err(newln_common::Error::Internal("disk full".to_string()));
        }
        self.inner.bulk_insert_items(list_id, items).await
    }

    async fn update_list_status(&self, list_id: i64, status: JobStatus) -> newln_common::Result<()> {
        self.inner.update_list_status(list_id, status).await
    }

    async fn update_pending_word_list(
        &self,
        material_key: &str,
        pending: bool,
    ) -> newln_common::Result<()> {
        self.inner.update_pending_word_list(material_key, pending).await
    }

    async fn update_pending_phrase_list(
        &self,
        material_key: &str,
        pending: bool,
    ) -> newln_common::Result<()> {
        self.inner.update_pending_phrase_list(material_key, pending).await
    }

    async fn update_material_status(
        &self,
        material_key: &str,
        status: JobStatus,
    ) -> newln_common::Result<()> {
        self.status_history.lock().unwrap().push(status);
        self.inner.update_material_status(material_key, status).await
    }

    async fn artifact_lists(&self, material_key: &str) -> newln_common::Result<Vec<ArtifactList>> {
        self.inner.artifact_lists(material_key).await
    }

    async fn list_items(&self, list_id: i64) -> newln_common::Result<Vec<StoredItem>> {
        self.inner.list_items(list_id).await
    }
}

/// Everything one orchestrator test needs
pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub client: Arc<GenerationClient>,
    pub store: Arc<InstrumentedStore>,
    pub broadcaster: ProgressBroadcaster,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl Harness {
    pub async fn new(backend: FakeBackend, config: OrchestratorConfig) -> Self {
        let backend = Arc::new(backend);
        let client = Arc::new(GenerationClient::new(backend.clone(), client_config(3, 3)));
        let store = Arc::new(InstrumentedStore::new().await);
        let broadcaster = ProgressBroadcaster::new(64);
        let orchestrator = Arc::new(JobOrchestrator::new(
            client.clone(),
            store.clone(),
            broadcaster.clone(),
            Arc::new(test_prompts()),
            config,
        ));

        Self {
            backend,
            client,
            store,
            broadcaster,
            orchestrator,
        }
    }

    /// Insert a material and return it
    pub async fn material(&self, content: &str) -> Material {
        self.store
            .create_material(&NewMaterial {
                title: "Test material".to_string(),
                content: content.to_string(),
            })
            .await
            .unwrap()
    }
}

/// Orchestrator config with a generous deadline
pub fn orchestrator_config(batch_size: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        enrichment_batch_size: batch_size,
        deadline: Duration::from_secs(10),
    }
}

/// Drain every message currently queued on a subscription
pub fn drain(subscription: &mut newln_ai::services::Subscription) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(message) = subscription.try_recv() {
        messages.push(message);
    }
    messages
}

/// Event names of drained messages
pub fn event_names(messages: &[String]) -> Vec<String> {
    messages
        .iter()
        .map(|m| {
            newln_common::ProgressEvent::from_message(m)
                .unwrap()
                .name()
                .to_string()
        })
        .collect()
}
