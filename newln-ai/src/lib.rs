//! newln-ai library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::db::MaterialStore;
use crate::services::{GenerationClient, JobOrchestrator, ProgressBroadcaster};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MaterialStore>,
    pub client: Arc<GenerationClient>,
    pub broadcaster: ProgressBroadcaster,
    pub orchestrator: Arc<JobOrchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MaterialStore>,
        client: Arc<GenerationClient>,
        broadcaster: ProgressBroadcaster,
        orchestrator: Arc<JobOrchestrator>,
    ) -> Self {
        Self {
            store,
            client,
            broadcaster,
            orchestrator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::material_routes())
        .merge(api::chat_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
