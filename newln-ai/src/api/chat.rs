//! Tutor chat endpoint

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::services::{tutor_reply, ChatTurn};
use crate::AppState;

/// POST /materials/:key/chat request
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Earlier turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// POST /materials/:key/chat
pub async fn chat_about_material(
    State(state): State<AppState>,
    Path(material_key): Path<String>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }

    let material = state
        .store
        .get_material(&material_key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Material {}", material_key)))?;

    let reply = tutor_reply(
        &state.client,
        state.orchestrator.prompts(),
        &material.content,
        &request.history,
        &request.message,
    )
    .await?;

    info!(
        material_key = %material_key,
        turns = request.history.len() + 1,
        "Tutor reply generated"
    );
    Ok(Json(ChatResponse { reply }))
}

/// Build chat routes
pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/materials/:key/chat", post(chat_about_material))
}
