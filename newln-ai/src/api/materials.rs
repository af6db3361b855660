//! Material submission and lookup

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use newln_common::JobStatus;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::load_material_detail;
use crate::error::{ApiError, ApiResult};
use crate::models::{Material, MaterialDetail, MaterialUpdate, NewMaterial};
use crate::AppState;

/// POST /materials response
#[derive(Debug, Serialize)]
pub struct CreateMaterialResponse {
    pub material_key: String,
    pub status: JobStatus,
    pub has_pending_word_list: bool,
    pub has_pending_phrase_list: bool,
}

/// GET /materials/:key/status response
#[derive(Debug, Serialize)]
pub struct MaterialStatusResponse {
    pub status: JobStatus,
}

/// GET /materials query
#[derive(Debug, Deserialize)]
pub struct ListMaterialsQuery {
    /// Case-insensitive title filter
    pub search: Option<String>,
}

/// POST /materials
///
/// Stores the material and starts generation in the background.
pub async fn create_material(
    State(state): State<AppState>,
    Json(request): Json<NewMaterial>,
) -> ApiResult<(StatusCode, Json<CreateMaterialResponse>)> {
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let material = state.store.create_material(&request).await?;
    info!(
        material_key = %material.material_key,
        word_count = material.word_count,
        "Material submitted"
    );

    // Detached: progress is observed through status polling or the event stream
    let _ = state
        .orchestrator
        .spawn(material.material_key.clone(), material.content.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateMaterialResponse {
            material_key: material.material_key,
            status: material.status,
            has_pending_word_list: material.has_pending_word_list,
            has_pending_phrase_list: material.has_pending_phrase_list,
        }),
    ))
}

/// GET /materials/:key
pub async fn get_material(
    State(state): State<AppState>,
    Path(material_key): Path<String>,
) -> ApiResult<Json<MaterialDetail>> {
    load_material_detail(state.store.as_ref(), &material_key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Material {}", material_key)))
}

/// GET /materials
pub async fn list_materials(
    State(state): State<AppState>,
    Query(query): Query<ListMaterialsQuery>,
) -> ApiResult<Json<Vec<Material>>> {
    let materials = state.store.list_materials(query.search.as_deref()).await?;
    info!(count = materials.len(), search = ?query.search, "Materials listed");
    Ok(Json(materials))
}

/// PUT /materials/:key
///
/// Edits title and/or content. Lists already generated are kept.
pub async fn update_material(
    State(state): State<AppState>,
    Path(material_key): Path<String>,
    Json(update): Json<MaterialUpdate>,
) -> ApiResult<Json<Material>> {
    let material = state.store.update_material(&material_key, &update).await?;
    info!(material_key = %material_key, "Material updated");
    Ok(Json(material))
}

/// DELETE /materials/:key
pub async fn delete_material(
    State(state): State<AppState>,
    Path(material_key): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_material(&material_key).await?;
    info!(material_key = %material_key, "Material deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /materials/:key/status
pub async fn get_material_status(
    State(state): State<AppState>,
    Path(material_key): Path<String>,
) -> ApiResult<Json<MaterialStatusResponse>> {
    state
        .store
        .get_material_status(&material_key)
        .await?
        .map(|status| Json(MaterialStatusResponse { status }))
        .ok_or_else(|| ApiError::NotFound(format!("Material {}", material_key)))
}

/// Build material routes
pub fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/materials", post(create_material).get(list_materials))
        .route(
            "/materials/:key",
            get(get_material).put(update_material).delete(delete_material),
        )
        .route("/materials/:key/status", get(get_material_status))
        .route("/materials/:key/events", get(super::material_event_stream))
}
