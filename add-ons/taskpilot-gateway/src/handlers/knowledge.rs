//! Knowledge CRUD over the business tree. Vectors stay server-side; responses carry text only.
//! The reasoning tree has its own routes in [`super::reasoning`].

use super::Page;
use crate::{error_response, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use taskpilot_core::{KnowledgeEntry, ScoredEntry, StoreError, VectorField};

#[derive(Debug, serde::Serialize)]
struct EntryView<'a> {
    id: u64,
    question: &'a str,
    answer: &'a str,
    created_at: i64,
    updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f32>,
}

impl<'a> EntryView<'a> {
    fn of(entry: &'a KnowledgeEntry) -> Self {
        Self {
            id: entry.id,
            question: &entry.question_text,
            answer: &entry.answer_text,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            similarity: None,
        }
    }

    fn scored(hit: &'a ScoredEntry) -> Self {
        Self {
            similarity: Some(hit.similarity),
            ..Self::of(&hit.entry)
        }
    }
}

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::EmptyText(_) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            tracing::error!(target: "taskpilot::gateway", error = %other, "knowledge store error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn not_found(id: u64) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("knowledge entry {} not found", id))
}

/// GET /v1/knowledge?skip=&limit=
pub(crate) async fn list(State(state): State<AppState>, Query(page): Query<Page>) -> Response {
    match state.knowledge.list(page.skip, page.limit()) {
        Ok(entries) => {
            let total = state.knowledge.count().unwrap_or(entries.len());
            let items: Vec<EntryView> = entries.iter().map(EntryView::of).collect();
            Json(serde_json::json!({ "total": total, "items": items })).into_response()
        }
        Err(e) => store_error(e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct CreateRequest {
    #[serde(alias = "question_text")]
    question: String,
    #[serde(alias = "answer_text")]
    answer: String,
}

/// POST /v1/knowledge
pub(crate) async fn create(State(state): State<AppState>, Json(req): Json<CreateRequest>) -> Response {
    match state.knowledge.create(&req.question, &req.answer).await {
        Ok(entry) => (StatusCode::CREATED, Json(EntryView::of(&entry))).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /v1/knowledge/:id
pub(crate) async fn get_one(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.knowledge.get(id) {
        Ok(Some(entry)) => Json(EntryView::of(&entry)).into_response(),
        Ok(None) => not_found(id),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct UpdateRequest {
    #[serde(default, alias = "question_text")]
    question: Option<String>,
    #[serde(default, alias = "answer_text")]
    answer: Option<String>,
}

/// PUT /v1/knowledge/:id – either text may be omitted.
pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateRequest>,
) -> Response {
    if req.question.is_none() && req.answer.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "nothing to update");
    }
    match state
        .knowledge
        .update(id, req.question.as_deref(), req.answer.as_deref())
        .await
    {
        Ok(Some(entry)) => Json(EntryView::of(&entry)).into_response(),
        Ok(None) => not_found(id),
        Err(e) => store_error(e),
    }
}

/// DELETE /v1/knowledge/:id
pub(crate) async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.knowledge.delete(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(id),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct SearchRequest {
    query: String,
    top_k: Option<usize>,
    /// Defaults to 0: nearest entries regardless of similarity.
    threshold: Option<f32>,
    #[serde(default)]
    field: VectorField,
}

/// POST /v1/knowledge/search
pub(crate) async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Response {
    let top_k = req.top_k.unwrap_or(state.config.enhancer.cache_top_k).min(super::MAX_PAGE);
    let threshold = req.threshold.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&threshold) {
        return error_response(StatusCode::BAD_REQUEST, "threshold must be within [0, 1]");
    }
    let hits = state.knowledge.search(req.field, &req.query, top_k, threshold).await;
    let items: Vec<EntryView> = hits.iter().map(EntryView::scored).collect();
    Json(serde_json::json!({
        "field": req.field,
        "degraded": hits.iter().any(|h| h.is_degraded()),
        "items": items,
    }))
    .into_response()
}
