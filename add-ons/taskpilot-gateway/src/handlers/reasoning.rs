//! Reasoning knowledge CRUD: (task, step) pairs in the `reasoning_knowledge` tree.

use super::Page;
use crate::{error_response, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use taskpilot_core::{KnowledgeEntry, ReasoningField, ScoredEntry, StoreError};

#[derive(Debug, serde::Serialize)]
struct PairView<'a> {
    id: u64,
    task: &'a str,
    step: &'a str,
    created_at: i64,
    updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f32>,
}

impl<'a> PairView<'a> {
    fn of(entry: &'a KnowledgeEntry) -> Self {
        Self {
            id: entry.id,
            task: &entry.question_text,
            step: &entry.answer_text,
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
            tracing::error!(target: "taskpilot::gateway", error = %other, "reasoning store error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn not_found(id: u64) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("reasoning entry {} not found", id))
}

/// GET /v1/reasoning-knowledge?skip=&limit=
pub(crate) async fn list(State(state): State<AppState>, Query(page): Query<Page>) -> Response {
    match state.reasoning.list(page.skip, page.limit()) {
        Ok(entries) => {
            let total = state.reasoning.count().unwrap_or(entries.len());
            let items: Vec<PairView> = entries.iter().map(PairView::of).collect();
            Json(serde_json::json!({ "total": total, "items": items })).into_response()
        }
        Err(e) => store_error(e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct CreateRequest {
    #[serde(alias = "task_text")]
    task: String,
    #[serde(alias = "step_text")]
    step: String,
}

/// POST /v1/reasoning-knowledge
pub(crate) async fn create(State(state): State<AppState>, Json(req): Json<CreateRequest>) -> Response {
    match state.reasoning.create(&req.task, &req.step).await {
        Ok(entry) => (StatusCode::CREATED, Json(PairView::of(&entry))).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /v1/reasoning-knowledge/:id
pub(crate) async fn get_one(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.reasoning.get(id) {
        Ok(Some(entry)) => Json(PairView::of(&entry)).into_response(),
        Ok(None) => not_found(id),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct UpdateRequest {
    #[serde(default, alias = "task_text")]
    task: Option<String>,
    #[serde(default, alias = "step_text")]
    step: Option<String>,
}

/// PUT /v1/reasoning-knowledge/:id
pub(crate) async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateRequest>,
) -> Response {
    if req.task.is_none() && req.step.is_none() {
        return error_response(StatusCode::BAD_REQUEST, "nothing to update");
    }
    match state
        .reasoning
        .update(id, req.task.as_deref(), req.step.as_deref())
        .await
    {
        Ok(Some(entry)) => Json(PairView::of(&entry)).into_response(),
        Ok(None) => not_found(id),
        Err(e) => store_error(e),
    }
}

/// DELETE /v1/reasoning-knowledge/:id
pub(crate) async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.reasoning.delete(id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(id),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct SearchRequest {
    query: String,
    top_k: Option<usize>,
    threshold: Option<f32>,
    #[serde(default)]
    field: ReasoningField,
}

/// POST /v1/reasoning-knowledge/search – `field` is "task" (default) or "step".
pub(crate) async fn search(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Response {
    let top_k = req.top_k.unwrap_or(state.config.enhancer.cache_top_k).min(super::MAX_PAGE);
    let threshold = req.threshold.unwrap_or(0.0);
    if !(0.0..=1.0).contains(&threshold) {
        return error_response(StatusCode::BAD_REQUEST, "threshold must be within [0, 1]");
    }
    let hits = state.reasoning.search(req.field, &req.query, top_k, threshold).await;
    let items: Vec<PairView> = hits.iter().map(PairView::scored).collect();
    Json(serde_json::json!({
        "field": req.field,
        "degraded": hits.iter().any(|h| h.is_degraded()),
        "items": items,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use crate::build_app;
    use crate::tests::{get_req, post_json, send, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn pairs_are_created_searched_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let app = build_app(state.clone());

        let (code, created) = send(
            app.clone(),
            post_json(
                "/v1/reasoning-knowledge",
                serde_json::json!({ "task": "pin the project group", "step": "Right-click the group and choose Pin" }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
        let id = created["id"].as_u64().unwrap();
        assert_eq!(created["task"], "pin the project group");
        assert!(created.get("question_vector").is_none());
        assert_eq!(state.knowledge.count().unwrap(), 0);

        let (code, json) = send(
            app.clone(),
            post_json(
                "/v1/reasoning-knowledge/search",
                serde_json::json!({ "query": "Right-click the group and choose Pin", "field": "step", "threshold": 0.9 }),
            ),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["field"], "step");
        assert_eq!(json["degraded"], false);
        assert_eq!(json["items"][0]["task"], "pin the project group");

        let put = Request::builder()
            .method("PUT")
            .uri(format!("/v1/reasoning-knowledge/{}", id))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "step": "Choose Pin from the menu" }).to_string()))
            .unwrap();
        let (code, updated) = send(app.clone(), put).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(updated["step"], "Choose Pin from the menu");

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/reasoning-knowledge/{}", id))
            .body(Body::empty())
            .unwrap();
        let (code, _) = send(app.clone(), delete).await;
        assert_eq!(code, StatusCode::NO_CONTENT);
        let (code, _) = send(app, get_req(&format!("/v1/reasoning-knowledge/{}", id))).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_step_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (code, json) = send(
            build_app(test_state(&dir)),
            post_json("/v1/reasoning-knowledge", serde_json::json!({ "task": "mute a chat", "step": "" })),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("step_text"));
    }
}
