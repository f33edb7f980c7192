//! Read access to archived task runs.

use super::Page;
use crate::{error_response, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use taskpilot_core::ArchivedRun;
use uuid::Uuid;

/// Archived run without its embedding vector.
fn view(mut run: ArchivedRun) -> ArchivedRun {
    run.enhanced_vector = None;
    run
}

/// GET /v1/tasks?skip=&limit= – newest first.
pub(crate) async fn list(State(state): State<AppState>, Query(page): Query<Page>) -> Response {
    let runs: Vec<ArchivedRun> = state
        .archive
        .list(page.skip, page.limit())
        .into_iter()
        .map(view)
        .collect();
    Json(serde_json::json!({ "total": state.archive.count(), "items": runs })).into_response()
}

/// GET /v1/tasks/:id
pub(crate) async fn get_one(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(id) = Uuid::parse_str(id.trim()) else {
        return error_response(StatusCode::BAD_REQUEST, format!("`{}` is not a task id", id));
    };
    match state.archive.get(&id) {
        Ok(Some(run)) => Json(view(run)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("task {} not found", id)),
        Err(e) => {
            tracing::error!(target: "taskpilot::gateway", run_id = %id, error = %e, "archive read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
