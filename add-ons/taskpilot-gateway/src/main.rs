//! Axum-based API gateway for taskpilot. Config-driven via CoreConfig.

mod handlers;

use axum::{
    extract::{Json, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::path::Path as StdPath;
use std::sync::Arc;
use taskpilot_core::{
    ConfigError, CoreConfig, KnowledgeBase, KnowledgeDb, ReasoningKnowledge, TaskArchive, TaskEnhancer,
    TaskOrchestrator,
};
use taskpilot_skills::{build_actuator, build_embedder, build_search, ModelRouter};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sled directory under `storage_path`.
const DB_DIR: &str = "taskpilot_knowledge";

/// Pre-flight check: configuration, collaborator credentials, database, and port.
fn run_verify() -> Result<(), String> {
    print!("Checking configuration... ");
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    println!("OK ({})", config.app_name);

    print!("Checking collaborators... ");
    check_collaborators(&config)?;
    println!(
        "OK (llm={}, web_search={}, actuator={})",
        config.llm.mode, config.enhancer.enable_web_search, config.actuator.mode
    );

    let db_path = StdPath::new(&config.storage_path).join(DB_DIR);
    print!("Checking {}... ", db_path.display());
    let db = KnowledgeDb::open_path(&db_path)
        .map_err(|e| format!("{} LOCKED or inaccessible: {}", DB_DIR, e))?;
    if let Some(broken) = db.domain_status().into_iter().find(|s| !s.connected) {
        return Err(format!(
            "tree {} failed: {}",
            broken.tree_name,
            broken.error.unwrap_or_default()
        ));
    }
    drop(db);
    println!("OK");

    let port = config.port;
    print!("Checking port {}... ", port);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => {
            return Err(format!("Port {} BLOCKED: {}", port, e));
        }
    }

    println!("\nSUCCESS: all systems go. Ready to start gateway.");
    Ok(())
}

/// Builds every collaborator once so a missing credential fails the pre-flight by name.
fn check_collaborators(config: &CoreConfig) -> Result<(), String> {
    ModelRouter::from_settings(&config.llm).map_err(|e| e.to_string())?;
    build_embedder(&config.embedding).map_err(|e| e.to_string())?;
    build_search(config).map_err(|e| match e {
        ConfigError::MissingCredential(key) => format!(
            "web search is enabled but `{}` is not set (TASKPILOT__SEARCH__API_KEY), \
             or set enhancer.enable_web_search = false",
            key
        ),
        other => other.to_string(),
    })?;
    build_actuator(&config.actuator).map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[taskpilot-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[taskpilot-gateway] {}", e);
            std::process::exit(1);
        }
    };
    let state = match build_state(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(target: "taskpilot::gateway", error = %e, "gateway refused to start");
            std::process::exit(1);
        }
    };

    let port = state.config.port;
    let app_name = state.config.app_name.clone();
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(target: "taskpilot::gateway", %addr, error = %e, "bind failed");
            std::process::exit(1);
        }
    };
    tracing::info!(target: "taskpilot::gateway", "{} listening on {}", app_name, addr);
    if let Err(e) = axum::serve(listener, build_app(state)).await {
        tracing::error!(target: "taskpilot::gateway", error = %e, "server stopped");
    }
}

/// Wires config -> stores -> collaborators -> pipeline -> orchestrator.
pub(crate) fn build_state(config: CoreConfig) -> Result<AppState, String> {
    let db_path = StdPath::new(&config.storage_path).join(DB_DIR);
    let db = KnowledgeDb::open_path(&db_path)
        .map_err(|e| format!("open {}: {}", db_path.display(), e))?;
    let business = db.business().map_err(|e| format!("open business tree: {}", e))?;
    let reasoning_tree = db.reasoning().map_err(|e| format!("open reasoning tree: {}", e))?;
    let archive = db.task_archive().map_err(|e| format!("open task archive: {}", e))?;

    let embedder = build_embedder(&config.embedding).map_err(|e| e.to_string())?;
    let knowledge = KnowledgeBase::new(Arc::new(business), Arc::clone(&embedder));
    let reasoning = ReasoningKnowledge::new(Arc::new(reasoning_tree), embedder);
    let model = Arc::new(ModelRouter::from_settings(&config.llm).map_err(|e| e.to_string())?);

    let mut enhancer = TaskEnhancer::new(knowledge.clone(), model.clone(), config.enhancer.clone())
        .map_err(|e| e.to_string())?;
    if let Some(search) = build_search(&config).map_err(|e| e.to_string())? {
        enhancer = enhancer.with_search(search, config.search.results_per_keyword);
    }
    let enhancer = Arc::new(enhancer);

    let actuator = build_actuator(&config.actuator).map_err(|e| e.to_string())?;
    let orchestrator = TaskOrchestrator::new(Arc::clone(&enhancer), model.clone(), actuator)
        .with_archive(archive.clone(), config.history.clone())
        .with_target(config.actuator.target.clone(), config.actuator.timeout());

    tracing::info!(
        target: "taskpilot::gateway",
        llm_mode = model.mode().as_str(),
        model = model.model_name(),
        strategy = enhancer.strategy().name(),
        web_search = enhancer.search_enabled(),
        actuator = orchestrator.actuator_name(),
        "pipeline ready"
    );

    Ok(AppState {
        config: Arc::new(config),
        db,
        knowledge,
        reasoning,
        archive,
        enhancer,
        orchestrator: Arc::new(orchestrator),
    })
}

fn build_app(state: AppState) -> Router {
    // Allow local UIs (3001-3099) and sibling services (8001-8099).
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &axum::http::HeaderValue, _| {
            let s = origin.to_str().unwrap_or("");
            let port = s
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (3001..=3099).contains(&port) || (8001..=8099).contains(&port)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/kb-status", get(kb_status))
        .route("/v1/status", get(status))
        .route("/v1/enhance", post(enhance))
        .route("/v1/run", post(run))
        .route(
            "/v1/knowledge",
            get(handlers::knowledge::list).post(handlers::knowledge::create),
        )
        .route("/v1/knowledge/search", post(handlers::knowledge::search))
        .route(
            "/v1/knowledge/:id",
            get(handlers::knowledge::get_one)
                .put(handlers::knowledge::update)
                .delete(handlers::knowledge::delete),
        )
        .route(
            "/v1/reasoning-knowledge",
            get(handlers::reasoning::list).post(handlers::reasoning::create),
        )
        .route("/v1/reasoning-knowledge/search", post(handlers::reasoning::search))
        .route(
            "/v1/reasoning-knowledge/:id",
            get(handlers::reasoning::get_one)
                .put(handlers::reasoning::update)
                .delete(handlers::reasoning::delete),
        )
        .route("/v1/tasks", get(handlers::tasks::list))
        .route("/v1/tasks/:id", get(handlers::tasks::get_one))
        .with_state(state)
        .layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) db: KnowledgeDb,
    pub(crate) knowledge: KnowledgeBase,
    pub(crate) reasoning: ReasoningKnowledge,
    pub(crate) archive: TaskArchive,
    pub(crate) enhancer: Arc<TaskEnhancer>,
    pub(crate) orchestrator: Arc<TaskOrchestrator>,
}

/// JSON error body with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /api/v1/health – liveness check for UI and scripts.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/v1/kb-status – connectivity and size of every durable tree.
async fn kb_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let trees = state.db.domain_status();
    let all_connected = trees.iter().all(|s| s.connected);
    let total_entries: usize = trees.iter().map(|s| s.entry_count).sum();
    Json(serde_json::json!({
        "status": if all_connected { "ok" } else { "degraded" },
        "all_connected": all_connected,
        "total_entries": total_entries,
        "knowledge_bases": trees,
    }))
}

/// GET /v1/status – app identity, collaborator modes, and thresholds.
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(serde_json::json!({
        "app_name": config.app_name,
        "port": config.port,
        "llm_mode": config.llm.mode,
        "embedding_mode": config.embedding.mode,
        "strategy": state.enhancer.strategy(),
        "enable_cache": config.enhancer.enable_cache,
        "web_search": state.enhancer.search_enabled(),
        "similarity_threshold": config.enhancer.similarity_threshold,
        "history_threshold": config.history.threshold,
        "actuator": state.orchestrator.actuator_name(),
        "target": config.actuator.target,
    }))
}

#[derive(serde::Deserialize)]
struct EnhanceRequest {
    task: String,
    #[serde(default)]
    force_refresh: bool,
}

/// POST /v1/enhance – runs the enhancement pipeline only.
async fn enhance(State(state): State<AppState>, Json(req): Json<EnhanceRequest>) -> axum::response::Response {
    if req.task.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "task must not be empty");
    }
    let result = state.enhancer.enhance(&req.task, req.force_refresh).await;
    tracing::info!(
        target: "taskpilot::gateway",
        source = ?result.source,
        cache_hit = result.cache_hit,
        "enhance request served"
    );
    Json(result).into_response()
}

#[derive(serde::Deserialize)]
struct RunRequest {
    task: String,
}

/// POST /v1/run – full run: enhance, feasibility, decomposition, execution, report.
async fn run(State(state): State<AppState>, Json(req): Json<RunRequest>) -> axum::response::Response {
    if req.task.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "task must not be empty");
    }
    let task = state.orchestrator.run_task(&req.task).await;
    Json(task).into_response()
}
