//! HTTP API for testimonies and their connections.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | | Health check (returns version) |
//! | `POST` | `/testimonies` | admin | Create or replace a testimony |
//! | `GET`  | `/testimonies/{id}?connectionsLimit=N` | | Testimony with its connections |
//! | `DELETE` | `/testimonies/{id}` | admin | Delete a testimony, its vectors and edges |
//! | `POST` | `/testimonies/{id}/approve` | admin | Approve; pipeline runs in the background |
//! | `POST` | `/testimonies/{id}/discover-connections` | admin | Re-run discovery in the background |
//! | `GET`  | `/testimonies/connections/all?limit=N` | | Best connections overall |
//! | `PUT`  | `/connections/rating` | admin | Rate a connection 1..=5 |
//!
//! Admin routes require `Authorization: Bearer <server.admin_token>`. With
//! no token configured they are open.
//!
//! Testimonies that are not approved are only visible to admins. Anonymous
//! testimonies never expose `fullName`, `email`, `phone` or `location`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "testimony not found: t1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use testimony_connections_core::connections::{clamp_limit, connections_for, top_connections};
use testimony_connections_core::models::{EdgeType, Testimony, TestimonyStatus};
use testimony_connections_core::view::{ConnectionView, TestimonyView};

use crate::config::Config;
use crate::db;
use crate::migrate::migrate_pool;
use crate::pipeline::Pipeline;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pipeline: Pipeline,
}

impl AppState {
    pub fn new(config: Arc<Config>, pipeline: Pipeline) -> Self {
        Self { config, pipeline }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
///
/// Migrations run first, so the server works against a fresh database.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool));
    let pipeline = Pipeline::from_config(config, store)?;
    let state = AppState::new(Arc::new(config.clone()), pipeline);

    if config.server.admin_token.is_none() {
        warn!("server.admin_token is not set; admin routes are open");
    }

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("Testimony Connections listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/testimonies", post(handle_create_testimony))
        .route(
            "/testimonies/connections/all",
            get(handle_all_connections),
        )
        .route(
            "/testimonies/{id}",
            get(handle_get_testimony).delete(handle_delete_testimony),
        )
        .route("/testimonies/{id}/approve", post(handle_approve))
        .route(
            "/testimonies/{id}/discover-connections",
            post(handle_discover),
        )
        .route("/connections/rating", put(handle_rate_connection))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: "missing or invalid admin token".to_string(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

// ============ Auth ============

fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.config.server.admin_token.as_deref() else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim() == expected)
        .unwrap_or(false)
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if is_admin(state, headers) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

fn parse_limit(raw: Option<&str>, name: &str) -> Result<usize, AppError> {
    let requested = match raw {
        None => None,
        Some(s) => Some(
            s.trim()
                .parse::<i64>()
                .map_err(|_| bad_request(format!("{} must be an integer", name)))?,
        ),
    };
    Ok(clamp_limit(requested))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Testimonies ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    id: String,
}

async fn handle_create_testimony(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    require_admin(&state, &headers)?;

    let testimony: Testimony = serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid testimony: {}", e)))?;
    if testimony.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }

    let id = state.pipeline.store.upsert_testimony(&testimony).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestimonyQuery {
    connections_limit: Option<String>,
}

#[derive(Serialize)]
struct TestimonyWithConnections {
    #[serde(flatten)]
    testimony: TestimonyView,
    connections: Vec<ConnectionView>,
}

async fn handle_get_testimony(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TestimonyQuery>,
) -> Result<Json<TestimonyWithConnections>, AppError> {
    let limit = parse_limit(query.connections_limit.as_deref(), "connectionsLimit")?;
    let store = state.pipeline.store.as_ref();

    let testimony = store
        .get_testimony(&id)
        .await?
        .filter(|t| t.status == TestimonyStatus::Approved || is_admin(&state, &headers))
        .ok_or_else(|| not_found(format!("testimony not found: {}", id)))?;

    let connections = connections_for(store, &id, limit).await?;

    Ok(Json(TestimonyWithConnections {
        testimony: TestimonyView::from(&testimony),
        connections,
    }))
}

async fn handle_delete_testimony(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    require_admin(&state, &headers)?;
    if state.pipeline.store.delete_testimony(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("testimony not found: {}", id)))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    message: String,
    testimony_id: String,
}

async fn handle_approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    require_admin(&state, &headers)?;
    if !state.pipeline.approve(&id).await? {
        return Err(not_found(format!("testimony not found: {}", id)));
    }

    state.pipeline.spawn_process(id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "Testimony approved; processing started".to_string(),
            testimony_id: id,
        }),
    ))
}

async fn handle_discover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    require_admin(&state, &headers)?;
    if state.pipeline.store.get_testimony(&id).await?.is_none() {
        return Err(not_found(format!("testimony not found: {}", id)));
    }

    state.pipeline.spawn_discovery(id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: "Connection discovery started".to_string(),
            testimony_id: id,
        }),
    ))
}

// ============ Connections ============

#[derive(Deserialize)]
struct AllConnectionsQuery {
    limit: Option<String>,
}

#[derive(Serialize)]
struct ConnectionsResponse {
    connections: Vec<ConnectionView>,
}

async fn handle_all_connections(
    State(state): State<AppState>,
    Query(query): Query<AllConnectionsQuery>,
) -> Result<Json<ConnectionsResponse>, AppError> {
    let limit = parse_limit(query.limit.as_deref(), "limit")?;
    let connections = top_connections(state.pipeline.store.as_ref(), limit).await?;
    Ok(Json(ConnectionsResponse { connections }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RatingRequest {
    from_id: String,
    to_id: String,
    #[serde(rename = "type")]
    edge_type: String,
    rating: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RatingResponse {
    from_id: String,
    to_id: String,
    #[serde(rename = "type")]
    edge_type: EdgeType,
    user_rating: i64,
}

async fn handle_rate_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<RatingResponse>, AppError> {
    require_admin(&state, &headers)?;

    let req: RatingRequest = serde_json::from_value(body)
        .map_err(|e| bad_request(format!("invalid rating request: {}", e)))?;
    if !(1..=5).contains(&req.rating) {
        return Err(bad_request("rating must be between 1 and 5"));
    }
    let edge_type: EdgeType = req
        .edge_type
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let updated = state
        .pipeline
        .store
        .rate_edge(&req.from_id, &req.to_id, edge_type, req.rating)
        .await?;
    if !updated {
        return Err(not_found(format!(
            "connection not found: {} -> {} ({})",
            req.from_id, req.to_id, edge_type
        )));
    }

    Ok(Json(RatingResponse {
        from_id: req.from_id,
        to_id: req.to_id,
        edge_type,
        user_rating: req.rating,
    }))
}
