//! HTTP API for the assistant.
//!
//! # Endpoints
//!
//! | Method   | Path                              | Description |
//! |----------|-----------------------------------|-------------|
//! | `GET`    | `/health`                         | Health check (returns version) |
//! | `POST`   | `/api/auth/register`              | Create a user account |
//! | `POST`   | `/api/auth/login`                 | Exchange credentials for a token |
//! | `POST`   | `/api/sessions/new`               | Create a chat session |
//! | `GET`    | `/api/sessions`                   | List the caller's sessions |
//! | `GET`    | `/api/sessions/{id}/history`      | Messages and token total |
//! | `POST`   | `/api/sessions/{id}/message`      | Ask a question in a session |
//! | `DELETE` | `/api/sessions/{id}`              | Delete an owned session |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "unauthorized", "message": "failed to authenticate token" } }
//! ```
//!
//! Session routes require `Authorization: Bearer <token>`. A missing token
//! is `403`, a bad or expired one is `401`. Deleting a session that exists
//! but belongs to someone else is `403`, indistinguishable from one that
//! does not exist.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! chat frontends.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{self, Claims};
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::pipeline::Pipeline;
use crate::sessions;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
    pipeline: Arc<Pipeline>,
    secret: Arc<String>,
}

/// Starts the HTTP server.
///
/// Connects the database, applies migrations, wires the resolution
/// pipeline, and binds to `[server].bind`. Fails fast when the token
/// signing secret is absent from the environment.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let secret = auth::load_secret()?;

    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let pipeline = Pipeline::from_config(config)?;

    let state = AppState {
        pool,
        pipeline: Arc::new(pipeline),
        secret: Arc::new(secret),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/auth/register", post(handle_register))
        .route("/api/auth/login", post(handle_login))
        .route("/api/sessions/new", post(handle_create_session))
        .route("/api/sessions", get(handle_list_sessions))
        .route("/api/sessions/{id}/history", get(handle_history))
        .route("/api/sessions/{id}/message", post(handle_message))
        .route("/api/sessions/{id}", delete(handle_delete_session))
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    println!("server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body shared by every failing route.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"forbidden"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        code: "forbidden".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps session-layer errors to HTTP statuses. Ownership violations
/// surface as `403`; everything else is a server fault.
fn classify_session_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("not found or unauthorized") {
        forbidden(msg)
    } else {
        internal(msg)
    }
}

// ============ Authentication ============

/// Extracts and verifies the bearer token. A missing token is `403`
/// while an invalid one is `401`, mirroring the frontend's contract.
fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Claims, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| forbidden("no token provided"))?;
    auth::verify_token(secret, token)
        .map_err(|_| unauthorized("failed to authenticate token"))
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

// ============ POST /api/auth/register ============

#[derive(Deserialize)]
struct CredentialsRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(bad_request("username and password are required"));
    }
    auth::create_user(&state.pool, &body.username, &body.password)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("already exists") {
                conflict(msg)
            } else {
                internal(msg)
            }
        })?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "user registered successfully".to_string(),
        }),
    ))
}

// ============ POST /api/auth/login ============

#[derive(Serialize)]
struct LoginResponse {
    token: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if body.username.is_empty() || body.password.is_empty() {
        return Err(bad_request("username and password are required"));
    }
    let token = auth::verify_login(&state.pool, &state.secret, &body.username, &body.password)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("invalid credentials") {
                bad_request(msg)
            } else {
                internal(msg)
            }
        })?;
    Ok(Json(LoginResponse { token }))
}

// ============ POST /api/sessions/new ============

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: i64,
}

async fn handle_create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let claims = authenticate(&headers, &state.secret)?;
    let session_id = sessions::create_session(&state.pool, claims.id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id }),
    ))
}

// ============ GET /api/sessions ============

async fn handle_list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<sessions::SessionSummary>>, AppError> {
    let claims = authenticate(&headers, &state.secret)?;
    let list = sessions::sessions_for_user(&state.pool, claims.id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(list))
}

// ============ GET /api/sessions/{id}/history ============

async fn handle_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
) -> Result<Json<sessions::SessionHistory>, AppError> {
    authenticate(&headers, &state.secret)?;
    let history = sessions::session_history(&state.pool, session_id)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(history))
}

// ============ POST /api/sessions/{id}/message ============

#[derive(Deserialize)]
struct MessageRequest {
    question: String,
}

async fn handle_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<crate::models::Resolution>, AppError> {
    authenticate(&headers, &state.secret)?;
    if body.question.is_empty() {
        return Err(bad_request("question is required"));
    }
    let resolution =
        sessions::handle_message(&state.pool, &state.pipeline, session_id, &body.question)
            .await
            .map_err(|e| internal(e.to_string()))?;
    Ok(Json(resolution))
}

// ============ DELETE /api/sessions/{id} ============

async fn handle_delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let claims = authenticate(&headers, &state.secret)?;
    sessions::delete_session(&state.pool, session_id, claims.id)
        .await
        .map_err(classify_session_error)?;
    Ok(StatusCode::NO_CONTENT)
}
