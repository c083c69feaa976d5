//! REST API handlers for the logistics backend
//!
//! # Endpoints
//! - `GET /api/` - Service banner with the configured API version
//! - `GET /api/health` - Liveness plus database status; always answers 200
//! - `GET /api/test` - Smoke-test endpoint
//! - `GET /api/ready` - Readiness probe; 503 while the database is unreachable
//! - `GET /api/logo` - Which logo the PDF layer would draw right now
//!
//! Error bodies never carry internal details unless debug mode is on.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assets::Logo;
use crate::database::{Connector, DatabaseHandle};
use crate::error::Error;
use crate::state::AppState;

// ============================================================================
// CONSTANTS
// ============================================================================

const SERVICE_NAME: &str = "Logistics API";
const HEALTH_FAILED_MESSAGE: &str = "health check failed";

// ============================================================================
// ROUTER
// ============================================================================

/// Creates the API router. Paths are absolute so the router can be merged
/// into any outer application.
pub fn router<C: Connector>() -> Router<AppState<C>> {
    Router::new()
        .route("/api", get(root::<C>))
        .route("/api/", get(root::<C>))
        .route("/api/health", get(health::<C>))
        .route("/api/test", get(test_endpoint))
        .route("/api/ready", get(ready::<C>))
        .route("/api/logo", get(logo::<C>))
}

// ============================================================================
// REQUEST/RESPONSE TYPES
// ============================================================================

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: String,
    status: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct TestResponse {
    message: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    database: String,
}

#[derive(Deserialize)]
struct LogoQuery {
    /// `header` (default) or `table`
    size: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::DependencyUnavailable(name) => {
                Self::service_unavailable(format!("{} unavailable", name))
            }
            Error::Database(_) | Error::ConnectTimeout(_) => {
                // Log the actual error, but don't expose it to the client
                tracing::error!(error = %err, "database error");
                Self::service_unavailable("database unavailable")
            }
            other => {
                tracing::error!(error = %other, "internal error");
                Self::internal("internal error")
            }
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/
async fn root<C: Connector>(State(state): State<AppState<C>>) -> Json<RootResponse> {
    Json(RootResponse {
        message: SERVICE_NAME,
        version: state.config.api_version.clone(),
        status: "running",
    })
}

/// GET /api/health
///
/// Failures are reported in the body as `unhealthy`; the status code stays 200.
async fn health<C: Connector>(State(state): State<AppState<C>>) -> Json<HealthResponse> {
    let Some(db) = state.db.connection().await else {
        return Json(HealthResponse {
            status: "healthy".to_string(),
            database: "disconnected".to_string(),
            message: "API is running; database is not connected".to_string(),
            timestamp: Utc::now(),
        });
    };

    match db.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "healthy".to_string(),
            database: "connected".to_string(),
            message: "API and database are operational".to_string(),
            timestamp: Utc::now(),
        }),
        Err(err) => {
            tracing::error!(error = %err, database = db.name(), "health check failed");
            let message = if state.config.debug {
                format!("{}: {}", HEALTH_FAILED_MESSAGE, err)
            } else {
                HEALTH_FAILED_MESSAGE.to_string()
            };
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                database: "error".to_string(),
                message,
                timestamp: Utc::now(),
            })
        }
    }
}

/// GET /api/test
async fn test_endpoint() -> Json<TestResponse> {
    Json(TestResponse {
        message: "Test endpoint working",
        timestamp: Utc::now(),
    })
}

/// GET /api/ready
async fn ready<C: Connector>(
    State(state): State<AppState<C>>,
) -> Result<Json<ReadyResponse>, ApiError> {
    let db = state.db.database_or_fail().await?;
    db.ping().await?;

    Ok(Json(ReadyResponse {
        status: "ready",
        database: db.name().to_string(),
    }))
}

/// GET /api/logo?size=header|table
async fn logo<C: Connector>(
    State(state): State<AppState<C>>,
    Query(params): Query<LogoQuery>,
) -> Result<Json<Logo>, ApiError> {
    let logo = match params.size.as_deref().unwrap_or("header") {
        "header" => state.logos.resolve_header(),
        "table" => state.logos.resolve_for_table(),
        other => {
            return Err(ApiError::bad_request(format!(
                "unknown logo size '{}'; expected header or table",
                other
            )));
        }
    };

    Ok(Json(logo))
}
