//! Axum server setup
//!
//! - CORS policy taken from configuration
//! - Request tracing
//! - Graceful shutdown on SIGTERM/Ctrl+C, followed by the database shutdown hook

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::AppConfig;
use crate::database::Connector;
use crate::state::AppState;

const WILDCARD: &str = "*";

/// The complete HTTP application: routes, CORS and tracing bound to `state`.
///
/// Hosting runtimes that drive the router themselves embed this directly.
pub fn build_app<C: Connector>(state: AppState<C>) -> Router {
    let cors = cors_layer(&state.config);

    api::router::<C>()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the CORS layer. Entries that fail to parse are skipped with a warning.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = if is_wildcard(&config.cors_allowed_origins) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_entries(&config.cors_allowed_origins, "origin", |raw| {
            HeaderValue::from_str(raw).ok()
        }))
    };

    let methods = if is_wildcard(&config.cors_allowed_methods) {
        AllowMethods::any()
    } else {
        AllowMethods::list(parse_entries(&config.cors_allowed_methods, "method", |raw| {
            Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).ok()
        }))
    };

    let headers = if is_wildcard(&config.cors_allowed_headers) {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(parse_entries(&config.cors_allowed_headers, "header", |raw| {
            HeaderName::from_bytes(raw.as_bytes()).ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}

fn is_wildcard(entries: &[String]) -> bool {
    entries.iter().any(|entry| entry == WILDCARD)
}

fn parse_entries<T>(entries: &[String], kind: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    entries
        .iter()
        .filter_map(|raw| {
            let parsed = parse(raw);
            if parsed.is_none() {
                tracing::warn!(kind, value = %raw, "ignoring invalid CORS entry");
            }
            parsed
        })
        .collect()
}

/// Serves `state` until a shutdown signal arrives, then closes the database.
pub async fn run<C: Connector>(state: AppState<C>) -> anyhow::Result<()> {
    let addr = state.config.bind_addr();
    let db = state.db.clone();
    let app = build_app(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening for HTTP traffic");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    db.close().await;
    tracing::info!("server shutdown complete");

    served.map_err(Into::into)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, starting shutdown");
        }
    }
}
