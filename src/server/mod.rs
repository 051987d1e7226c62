//! HTTP/WebSocket server
//!
//! REST routes under `/api`, the event stream on `/ws` and a small landing
//! page on `/`.

mod auth;
pub mod error;
mod events;
pub mod routes;
pub mod state;

pub use auth::AuthLayer;
pub use error::{ApiError, ApiResult};
pub use events::{ClientMessage, Subscriptions};
pub use state::ServerAppState;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue,
    },
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Version information for the server
#[derive(serde::Serialize)]
struct VersionInfo {
    version: String,
    name: String,
}

/// Health check body
#[derive(serde::Serialize)]
struct HealthInfo {
    status: &'static str,
}

/// CORS must sit outside auth so preflight requests never need a token.
/// Headers are listed explicitly because browsers reject a wildcard next to
/// `Authorization`.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("[Server] Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Build the full application router.
/// Layer order: cors (outer) -> auth -> handler
pub fn build_router(state: ServerAppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .route("/ws", get(events::ws_handler))
        .merge(routes::api_router())
        .layer(AuthLayer::new(state.auth_token.clone()))
        .layer(cors_layer(&state.cors_origins))
        .with_state(state)
}

/// Resolve the bind host, which may be an IP literal or a name such as `localhost`
async fn resolve_bind_addr(bind: &str, port: u16) -> Result<SocketAddr, String> {
    let host = bind.trim().trim_start_matches('[').trim_end_matches(']');
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("Invalid bind address {}: {}", bind, e))?
        .next()
        .ok_or_else(|| format!("Bind address {} did not resolve", bind))
}

/// Run the HTTP/WebSocket server until shutdown is requested
pub async fn run_server(port: u16, bind: &str, state: ServerAppState) -> Result<(), String> {
    let addr = resolve_bind_addr(bind, port).await?;

    let cors_display = if state.cors_origins.is_empty() {
        "*".to_string()
    } else {
        state.cors_origins.join(", ")
    };
    let auth_display = if state.auth_token.is_some() {
        "bearer token"
    } else {
        "disabled"
    };

    let shutdown_state = state.shutdown_state.clone();
    let app = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    log::info!("[Server] Listening on http://{}", addr);
    log::info!("[Server] Auth: {}, CORS origins: {}", auth_display, cors_display);

    let shutdown_signal = async move {
        loop {
            if shutdown_state.is_shutdown_requested() {
                log::info!("[Server] Shutdown signal received, stopping server...");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))
}

async fn health_handler() -> Json<HealthInfo> {
    Json(HealthInfo { status: "ok" })
}

async fn version_handler() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Landing page for people who open the server in a browser
async fn index_handler() -> axum::response::Html<&'static str> {
    axum::response::Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Claudito</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 600px;
            margin: 50px auto;
            padding: 20px;
        }
        code { padding: 2px 6px; border-radius: 4px; background: #eee; }
    </style>
</head>
<body>
    <h1>Claudito</h1>
    <p>The server is running. Point the web client at this address.</p>
    <ul>
        <li><code>GET /api/health</code> health check</li>
        <li><code>/api/projects</code> projects, conversations, git, shell and Ralph loops</li>
        <li><code>GET /ws</code> real-time events</li>
    </ul>
</body>
</html>"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_skips_invalid_origins() {
        // Must not panic on a header value that cannot be parsed
        let _ = cors_layer(&["http://localhost:5173".to_string(), "bad\norigin".to_string()]);
        let _ = cors_layer(&[]);
    }

    #[tokio::test]
    async fn test_resolve_bind_addr() {
        let literal = resolve_bind_addr("127.0.0.1", 3000).await.unwrap();
        assert_eq!(literal, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());

        let v6 = resolve_bind_addr("[::1]", 3001).await.unwrap();
        assert!(v6.ip().is_loopback());
        assert_eq!(v6.port(), 3001);

        let named = resolve_bind_addr("localhost", 3002).await.unwrap();
        assert!(named.ip().is_loopback());

        assert!(resolve_bind_addr("not a host", 3003).await.is_err());
    }

    #[tokio::test]
    async fn test_health_handler() {
        let Json(info) = health_handler().await;
        assert_eq!(info.status, "ok");
    }

    #[tokio::test]
    async fn test_version_handler() {
        let Json(info) = version_handler().await;
        assert_eq!(info.name, "claudito");
        assert!(!info.version.is_empty());
    }
}
