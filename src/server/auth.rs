//! Authentication middleware for the server
//!
//! When a token is configured, `/api/*` requires `Authorization: Bearer <token>`
//! (except `/api/health`) and `/ws` requires `?token=<token>`, since browsers
//! cannot set headers on WebSocket upgrades.

use axum::{
    body::Body,
    extract::Request,
    http::{header::AUTHORIZATION, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tower::Layer;

/// Authentication layer that validates Bearer tokens
#[derive(Clone)]
pub struct AuthLayer {
    token: Option<Arc<String>>,
}

impl AuthLayer {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(Arc::new),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            token: self.token.clone(),
        }
    }
}

/// The actual middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    token: Option<Arc<String>>,
}

fn requires_auth(method: &Method, path: &str) -> bool {
    // CORS preflight requests never carry credentials
    if method == Method::OPTIONS {
        return false;
    }
    if path == "/api/health" {
        return false;
    }
    path.starts_with("/api/") || path == "/ws"
}

fn query_token(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Whether the request carries the expected token
fn is_authorized(req: &Request, token: &str) -> bool {
    if req.uri().path() == "/ws" && query_token(req.uri().query()) == Some(token) {
        return true;
    }
    bearer_token(req) == Some(token)
}

impl<S> tower::Service<Request> for AuthMiddleware<S>
where
    S: tower::Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let token = self.token.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(token) = token else {
                return inner.call(req).await;
            };

            if !requires_auth(req.method(), req.uri().path()) || is_authorized(&req, &token) {
                return inner.call(req).await;
            }

            log::debug!("[Auth] Rejected {} {}", req.method(), req.uri().path());
            Ok(unauthorized())
        })
    }
}

fn unauthorized() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized: invalid or missing token" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_auth() {
        assert!(requires_auth(&Method::GET, "/api/projects"));
        assert!(requires_auth(&Method::GET, "/ws"));
        assert!(!requires_auth(&Method::GET, "/api/health"));
        assert!(!requires_auth(&Method::OPTIONS, "/api/projects"));
        assert!(!requires_auth(&Method::GET, "/"));
    }

    #[test]
    fn test_query_token() {
        assert_eq!(query_token(Some("token=abc")), Some("abc"));
        assert_eq!(query_token(Some("x=1&token=abc")), Some("abc"));
        assert_eq!(query_token(Some("mytoken=abc")), None);
        assert_eq!(query_token(None), None);
    }

    #[test]
    fn test_is_authorized() {
        let req = Request::builder()
            .uri("/api/projects")
            .header(AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert!(is_authorized(&req, "secret"));
        assert!(!is_authorized(&req, "other"));

        // Query tokens only count for the WebSocket endpoint
        let req = Request::builder()
            .uri("/api/projects?token=secret")
            .body(Body::empty())
            .unwrap();
        assert!(!is_authorized(&req, "secret"));

        let req = Request::builder()
            .uri("/ws?token=secret")
            .body(Body::empty())
            .unwrap();
        assert!(is_authorized(&req, "secret"));
    }
}
