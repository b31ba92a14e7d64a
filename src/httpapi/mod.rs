//! Status HTTP surface (§4.5).
//!
//! A small read-only `axum` service exposing the same `StatusSnapshot` the
//! notifier dispatch loop writes to every cycle. `/health` is always open so
//! an external uptime check can probe the daemon itself without credentials;
//! `/state` and `/checker-states` sit behind an optional HTTP Basic gate and
//! an optional static directory (e.g. a small dashboard) is mounted at `/`
//! beneath them via `tower_http::services::ServeDir`.

use crate::core::status::StatusSnapshot;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    status: StatusSnapshot,
    basic_auth: Option<Arc<(String, String)>>,
}

pub async fn serve(
    addr: SocketAddr,
    status: StatusSnapshot,
    static_dir: Option<PathBuf>,
    basic_auth: Option<(String, String)>,
) -> std::io::Result<()> {
    let state = AppState {
        status,
        basic_auth: basic_auth.map(Arc::new),
    };

    let guarded = Router::new()
        .route("/state", get(state_handler))
        .route("/checker-states", get(checker_states_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth_gate));

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .merge(guarded)
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    let app = app.layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "health": "ok" }))
}

async fn state_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.read().await)
}

async fn checker_states_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.status.read().await;
    Json(snapshot.checkers)
}

async fn basic_auth_gate(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(expected) = &state.basic_auth else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(decode_basic_auth);

    match presented {
        Some((user, pass)) if user == expected.0 && pass == expected.1 => next.run(req).await,
        _ => unauthorized(),
    }
}

fn decode_basic_auth(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, "Basic realm=\"simplomon\"".parse().unwrap());
    response
}
