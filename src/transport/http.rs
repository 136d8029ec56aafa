use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::forwarded::client_addr;
use crate::config::ServerConfig;
use crate::handlers::health;
use crate::protocol::{JsonRpcError, JsonRpcResponse};
use crate::session::{parse_message, Inbound, Session};

/// Header carrying the streamable HTTP session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

pub const STREAMABLE_PATH: &str = "/mcp";

/// Responses buffered per SSE stream before senders wait.
const SSE_CHANNEL_CAPACITY: usize = 64;

type Registry<T> = Arc<Mutex<HashMap<String, Arc<T>>>>;

/// An open SSE stream and the MCP session behind it.
struct SseSession {
    session: Session,
    tx: mpsc::Sender<JsonRpcResponse>,
}

/// A streamable HTTP session and when a client last used it.
struct HttpSession {
    session: Session,
    last_seen: Mutex<Instant>,
}

impl HttpSession {
    fn new() -> Self {
        Self {
            session: Session::new(),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *lock(&self.last_seen) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        lock(&self.last_seen).elapsed()
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    sse_sessions: Registry<SseSession>,
    http_sessions: Registry<HttpSession>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            sse_sessions: Arc::default(),
            http_sessions: Arc::default(),
        }
    }
}

fn lock<T>(registry: &Mutex<T>) -> MutexGuard<'_, T> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes an SSE session once its stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Registry<SseSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        lock(&self.sessions).remove(&self.id);
        info!(session_id = %self.id, "SSE session closed");
    }
}

/// Build the HTTP router: SSE transport, streamable HTTP and health.
pub fn router(config: Arc<ServerConfig>) -> Router {
    let state = AppState::new(Arc::clone(&config));

    Router::new()
        .route(&config.sse_path, get(open_sse))
        .route(&config.message_path, post(post_message))
        .route(
            STREAMABLE_PATH,
            post(streamable_post).delete(streamable_delete),
        )
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(state.clone(), log_request))
        .with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let addr = config.bind_addr();
    let config = Arc::new(config);
    let app = router(Arc::clone(&config));

    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        sse_path = %config.sse_path,
        message_path = %config.message_path,
        stateless = config.stateless,
        "HTTP transport listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP transport stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn log_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = client_addr(peer, req.headers(), &state.config.forwarded_allow_ips);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = next.run(req).await;
    info!(
        client = client.map(|ip| ip.to_string()).unwrap_or_else(|| "-".into()),
        %method,
        %path,
        status = resp.status().as_u16(),
        "request"
    );
    resp
}

async fn health_check() -> Json<serde_json::Value> {
    Json(health::status())
}

// ---------------------------------------------------------------------------
// SSE transport
// ---------------------------------------------------------------------------

async fn open_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);
    let session = Arc::new(SseSession {
        session: Session::new(),
        tx,
    });
    lock(&state.sse_sessions).insert(id.clone(), session);
    info!(session_id = %id, "SSE session opened");

    let endpoint = format!("{}?session_id={}", state.config.message_path, id);
    let guard = SessionGuard {
        id,
        sessions: Arc::clone(&state.sse_sessions),
    };

    let first = stream::once(async move { Ok(Event::default().event("endpoint").data(endpoint)) });
    let messages = ReceiverStream::new(rx).map(move |resp| {
        debug!(session_id = %guard.id, "sending message");
        Ok(message_event(&resp))
    });

    Sse::new(first.chain(messages)).keep_alive(KeepAlive::default())
}

fn message_event(resp: &JsonRpcResponse) -> Event {
    match Event::default().event("message").json_data(resp) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "cannot encode SSE message");
            Event::default().comment("dropped unencodable message")
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

/// Accept a client message for an SSE session. The reply travels on the
/// stream; this endpoint only acknowledges receipt.
async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };

    let found = lock(&state.sse_sessions).get(&id).cloned();
    let Some(sse) = found else {
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    };

    let req = match parse_message(&body) {
        Inbound::Request(req) => req,
        Inbound::Reject(resp) => {
            let _ = sse.tx.send(resp).await;
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
        Inbound::Empty => return (StatusCode::BAD_REQUEST, "Empty message").into_response(),
    };

    // The handshake is handled inline so that requests sent right after it
    // see an initialized session.
    if req.method == "initialize" {
        if let Some(resp) = sse.session.handle(&req, &state.config).await {
            let _ = sse.tx.send(resp).await;
        }
        return StatusCode::ACCEPTED.into_response();
    }

    let config = Arc::clone(&state.config);
    tokio::spawn(async move {
        if let Some(resp) = sse.session.handle(&req, &config).await {
            if sse.tx.send(resp).await.is_err() {
                debug!(session_id = %id, "stream closed before response was delivered");
            }
        }
    });

    StatusCode::ACCEPTED.into_response()
}

// ---------------------------------------------------------------------------
// Streamable HTTP transport
// ---------------------------------------------------------------------------

async fn streamable_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req = match parse_message(&body) {
        Inbound::Request(req) => req,
        Inbound::Reject(resp) => return (StatusCode::BAD_REQUEST, Json(resp)).into_response(),
        Inbound::Empty => {
            let resp = JsonRpcResponse::error(None, JsonRpcError::invalid_request());
            return (StatusCode::BAD_REQUEST, Json(resp)).into_response();
        }
    };

    if state.config.stateless {
        let resp = Session::stateless().handle(&req, &state.config).await;
        return reply(resp, None);
    }

    if req.method == "initialize" {
        let id = Uuid::new_v4().simple().to_string();
        let session = Arc::new(HttpSession::new());
        if !admit(&state, &id, Arc::clone(&session)) {
            warn!(limit = state.config.max_sessions, "HTTP session limit reached");
            let resp = JsonRpcResponse::error(
                req.id.clone(),
                JsonRpcError::internal_error("Too many open sessions"),
            );
            return (StatusCode::SERVICE_UNAVAILABLE, Json(resp)).into_response();
        }
        let resp = session.session.handle(&req, &state.config).await;
        info!(session_id = %id, "HTTP session opened");
        return reply(resp, Some(&id));
    }

    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        let resp = JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::invalid_request_with("Missing Mcp-Session-Id header"),
        );
        return (StatusCode::BAD_REQUEST, Json(resp)).into_response();
    };

    let Some(entry) = live_session(&state, id) else {
        let resp = JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::invalid_request_with("Session not found"),
        );
        return (StatusCode::NOT_FOUND, Json(resp)).into_response();
    };

    entry.touch();
    let resp = entry.session.handle(&req, &state.config).await;
    reply(resp, None)
}

/// Register a new session after dropping idle ones. Fails when the
/// registry is still full.
fn admit(state: &AppState, id: &str, session: Arc<HttpSession>) -> bool {
    let idle_timeout = state.config.session_idle_timeout;
    let mut sessions = lock(&state.http_sessions);

    let before = sessions.len();
    sessions.retain(|_, s| s.idle_for() < idle_timeout);
    if sessions.len() < before {
        debug!(evicted = before - sessions.len(), "dropped idle HTTP sessions");
    }

    if sessions.len() >= state.config.max_sessions {
        return false;
    }
    sessions.insert(id.to_string(), session);
    true
}

/// Look up a session, dropping it if it has been idle too long.
fn live_session(state: &AppState, id: &str) -> Option<Arc<HttpSession>> {
    let mut sessions = lock(&state.http_sessions);
    let expired = sessions
        .get(id)
        .is_some_and(|s| s.idle_for() >= state.config.session_idle_timeout);
    if expired {
        sessions.remove(id);
        info!(session_id = %id, "HTTP session expired");
        return None;
    }
    sessions.get(id).cloned()
}

async fn streamable_delete(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if state.config.stateless {
        return StatusCode::METHOD_NOT_ALLOWED;
    }
    let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
        return StatusCode::BAD_REQUEST;
    };

    let removed = lock(&state.http_sessions).remove(id);
    match removed {
        Some(_) => {
            info!(session_id = %id, "HTTP session closed");
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

fn reply(resp: Option<JsonRpcResponse>, session_id: Option<&str>) -> Response {
    let mut response = match resp {
        Some(resp) => Json(resp).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Some(id) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, id);
    }
    response
}
