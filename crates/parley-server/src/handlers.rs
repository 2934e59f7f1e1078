//! HTTP handlers for Parley server.
//!
//! Each route maps onto one engine primitive. Identity registration, login
//! and administration are served by the identity layer in front of Parley.

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics;
use crate::socket;
use anyhow::Result;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parley_core::{Delivery, Engine, Message, PresenceSnapshot, SearchHit, Store, UserProfile};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// The engine holding all shared state.
    pub engine: Engine,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(engine: Engine, config: Config) -> Self {
        Self { engine, config }
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the server fails to
/// start.
pub async fn run_server(config: Config) -> Result<()> {
    let store = Store::open(config.data_dir())
        .await?
        .with_observer(metrics::record_transaction);
    let engine = Engine::new(store, config.engine_config());
    let state = Arc::new(AppState::new(engine, config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    if config.heartbeat.evict_stale {
        spawn_presence_sweeper(Arc::clone(&state));
    }

    let app = router(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!("Data directory: {}", config.data_dir().display());
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(socket::ws_handler))
        .route("/health", get(health_handler))
        .route("/api/online", get(online_handler))
        .route("/api/presence", post(presence_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/messages", post(send_message_handler))
        .route("/api/messages/:conversation_id", get(messages_handler))
        .route("/api/chats", post(create_chat_handler))
        .route("/api/chats/:user", get(chats_handler))
        .route("/api/channels", post(create_channel_handler))
        .route("/api/channels/subscribe", post(subscribe_handler))
        .route("/api/search/:query", get(search_handler))
        .route("/api/users", get(users_handler))
        .with_state(state)
}

/// Periodically mark identities without a live connection offline.
fn spawn_presence_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_millis(state.config.heartbeat.interval_ms.max(1));
    let timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.engine.sweep_presence(timeout).await {
                Ok(evicted) if !evicted.is_empty() => {
                    info!(count = evicted.len(), "Evicted stale identities");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Presence sweep failed");
                    metrics::record_error(e.kind());
                }
            }
        }
    })
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Body naming a single identity.
#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub user: String,
}

/// Body of `POST /api/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "chatId")]
    pub conversation_id: String,
    pub from: String,
    pub text: String,
}

/// Body of `POST /api/chats`.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub user1: String,
    pub user2: String,
}

/// Body of `POST /api/channels`.
#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    /// Display name; defaults to the handle.
    #[serde(default)]
    pub name: Option<String>,
    /// Channel handle.
    pub user: String,
    pub owner: String,
}

/// Body of `POST /api/channels/subscribe`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub channel_user: String,
    pub subscriber: String,
}

async fn online_handler(State(state): State<Arc<AppState>>) -> ApiResult<PresenceSnapshot> {
    let snapshot = state.engine.presence().snapshot().await?;
    metrics::set_online(snapshot.count);
    Ok(Json(snapshot))
}

async fn presence_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentityRequest>,
) -> ApiResult<Value> {
    let joined = state.engine.presence().mark_online(&body.user).await?;
    Ok(Json(json!({ "success": true, "joined": joined })))
}

async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IdentityRequest>,
) -> ApiResult<Value> {
    state.engine.presence().mark_offline(&body.user).await?;
    Ok(Json(json!({ "success": true })))
}

async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(state.engine.log().read(&conversation_id).await?))
}

async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<Value> {
    let start = Instant::now();
    let Delivery { message, report } = state
        .engine
        .send_message(&body.conversation_id, body.from, body.text)
        .await?;
    metrics::record_latency("send_message", start.elapsed().as_secs_f64());
    metrics::record_append();
    metrics::record_fanout(&report);

    debug!(conversation = %message.conversation_id, message = %message.id, "Message sent");
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn chats_handler(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Value> {
    let listing = state.engine.directory().list_for(&user).await?;
    let users = state.engine.directory().users().await?;
    Ok(Json(json!({
        "chats": listing.chats,
        "channels": listing.channels,
        "users": users,
    })))
}

async fn create_chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateChatRequest>,
) -> ApiResult<Value> {
    let chat_id = state
        .engine
        .directory()
        .ensure_chat(&body.user1, &body.user2)
        .await?;
    Ok(Json(json!({ "success": true, "chatId": chat_id })))
}

async fn create_channel_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateChannelRequest>,
) -> ApiResult<Value> {
    let name = body.name.as_deref().unwrap_or(&body.user);
    let channel = state
        .engine
        .directory()
        .create_named_channel(&body.user, name, &body.owner)
        .await?;
    Ok(Json(json!({ "success": true, "channel": channel })))
}

async fn subscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscribeRequest>,
) -> ApiResult<Value> {
    let outcome = state
        .engine
        .directory()
        .subscribe(&body.channel_user, &body.subscriber)
        .await?;
    debug!(channel = %body.channel_user, outcome = ?outcome, "Subscribe request");
    Ok(Json(json!({ "success": true })))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> ApiResult<Vec<SearchHit>> {
    Ok(Json(state.engine.directory().search(&query).await?))
}

async fn users_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<UserProfile>> {
    Ok(Json(state.engine.directory().users().await?))
}
