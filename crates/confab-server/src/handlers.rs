//! HTTP and WebSocket handlers.
//!
//! Everything lives under the configured API prefix
//! (`/api/conversation/message` by default):
//!
//! - `GET /connect/:chatRoom/:businessPartner` - WebSocket session
//! - `GET /creates/room?businessPartner=&roomPartner=` - create or find a room
//! - `GET /histories/:chatRoom` - room history with read status
//! - `GET /user-profile/:businessPartner` - participant profile

use crate::config::Config;
use crate::db::SqlStore;
use crate::error::ApiError;
use crate::metrics;
use crate::session::Session;
use anyhow::Result;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use confab_core::{
    validate_room_id, ConversationStore, Dispatcher, MemoryStore, MessageStore, ParticipantId,
    RegistryConfig, RoomRegistry,
};
use confab_transport::websocket;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Live room membership.
    pub registry: Arc<RoomRegistry>,
    /// Event dispatch for sessions.
    pub dispatcher: Dispatcher,
    /// Reads behind the HTTP endpoints.
    pub store: Arc<dyn ConversationStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over the given stores.
    #[must_use]
    pub fn new(
        config: Config,
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(RegistryConfig {
            outbound_capacity: config.limits.outbound_capacity,
        }));

        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry), messages),
            registry,
            store: conversations,
            config,
        }
    }

    /// Create app state backed by a single in-memory store.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store)
    }
}

/// Build the application router.
pub fn build_app(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/connect/:chat_room/:business_partner", get(connect_handler))
        .route("/creates/room", get(create_room_handler))
        .route("/histories/:chat_room", get(history_handler))
        .route("/user-profile/:business_partner", get(profile_handler));

    Router::new()
        .nest(&state.config.transport.websocket_path, api)
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the store or the listener cannot be set up.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let state = match config.database.url {
        Some(_) => {
            let store = Arc::new(SqlStore::connect(&config.database).await?);
            if config.database.run_migrations {
                store.migrate().await?;
            }
            AppState::new(config.clone(), store.clone(), store)
        }
        None => {
            warn!("No database URL configured; messages are kept in memory only");
            AppState::in_memory(config.clone())
        }
    };

    let app = build_app(Arc::new(state));

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Confab server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}/connect/:chatRoom/:businessPartner",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.registry.stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": stats.room_count,
        "members": stats.member_count
    }))
}

/// WebSocket upgrade handler.
///
/// Identifiers are validated before the upgrade; an invalid request never
/// touches the registry.
async fn connect_handler(
    ws: WebSocketUpgrade,
    Path((chat_room, business_partner)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let session = Session::connect(&chat_room, &business_partner, state.dispatcher.clone())
        .map_err(|e| {
            debug!(error = %e, "Rejected connection");
            ApiError::BadRequest(e.to_string())
        })?
        .with_idle_timeout(state.config.heartbeat.idle_timeout());

    debug!(room = session.room(), participant = session.participant(), "Upgrading connection");

    Ok(ws
        .max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| async move {
            let (source, sink) = websocket::split(socket);
            session.run(source, sink).await;
        }))
}

#[derive(Debug, Deserialize)]
struct CreateRoomParams {
    #[serde(rename = "businessPartner")]
    business_partner: Option<String>,
    #[serde(rename = "roomPartner")]
    room_partner: Option<String>,
}

fn participant_param(name: &str, value: Option<&str>) -> Result<ParticipantId, ApiError> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))?;
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name} `{value}`")))
}

/// Create or find the room shared by two participants.
async fn create_room_handler(
    Query(params): Query<CreateRoomParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let creator = participant_param("businessPartner", params.business_partner.as_deref())?;
    let partner = participant_param("roomPartner", params.room_partner.as_deref())?;

    let room = state.store.create_or_find_room(creator, partner).await?;
    let docs = state.store.fetch_partner_docs(&[creator, partner]).await?;

    Ok(Json(json!({
        "ChatRoom": room,
        "BusinessPartnerDocImages": docs,
    })))
}

/// A room's conversation history.
async fn history_handler(
    Path(chat_room): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_room_id(&chat_room).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let history = state.store.fetch_history(&chat_room).await?;
    Ok(Json(json!({ "ConversationHistories": history })))
}

/// A participant's profile.
async fn profile_handler(
    Path(business_partner): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let participant = participant_param("businessPartner", Some(&business_partner))?;
    let profile = state.store.fetch_profile(participant).await?;
    Ok(Json(json!({ "UserProfile": profile })))
}
