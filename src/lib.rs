pub mod auth;
pub mod config;
pub mod errors;
pub mod file_store;
pub mod rest;
pub mod rooms;
pub mod security;
pub mod session_service;
pub mod transport;

use auth::AuthGate;
use axum::extract::FromRef;
use config::HubConfig;
use file_store::FileStore;
use rooms::RoomRegistry;
use session_service::SessionService;
use std::sync::Arc;

/// Shared application state threaded through every REST handler and the
/// real-time transport (§4 — the core wires the Auth Gate in front of both
/// surfaces and hands every domain service a single shared instance).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HubConfig>,
    pub auth: Arc<AuthGate>,
    pub sessions: Arc<SessionService>,
    pub files: Arc<FileStore>,
    pub rooms: Arc<RoomRegistry>,
}

impl FromRef<AppState> for Arc<AuthGate> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    pub async fn new(config: Arc<HubConfig>) -> errors::HubResult<Self> {
        let jwks_url = config
            .jwt_jwks_url
            .clone()
            .ok_or_else(|| errors::HubError::ValidationError("JWT_JWKS_URL must be set".into()))?;

        let sessions = SessionService::new(&config.store_uri).await?;
        let files = FileStore::new(
            &config.store_uri,
            config.compression_threshold_bytes,
            config.allowed_ext.clone(),
            config.max_file_bytes,
        )
        .await?;
        let rooms = RoomRegistry::new(
            files.clone(),
            config.room_idle_ttl,
            config.persist_debounce,
            config.persist_max_wait,
        );

        Ok(Self {
            auth: Arc::new(AuthGate::new(jwks_url)),
            sessions,
            files,
            rooms,
            config,
        })
    }

    pub fn transport_state(&self) -> transport::TransportState {
        transport::TransportState {
            auth: self.auth.clone(),
            sessions: self.sessions.clone(),
            rooms: self.rooms.clone(),
            rt_subprotocol: self.config.rt_subprotocol.clone(),
        }
    }
}
