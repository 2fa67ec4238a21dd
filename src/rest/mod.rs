//! §6.1 REST API surface, §6.6 hand-built OpenAPI document, and the
//! unauthenticated health check: one `Router::with_state` wiring every
//! route to a shared application context.

pub mod openapi;
pub mod routes;

use crate::AppState;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let rt_router = Router::new()
        .route("/rt/{sessionId}/{filePathEncoded}", get(crate::transport::upgrade))
        .with_state(state.transport_state());

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/openapi.json", get(openapi::openapi_spec))
        .route(
            "/api/sessions",
            get(routes::sessions::list_sessions).post(routes::sessions::create_session),
        )
        .route(
            "/api/sessions/{sessionId}",
            get(routes::sessions::get_session)
                .patch(routes::sessions::update_session)
                .delete(routes::sessions::delete_session),
        )
        .route(
            "/api/sessions/{sessionId}/participants",
            post(routes::sessions::invite_participant),
        )
        .route("/api/sessions/{sessionId}/join", put(routes::sessions::join_session))
        .route(
            "/api/sessions/{sessionId}/leave",
            delete(routes::sessions::leave_session),
        )
        .route(
            "/api/sessions/{sessionId}/transfer-ownership",
            put(routes::sessions::transfer_ownership),
        )
        .route(
            "/api/sessions/{sessionId}/participants/{userId}",
            patch(routes::sessions::update_participant_role).delete(routes::sessions::remove_participant),
        )
        .route("/api/files/session/{sessionId}", get(routes::files::list_session_files))
        .route("/api/files/hierarchy/{sessionId}", get(routes::files::get_hierarchy))
        .route("/api/files/content", get(routes::files::get_file_content))
        .route("/api/files/upload", post(routes::files::upload))
        .route(
            "/api/files/{sessionId}/{filePathEncoded}",
            delete(routes::files::delete_file),
        )
        .route("/api/files/stats/{sessionId}", get(routes::files::stats))
        .with_state(state)
        .merge(rt_router)
        .layer(TraceLayer::new_for_http())
}
