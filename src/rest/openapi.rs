//! §6.6 — a hand-built OpenAPI 3 document describing the REST surface,
//! built once on first request and served unauthenticated so API clients
//! can discover the shape of the service without a token.

use axum::Json;
use serde_json::{json, Value};
use std::sync::OnceLock;

static SPEC: OnceLock<Value> = OnceLock::new();

pub async fn openapi_spec() -> Json<Value> {
    Json(SPEC.get_or_init(build_spec).clone())
}

fn build_spec() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Collaboration Hub API",
            "version": "1.0.0",
            "description": "Session & participant management, session-scoped file storage, and a real-time CRDT document endpoint."
        },
        "paths": {
            "/health": { "get": { "summary": "Liveness probe", "security": [] } },
            "/api/sessions": {
                "get": { "summary": "List sessions visible to the caller" },
                "post": { "summary": "Create a session" }
            },
            "/api/sessions/{sessionId}": {
                "get": { "summary": "Get a session and its participants" },
                "patch": { "summary": "Update session settings" },
                "delete": { "summary": "Delete a session" }
            },
            "/api/sessions/{sessionId}/participants": {
                "post": { "summary": "Invite a participant by email" }
            },
            "/api/sessions/{sessionId}/join": {
                "put": { "summary": "Accept a pending invitation" }
            },
            "/api/sessions/{sessionId}/leave": {
                "delete": { "summary": "Leave a session" }
            },
            "/api/sessions/{sessionId}/transfer-ownership": {
                "put": { "summary": "Transfer session ownership" }
            },
            "/api/sessions/{sessionId}/participants/{userId}": {
                "patch": { "summary": "Change a participant's role" },
                "delete": { "summary": "Remove a participant" }
            },
            "/api/files/session/{sessionId}": {
                "get": { "summary": "List a session's files" }
            },
            "/api/files/hierarchy/{sessionId}": {
                "get": { "summary": "Get the folder/file tree for a session" }
            },
            "/api/files/content": {
                "get": { "summary": "Get a file's content by sessionId and path query parameters" }
            },
            "/api/files/upload": {
                "post": { "summary": "Upload a file or a .zip archive (multipart/form-data)" }
            },
            "/api/files/{sessionId}/{filePathEncoded}": {
                "delete": { "summary": "Delete a file" }
            },
            "/api/files/stats/{sessionId}": {
                "get": { "summary": "Get file count and total byte size for a session" }
            }
        },
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }
            }
        },
        "security": [ { "bearerAuth": [] } ]
    })
}
