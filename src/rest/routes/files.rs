//! §6.1 Session-Scoped File Store REST routes.

use crate::auth::Principal;
use crate::errors::{HubError, HubResult};
use crate::session_service::model::Role;
use crate::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn envelope<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

async fn require_viewer(state: &AppState, principal: &Principal, session_id: &str) -> HubResult<()> {
    let decision = state.sessions.authorize(principal, session_id, Role::Viewer).await;
    if decision.allow {
        Ok(())
    } else {
        Err(HubError::Forbidden("not a participant of this session".into()))
    }
}

async fn require_editor(state: &AppState, principal: &Principal, session_id: &str) -> HubResult<()> {
    let decision = state.sessions.authorize(principal, session_id, Role::Editor).await;
    if decision.allow {
        Ok(())
    } else {
        Err(HubError::Forbidden("editor role required".into()))
    }
}

pub async fn list_session_files(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    require_viewer(&state, &principal, &session_id).await?;
    let files = state.files.list_session_files(&session_id).await?;
    Ok(envelope(files))
}

pub async fn get_hierarchy(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    require_viewer(&state, &principal, &session_id).await?;
    let tree = state.files.get_hierarchy(&session_id).await?;
    Ok(envelope(tree))
}

#[derive(Debug, Deserialize)]
pub struct FileContentQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub path: String,
}

pub async fn get_file_content(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<FileContentQuery>,
) -> HubResult<Json<Value>> {
    require_viewer(&state, &principal, &query.session_id).await?;
    let (bytes, record) = state.files.get_file(&query.session_id, &query.path).await?;
    Ok(envelope(json!({
        "record": record,
        "content": String::from_utf8_lossy(&bytes),
    })))
}

pub async fn stats(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    require_viewer(&state, &principal, &session_id).await?;
    let stats = state.files.stats(&session_id).await?;
    Ok(envelope(stats))
}

pub async fn delete_file(
    State(state): State<AppState>,
    principal: Principal,
    Path((session_id, path)): Path<(String, String)>,
) -> HubResult<Json<Value>> {
    require_editor(&state, &principal, &session_id).await?;
    let deleted = state.files.delete_file(&session_id, &path).await?;
    state.rooms.purge(&session_id, &path).await;
    Ok(envelope(json!({ "deleted": deleted })))
}

/// `POST /api/files/upload` — a single multipart route for both individual
/// files and `.zip` archives (§4.3), distinguished by the uploaded
/// filename's extension.
pub async fn upload(
    State(state): State<AppState>,
    principal: Principal,
    mut multipart: Multipart,
) -> HubResult<Json<Value>> {
    let mut session_id: Option<String> = None;
    let mut path: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HubError::ValidationError(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "sessionId" => {
                session_id = Some(field.text().await.map_err(|e| HubError::ValidationError(e.to_string()))?);
            }
            "path" => {
                path = Some(field.text().await.map_err(|e| HubError::ValidationError(e.to_string()))?);
            }
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| HubError::ValidationError(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let session_id = session_id.ok_or_else(|| HubError::ValidationError("missing sessionId field".into()))?;
    require_editor(&state, &principal, &session_id).await?;

    let bytes = file_bytes.ok_or_else(|| HubError::ValidationError("missing file field".into()))?;
    if bytes.len() as u64 > state.config.max_file_bytes {
        return Err(HubError::TooLarge);
    }
    let file_name = file_name.ok_or_else(|| HubError::ValidationError("missing filename".into()))?;
    let target_path = path.unwrap_or_else(|| file_name.clone());
    let ext = target_path
        .rfind('.')
        .map(|i| target_path[i..].to_lowercase())
        .unwrap_or_default();

    if state.config.is_archive_ext(&ext) {
        let (_progress, handle) = state.files.ingest_archive(session_id, bytes, principal.user_id.clone());
        let summary = handle
            .await
            .map_err(|e| HubError::Internal(e.into()))??;
        Ok(envelope(summary))
    } else {
        let mime_type = crate::file_store::mime_type_for(&target_path);
        let record = state
            .files
            .put_file(&session_id, &target_path, bytes, mime_type, &principal.user_id)
            .await?;
        Ok(envelope(record))
    }
}
