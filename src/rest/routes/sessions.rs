//! §6.1 Session & Participant REST routes.

use crate::auth::Principal;
use crate::errors::HubResult;
use crate::session_service::model::{Role, SessionSettings};
use crate::session_service::{SessionFilter, UpdateSessionPatch};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn envelope<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: Option<SessionSettingsRequest>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettingsRequest {
    pub max_participants: Option<u32>,
    pub allow_self_invite: Option<bool>,
    pub allow_role_requests: Option<bool>,
    pub allowed_domains: Option<Vec<String>>,
}

impl From<Option<SessionSettingsRequest>> for SessionSettings {
    fn from(req: Option<SessionSettingsRequest>) -> Self {
        let defaults = SessionSettings::default();
        match req {
            None => defaults,
            Some(req) => SessionSettings {
                max_participants: req.max_participants.unwrap_or(defaults.max_participants),
                allow_self_invite: req.allow_self_invite.unwrap_or(defaults.allow_self_invite),
                allow_role_requests: req.allow_role_requests.unwrap_or(defaults.allow_role_requests),
                allowed_domains: req.allowed_domains.unwrap_or(defaults.allowed_domains),
            },
        }
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateSessionRequest>,
) -> HubResult<Json<Value>> {
    let session = state
        .sessions
        .create_session(&principal, &body.name, &body.description, body.settings.into())
        .await?;
    Ok(envelope(session))
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub filter: Option<String>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListSessionsQuery>,
) -> HubResult<Json<Value>> {
    let filter = match query.filter.as_deref() {
        Some("created") => SessionFilter::Created,
        Some("shared") => SessionFilter::Shared,
        _ => SessionFilter::All,
    };
    let sessions = state.sessions.list_user_sessions(&principal, filter).await?;
    Ok(envelope(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    let (session, participants) = state.sessions.get_session(&principal, &session_id).await?;
    Ok(envelope(json!({ "session": session, "participants": participants })))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_participants: Option<u32>,
    pub allow_self_invite: Option<bool>,
    pub allow_role_requests: Option<bool>,
    pub allowed_domains: Option<Vec<String>>,
}

impl From<UpdateSessionRequest> for UpdateSessionPatch {
    fn from(req: UpdateSessionRequest) -> Self {
        UpdateSessionPatch {
            name: req.name,
            description: req.description,
            max_participants: req.max_participants,
            allow_self_invite: req.allow_self_invite,
            allow_role_requests: req.allow_role_requests,
            allowed_domains: req.allowed_domains,
        }
    }
}

pub async fn update_session(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
    Json(body): Json<UpdateSessionRequest>,
) -> HubResult<Json<Value>> {
    let session = state.sessions.update_session(&principal, &session_id, body.into()).await?;
    Ok(envelope(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    state.sessions.delete_session(&principal, &session_id).await?;
    state.files.delete_session_files(&session_id).await?;
    Ok(envelope(json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct InviteParticipantRequest {
    pub email: String,
    #[serde(default = "default_invite_role")]
    pub role: Role,
}

fn default_invite_role() -> Role {
    Role::Viewer
}

pub async fn invite_participant(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
    Json(body): Json<InviteParticipantRequest>,
) -> HubResult<Json<Value>> {
    let participant = state
        .sessions
        .invite_participant(&principal, &session_id, &body.email, body.role)
        .await?;
    Ok(envelope(participant))
}

pub async fn join_session(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    let participant = state.sessions.accept_invitation(&principal, &session_id).await?;
    Ok(envelope(participant))
}

pub async fn leave_session(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> HubResult<Json<Value>> {
    state.sessions.leave_session(&principal, &session_id).await?;
    Ok(envelope(json!({ "left": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnershipRequest {
    pub new_owner_user_id: String,
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
    Json(body): Json<TransferOwnershipRequest>,
) -> HubResult<Json<Value>> {
    state
        .sessions
        .transfer_ownership(&principal, &session_id, &body.new_owner_user_id)
        .await?;
    Ok(envelope(json!({ "transferred": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateParticipantRoleRequest {
    pub role: Role,
}

pub async fn update_participant_role(
    State(state): State<AppState>,
    principal: Principal,
    Path((session_id, target_user_id)): Path<(String, String)>,
    Json(body): Json<UpdateParticipantRoleRequest>,
) -> HubResult<Json<Value>> {
    state
        .sessions
        .update_participant_role(&principal, &session_id, &target_user_id, body.role)
        .await?;
    Ok(envelope(json!({ "updated": true })))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    principal: Principal,
    Path((session_id, target_user_id)): Path<(String, String)>,
) -> HubResult<Json<Value>> {
    state.sessions.remove_participant(&principal, &session_id, &target_user_id).await?;
    Ok(envelope(json!({ "removed": true })))
}
