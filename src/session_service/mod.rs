//! §4.2 Session & Participant Service — authoritative CRUD over Sessions and
//! Participants, and the single source of truth for authorization.

pub mod model;
pub mod storage;

use crate::auth::Principal;
use crate::errors::{HubError, HubResult};
use chrono::{DateTime, Utc};
use model::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{ParticipantRow, SessionRow, SessionStore};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

const AUTHZ_CACHE_TTL: Duration = Duration::from_secs(30);

/// Published whenever a live authorization decision may have changed, so the
/// Transport layer can force-close affected subscribers (§5).
#[derive(Debug, Clone)]
pub struct AuthzInvalidation {
    pub session_id: String,
    /// `None` means every participant of the session is affected (e.g. the
    /// session itself was deleted).
    pub user_id: Option<String>,
}

struct CachedDecision {
    decision: Decision,
    at: Instant,
}

pub struct SessionService {
    store: SessionStore,
    authz_cache: RwLock<HashMap<(String, String), CachedDecision>>,
    invalidations: broadcast::Sender<AuthzInvalidation>,
}

#[derive(Debug, Default)]
pub struct UpdateSessionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_participants: Option<u32>,
    pub allow_self_invite: Option<bool>,
    pub allow_role_requests: Option<bool>,
    pub allowed_domains: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFilter {
    All,
    Created,
    Shared,
}

impl SessionService {
    pub async fn new(store_uri: &str) -> HubResult<Arc<Self>> {
        let store = SessionStore::new(store_uri)
            .await
            .map_err(HubError::Internal)?;
        let (invalidations, _rx) = broadcast::channel(256);
        Ok(Arc::new(Self {
            store,
            authz_cache: RwLock::new(HashMap::new()),
            invalidations,
        }))
    }

    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<AuthzInvalidation> {
        self.invalidations.subscribe()
    }

    fn invalidate(&self, session_id: &str, user_id: Option<&str>) {
        let _ = self.invalidations.send(AuthzInvalidation {
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
        });
    }

    async fn clear_cache_entry(&self, session_id: &str, user_id: &str) {
        self.authz_cache
            .write()
            .await
            .remove(&(session_id.to_string(), user_id.to_string()));
    }

    // ─── Conversions ─────────────────────────────────────────────────────────

    fn session_from_row(row: &SessionRow) -> HubResult<Session> {
        Ok(Session {
            session_id: row.id.clone(),
            name: row.name.clone(),
            description: row.description.clone(),
            creator_user_id: row.creator_user_id.clone(),
            status: if row.status == "deleted" {
                SessionStatus::Deleted
            } else {
                SessionStatus::Active
            },
            settings: SessionSettings {
                max_participants: row.max_participants as u32,
                allow_self_invite: row.allow_self_invite,
                allow_role_requests: row.allow_role_requests,
                allowed_domains: serde_json::from_str(&row.allowed_domains).unwrap_or_default(),
            },
            created_at: parse_ts(&row.created_at),
            updated_at: parse_ts(&row.updated_at),
        })
    }

    fn participant_from_row(row: &ParticipantRow) -> Participant {
        Participant {
            session_id: row.session_id.clone(),
            user_id: row.user_id.clone(),
            role: Role::parse(&row.role).unwrap_or(Role::Viewer),
            status: ParticipantStatus::parse(&row.status).unwrap_or(ParticipantStatus::Invited),
            invited_by_user_id: row.invited_by_user_id.clone(),
            invited_at: row.invited_at.as_deref().map(parse_ts),
            joined_at: row.joined_at.as_deref().map(parse_ts),
            left_at: row.left_at.as_deref().map(parse_ts),
            last_active_at: row.last_active_at.as_deref().map(parse_ts),
        }
    }

    async fn require_active_participant(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> HubResult<ParticipantRow> {
        self.store
            .get_participant(session_id, user_id)
            .await
            .map_err(HubError::Internal)?
            .filter(|p| p.status == "active")
            .ok_or_else(|| HubError::Forbidden("not an active participant".into()))
    }

    // ─── CreateSession ───────────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        principal: &Principal,
        name: &str,
        description: &str,
        settings: SessionSettings,
    ) -> HubResult<Session> {
        if name.trim().is_empty() {
            return Err(HubError::ValidationError("name must not be empty".into()));
        }
        if settings.max_participants == 0 {
            return Err(HubError::ValidationError(
                "maxParticipants must be >= 1".into(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let allowed_domains = serde_json::to_string(&settings.allowed_domains).unwrap();

        self.store
            .insert_session(
                &id,
                name,
                description,
                &principal.user_id,
                settings.max_participants as i64,
                settings.allow_self_invite,
                settings.allow_role_requests,
                &allowed_domains,
                now,
            )
            .await
            .map_err(HubError::Internal)?;

        self.store
            .upsert_participant(
                &id,
                &principal.user_id,
                Some(&principal.email),
                "owner",
                "active",
                None,
                now,
            )
            .await
            .map_err(HubError::Internal)?;

        info!(session_id = %id, creator = %principal.user_id, "session created");

        let row = self
            .store
            .get_session(&id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::Internal(anyhow::anyhow!("session vanished after insert")))?;
        Self::session_from_row(&row)
    }

    pub async fn list_user_sessions(
        &self,
        principal: &Principal,
        filter: SessionFilter,
    ) -> HubResult<Vec<SessionWithRole>> {
        let rows = self
            .store
            .list_sessions_for_user(&principal.user_id)
            .await
            .map_err(HubError::Internal)?;

        let mut out = Vec::new();
        for (session_row, participant_row) in rows {
            let is_creator = session_row.creator_user_id == principal.user_id;
            let include = match filter {
                SessionFilter::All => true,
                SessionFilter::Created => is_creator,
                SessionFilter::Shared => !is_creator,
            };
            if !include {
                continue;
            }
            let session = Self::session_from_row(&session_row)?;
            out.push(SessionWithRole {
                session,
                role: Role::parse(&participant_row.role).unwrap_or(Role::Viewer),
                participant_status: ParticipantStatus::parse(&participant_row.status)
                    .unwrap_or(ParticipantStatus::Invited),
            });
        }
        Ok(out)
    }

    pub async fn get_session(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> HubResult<(Session, Vec<Participant>)> {
        let row = self
            .store
            .get_session(session_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("session".into()))?;

        self.require_active_participant(session_id, &principal.user_id)
            .await?;

        let participants = self
            .store
            .list_participants(session_id)
            .await
            .map_err(HubError::Internal)?
            .iter()
            .map(Self::participant_from_row)
            .collect();

        Ok((Self::session_from_row(&row)?, participants))
    }

    pub async fn update_session(
        &self,
        principal: &Principal,
        session_id: &str,
        patch: UpdateSessionPatch,
    ) -> HubResult<Session> {
        let participant = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        let role = Role::parse(&participant.role).unwrap_or(Role::Viewer);

        let touches_settings = patch.max_participants.is_some()
            || patch.allow_self_invite.is_some()
            || patch.allow_role_requests.is_some()
            || patch.allowed_domains.is_some();
        if touches_settings && role != Role::Owner {
            return Err(HubError::Forbidden(
                "only the owner may change settings".into(),
            ));
        }
        if !role.at_least(Role::Admin) {
            return Err(HubError::Forbidden(
                "only owner/admin may update the session".into(),
            ));
        }

        let allowed_domains = patch
            .allowed_domains
            .as_ref()
            .map(|d| serde_json::to_string(d).unwrap());

        self.store
            .update_session(
                session_id,
                patch.name.as_deref(),
                patch.description.as_deref(),
                patch.max_participants.map(|v| v as i64),
                patch.allow_self_invite,
                patch.allow_role_requests,
                allowed_domains.as_deref(),
                Utc::now(),
            )
            .await
            .map_err(HubError::Internal)?;

        let row = self
            .store
            .get_session(session_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("session".into()))?;
        Self::session_from_row(&row)
    }

    pub async fn delete_session(&self, principal: &Principal, session_id: &str) -> HubResult<()> {
        let participant = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        if Role::parse(&participant.role) != Some(Role::Owner) {
            return Err(HubError::Forbidden("only the owner may delete".into()));
        }
        self.store
            .soft_delete_session(session_id, Utc::now())
            .await
            .map_err(HubError::Internal)?;
        self.invalidate(session_id, None);
        Ok(())
    }

    // ─── Invitations & membership ────────────────────────────────────────────

    pub async fn invite_participant(
        &self,
        principal: &Principal,
        session_id: &str,
        invitee_email: &str,
        role: Role,
    ) -> HubResult<Participant> {
        let inviter = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        let inviter_role = Role::parse(&inviter.role).unwrap_or(Role::Viewer);
        if !inviter_role.at_least(Role::Admin) {
            return Err(HubError::Forbidden(
                "only owner/admin may invite participants".into(),
            ));
        }
        if role == Role::Owner {
            return Err(HubError::RoleAssignmentForbidden(
                "cannot invite directly as owner".into(),
            ));
        }

        let session_row = self
            .store
            .get_session(session_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("session".into()))?;
        let settings = Self::session_from_row(&session_row)?.settings;

        if !email_domain_allowed(invitee_email, &settings.allowed_domains) {
            return Err(HubError::DomainNotAllowed);
        }

        if let Some(existing) = self
            .store
            .get_participant_by_email(session_id, invitee_email)
            .await
            .map_err(HubError::Internal)?
        {
            if existing.status == "active" || existing.status == "invited" {
                // Idempotent ack: benign no-op, current role unchanged (§4.2).
                return Ok(Self::participant_from_row(&existing));
            }
        }

        let active_count = self
            .store
            .count_active(session_id)
            .await
            .map_err(HubError::Internal)?;
        if active_count as u32 >= settings.max_participants {
            return Err(HubError::CapacityReached);
        }

        // userId is not known until the invitee authenticates; use the email
        // itself as a placeholder userId key until binding occurs (§9).
        let placeholder_user_id = format!("pending:{invitee_email}");
        let now = Utc::now();
        self.store
            .upsert_participant(
                session_id,
                &placeholder_user_id,
                Some(invitee_email),
                role.as_str(),
                "invited",
                Some(&principal.user_id),
                now,
            )
            .await
            .map_err(HubError::Internal)?;

        let row = self
            .store
            .get_participant(session_id, &placeholder_user_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::Internal(anyhow::anyhow!("participant vanished")))?;
        Ok(Self::participant_from_row(&row))
    }

    pub async fn accept_invitation(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> HubResult<Participant> {
        let session_row = self
            .store
            .get_session(session_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("session".into()))?;
        let settings = Self::session_from_row(&session_row)?.settings;

        let existing = self
            .store
            .get_participant(session_id, &principal.user_id)
            .await
            .map_err(HubError::Internal)?
            .or(self
                .store
                .get_participant_by_email(session_id, &principal.email)
                .await
                .map_err(HubError::Internal)?);

        let now = Utc::now();
        match existing {
            Some(row) if row.status == "active" => Ok(Self::participant_from_row(&row)),
            Some(row) if row.status == "invited" => {
                self.store
                    .upsert_participant(
                        session_id,
                        &principal.user_id,
                        Some(&principal.email),
                        &row.role,
                        "active",
                        row.invited_by_user_id.as_deref(),
                        now,
                    )
                    .await
                    .map_err(HubError::Internal)?;
                self.store
                    .set_participant_status(session_id, &principal.user_id, "active", now)
                    .await
                    .map_err(HubError::Internal)?;
                // The invite was keyed by an email placeholder until the
                // invitee authenticated; once bound to the real userId,
                // retire the placeholder row so it stops double-counting
                // against maxParticipants and polluting the roster (§3.3).
                if row.user_id != principal.user_id {
                    self.store
                        .delete_participant(session_id, &row.user_id)
                        .await
                        .map_err(HubError::Internal)?;
                }
                let row = self
                    .store
                    .get_participant(session_id, &principal.user_id)
                    .await
                    .map_err(HubError::Internal)?
                    .unwrap();
                Ok(Self::participant_from_row(&row))
            }
            None if settings.allow_self_invite => {
                if !email_domain_allowed(&principal.email, &settings.allowed_domains) {
                    return Err(HubError::DomainNotAllowed);
                }
                let active_count = self
                    .store
                    .count_active(session_id)
                    .await
                    .map_err(HubError::Internal)?;
                if active_count as u32 >= settings.max_participants {
                    return Err(HubError::CapacityReached);
                }
                self.store
                    .upsert_participant(
                        session_id,
                        &principal.user_id,
                        Some(&principal.email),
                        "viewer",
                        "active",
                        None,
                        now,
                    )
                    .await
                    .map_err(HubError::Internal)?;
                let row = self
                    .store
                    .get_participant(session_id, &principal.user_id)
                    .await
                    .map_err(HubError::Internal)?
                    .unwrap();
                Ok(Self::participant_from_row(&row))
            }
            _ => Err(HubError::Forbidden("not invited".into())),
        }
    }

    pub async fn leave_session(&self, principal: &Principal, session_id: &str) -> HubResult<()> {
        let participant = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        if Role::parse(&participant.role) == Some(Role::Owner) {
            return Err(HubError::OwnerMustTransferFirst);
        }
        self.store
            .set_participant_status(session_id, &principal.user_id, "left", Utc::now())
            .await
            .map_err(HubError::Internal)?;
        self.clear_cache_entry(session_id, &principal.user_id).await;
        self.invalidate(session_id, Some(&principal.user_id));
        Ok(())
    }

    pub async fn transfer_ownership(
        &self,
        principal: &Principal,
        session_id: &str,
        new_owner_user_id: &str,
    ) -> HubResult<()> {
        let participant = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        if Role::parse(&participant.role) != Some(Role::Owner) {
            return Err(HubError::Forbidden("only the owner may transfer".into()));
        }
        let target = self
            .store
            .get_participant(session_id, new_owner_user_id)
            .await
            .map_err(HubError::Internal)?
            .filter(|p| p.status == "active")
            .ok_or_else(|| HubError::ValidationError("target is not a participant".into()))?;
        let _ = target;

        self.store
            .transfer_ownership(session_id, &principal.user_id, new_owner_user_id)
            .await
            .map_err(HubError::Internal)?;

        self.clear_cache_entry(session_id, &principal.user_id).await;
        self.clear_cache_entry(session_id, new_owner_user_id).await;
        info!(session_id, from = %principal.user_id, to = %new_owner_user_id, "ownership transferred");
        Ok(())
    }

    /// Handles both admin/owner-issued role changes and self-service role
    /// requests (§4.2 "Self-invite / role requests") depending on whether
    /// `target_user_id` is the caller.
    pub async fn update_participant_role(
        &self,
        principal: &Principal,
        session_id: &str,
        target_user_id: &str,
        new_role: Role,
    ) -> HubResult<()> {
        let acting = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        let acting_role = Role::parse(&acting.role).unwrap_or(Role::Viewer);

        if target_user_id == principal.user_id {
            let session_row = self
                .store
                .get_session(session_id)
                .await
                .map_err(HubError::Internal)?
                .ok_or_else(|| HubError::NotFound("session".into()))?;
            let settings = Self::session_from_row(&session_row)?.settings;
            if !settings.allow_role_requests {
                return Err(HubError::Forbidden("role requests disabled".into()));
            }
            if !matches!(new_role, Role::Viewer | Role::Editor) {
                return Err(HubError::RoleAssignmentForbidden(
                    "self-service requests are limited to viewer/editor".into(),
                ));
            }
            self.store
                .set_participant_role(session_id, target_user_id, new_role.as_str())
                .await
                .map_err(HubError::Internal)?;
            self.clear_cache_entry(session_id, target_user_id).await;
            return Ok(());
        }

        let target = self
            .store
            .get_participant(session_id, target_user_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("participant".into()))?;
        let target_role = Role::parse(&target.role).unwrap_or(Role::Viewer);

        match acting_role {
            Role::Owner => {
                if new_role == Role::Owner {
                    return Err(HubError::RoleAssignmentForbidden(
                        "use TransferOwnership to grant owner".into(),
                    ));
                }
            }
            Role::Admin => {
                if !matches!(target_role, Role::Editor | Role::Viewer)
                    || !matches!(new_role, Role::Editor | Role::Viewer)
                {
                    return Err(HubError::RoleAssignmentForbidden(
                        "admins may only reassign editor/viewer participants".into(),
                    ));
                }
            }
            _ => return Err(HubError::Forbidden("insufficient role".into())),
        }

        self.store
            .set_participant_role(session_id, target_user_id, new_role.as_str())
            .await
            .map_err(HubError::Internal)?;
        self.clear_cache_entry(session_id, target_user_id).await;
        self.invalidate(session_id, Some(target_user_id));
        Ok(())
    }

    pub async fn remove_participant(
        &self,
        principal: &Principal,
        session_id: &str,
        target_user_id: &str,
    ) -> HubResult<()> {
        let acting = self
            .require_active_participant(session_id, &principal.user_id)
            .await?;
        let acting_role = Role::parse(&acting.role).unwrap_or(Role::Viewer);
        if !acting_role.at_least(Role::Admin) {
            return Err(HubError::Forbidden(
                "only owner/admin may remove participants".into(),
            ));
        }

        let target = self
            .store
            .get_participant(session_id, target_user_id)
            .await
            .map_err(HubError::Internal)?
            .ok_or_else(|| HubError::NotFound("participant".into()))?;
        if Role::parse(&target.role) == Some(Role::Owner) {
            return Err(HubError::Forbidden("cannot remove the owner".into()));
        }
        if acting_role == Role::Admin && Role::parse(&target.role) == Some(Role::Admin) {
            return Err(HubError::Forbidden("admins cannot remove other admins".into()));
        }

        self.store
            .set_participant_status(session_id, target_user_id, "removed", Utc::now())
            .await
            .map_err(HubError::Internal)?;
        self.clear_cache_entry(session_id, target_user_id).await;
        self.invalidate(session_id, Some(target_user_id));
        warn!(session_id, target = %target_user_id, by = %principal.user_id, "participant removed");
        Ok(())
    }

    // ─── Authorization ───────────────────────────────────────────────────────

    pub async fn authorize(
        &self,
        principal: &Principal,
        session_id: &str,
        required: Role,
    ) -> Decision {
        let key = (session_id.to_string(), principal.user_id.clone());
        if let Some(cached) = self.authz_cache.read().await.get(&key) {
            if cached.at.elapsed() < AUTHZ_CACHE_TTL {
                return cached.decision.clone();
            }
        }

        let decision = match self
            .store
            .get_participant(session_id, &principal.user_id)
            .await
        {
            Ok(Some(row)) if row.status == "active" => {
                let role = Role::parse(&row.role).unwrap_or(Role::Viewer);
                Decision {
                    allow: role.at_least(required),
                    effective_role: Some(role),
                }
            }
            _ => Decision {
                allow: false,
                effective_role: None,
            },
        };

        self.authz_cache.write().await.insert(
            key,
            CachedDecision {
                decision: decision.clone(),
                at: Instant::now(),
            },
        );
        decision
    }
}

impl Clone for Decision {
    fn clone(&self) -> Self {
        Decision {
            allow: self.allow,
            effective_role: self.effective_role,
        }
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(user_id: &str, email: &str) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            email: email.to_string(),
            display_name: user_id.to_string(),
        }
    }

    async fn service() -> Arc<SessionService> {
        SessionService::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn creator_becomes_sole_active_owner() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let session = svc
            .create_session(&owner, "demo", "", SessionSettings::default())
            .await
            .unwrap();

        let (_, participants) = svc.get_session(&owner, &session.session_id).await.unwrap();
        let owners: Vec<_> = participants
            .iter()
            .filter(|p| p.role == Role::Owner && p.status == ParticipantStatus::Active)
            .collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].user_id, "u-owner");
    }

    #[tokio::test]
    async fn invite_twice_is_idempotent_ack() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let session = svc
            .create_session(&owner, "demo", "", SessionSettings::default())
            .await
            .unwrap();

        let first = svc
            .invite_participant(&owner, &session.session_id, "bob@example.com", Role::Editor)
            .await
            .unwrap();
        let second = svc
            .invite_participant(&owner, &session.session_id, "bob@example.com", Role::Editor)
            .await
            .unwrap();

        assert_eq!(first.role, Role::Editor);
        assert_eq!(second.role, Role::Editor);
        assert_eq!(first.status, second.status);
    }

    #[tokio::test]
    async fn viewer_cannot_invite() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let mut settings = SessionSettings::default();
        settings.allow_self_invite = true;
        settings.max_participants = 5;
        let session = svc
            .create_session(&owner, "demo", "", settings)
            .await
            .unwrap();

        let viewer = principal("u-viewer", "viewer@example.com");
        svc.accept_invitation(&viewer, &session.session_id).await.unwrap();

        let err = svc
            .invite_participant(&viewer, &session.session_id, "third@example.com", Role::Viewer)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Forbidden(_)));
    }

    #[tokio::test]
    async fn capacity_reached_blocks_further_invites() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let mut settings = SessionSettings::default();
        settings.max_participants = 1;
        let session = svc
            .create_session(&owner, "demo", "", settings)
            .await
            .unwrap();

        let err = svc
            .invite_participant(&owner, &session.session_id, "bob@example.com", Role::Editor)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::CapacityReached));
    }

    #[tokio::test]
    async fn ownership_transfer_demotes_previous_owner() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let mut settings = SessionSettings::default();
        settings.max_participants = 5;
        let session = svc
            .create_session(&owner, "demo", "", settings)
            .await
            .unwrap();

        let bob = principal("u-bob", "bob@example.com");
        svc.invite_participant(&owner, &session.session_id, "bob@example.com", Role::Admin)
            .await
            .unwrap();
        svc.accept_invitation(&bob, &session.session_id).await.unwrap();

        svc.transfer_ownership(&owner, &session.session_id, "u-bob")
            .await
            .unwrap();

        let (_, participants) = svc.get_session(&bob, &session.session_id).await.unwrap();
        let owners: Vec<_> = participants.iter().filter(|p| p.role == Role::Owner).collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].user_id, "u-bob");
        let prev = participants.iter().find(|p| p.user_id == "u-owner").unwrap();
        assert_eq!(prev.role, Role::Admin);
    }

    #[tokio::test]
    async fn admin_cannot_remove_other_admins() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let mut settings = SessionSettings::default();
        settings.max_participants = 5;
        let session = svc
            .create_session(&owner, "demo", "", settings)
            .await
            .unwrap();

        let admin_a = principal("u-admin-a", "admin-a@example.com");
        let admin_b = principal("u-admin-b", "admin-b@example.com");
        svc.invite_participant(&owner, &session.session_id, "admin-a@example.com", Role::Admin)
            .await
            .unwrap();
        svc.accept_invitation(&admin_a, &session.session_id).await.unwrap();
        svc.invite_participant(&owner, &session.session_id, "admin-b@example.com", Role::Admin)
            .await
            .unwrap();
        svc.accept_invitation(&admin_b, &session.session_id).await.unwrap();

        let err = svc
            .remove_participant(&admin_a, &session.session_id, "u-admin-b")
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Forbidden(_)));
    }

    #[tokio::test]
    async fn owner_must_transfer_before_leaving() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let session = svc
            .create_session(&owner, "demo", "", SessionSettings::default())
            .await
            .unwrap();

        let err = svc.leave_session(&owner, &session.session_id).await.unwrap_err();
        assert!(matches!(err, HubError::OwnerMustTransferFirst));
    }

    #[tokio::test]
    async fn authorize_requires_active_participant() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let session = svc
            .create_session(&owner, "demo", "", SessionSettings::default())
            .await
            .unwrap();

        let decision = svc.authorize(&owner, &session.session_id, Role::Viewer).await;
        assert!(decision.allow);

        let stranger = principal("u-stranger", "stranger@example.com");
        let decision = svc.authorize(&stranger, &session.session_id, Role::Viewer).await;
        assert!(!decision.allow);
    }

    #[tokio::test]
    async fn removed_participant_loses_access() {
        let svc = service().await;
        let owner = principal("u-owner", "owner@example.com");
        let mut settings = SessionSettings::default();
        settings.max_participants = 5;
        let session = svc
            .create_session(&owner, "demo", "", settings)
            .await
            .unwrap();

        let bob = principal("u-bob", "bob@example.com");
        svc.invite_participant(&owner, &session.session_id, "bob@example.com", Role::Editor)
            .await
            .unwrap();
        svc.accept_invitation(&bob, &session.session_id).await.unwrap();
        svc.remove_participant(&owner, &session.session_id, "u-bob")
            .await
            .unwrap();

        let decision = svc.authorize(&bob, &session.session_id, Role::Viewer).await;
        assert!(!decision.allow);
    }
}
