//! Data model for §3.2 Session and §3.3 Participant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    /// Whether `self` satisfies a requirement of at least `required`
    /// (owner > admin > editor > viewer).
    pub fn at_least(&self, required: Role) -> bool {
        *self >= required
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Invited,
    Active,
    Left,
    Removed,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Invited => "invited",
            ParticipantStatus::Active => "active",
            ParticipantStatus::Left => "left",
            ParticipantStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invited" => Some(ParticipantStatus::Invited),
            "active" => Some(ParticipantStatus::Active),
            "left" => Some(ParticipantStatus::Left),
            "removed" => Some(ParticipantStatus::Removed),
            _ => None,
        }
    }

    /// The permitted status-transition graph (§3.3): `invited -> {active,
    /// removed}`, `active -> {left, removed}`, `left -> active`; `removed`
    /// and `left` may never become `invited`.
    pub fn can_transition_to(&self, next: ParticipantStatus) -> bool {
        use ParticipantStatus::*;
        matches!(
            (*self, next),
            (Invited, Active) | (Invited, Removed) | (Active, Left) | (Active, Removed) | (Left, Active)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub max_participants: u32,
    pub allow_self_invite: bool,
    pub allow_role_requests: bool,
    pub allowed_domains: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_participants: 10,
            allow_self_invite: false,
            allow_role_requests: false,
            allowed_domains: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub name: String,
    pub description: String,
    pub creator_user_id: String,
    pub status: SessionStatus,
    pub settings: SessionSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub status: ParticipantStatus,
    pub invited_by_user_id: Option<String>,
    pub invited_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
}

/// A session together with the viewing principal's own membership row,
/// as returned by `ListUserSessions`/`GetSession`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWithRole {
    #[serde(flatten)]
    pub session: Session,
    pub role: Role,
    pub participant_status: ParticipantStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allow: bool,
    pub effective_role: Option<Role>,
}

/// Validate `email`'s domain against a basic `*.*` shape and, if
/// `allowed_domains` is non-empty, membership in that list.
pub fn email_domain_allowed(email: &str, allowed_domains: &[String]) -> bool {
    let Some((_, domain)) = email.split_once('@') else {
        return false;
    };
    if !domain.contains('.') {
        return false;
    }
    allowed_domains.is_empty() || allowed_domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering() {
        assert!(Role::Owner.at_least(Role::Admin));
        assert!(Role::Admin.at_least(Role::Viewer));
        assert!(!Role::Viewer.at_least(Role::Editor));
    }

    #[test]
    fn status_transitions() {
        assert!(ParticipantStatus::Invited.can_transition_to(ParticipantStatus::Active));
        assert!(ParticipantStatus::Active.can_transition_to(ParticipantStatus::Left));
        assert!(ParticipantStatus::Left.can_transition_to(ParticipantStatus::Active));
        assert!(!ParticipantStatus::Removed.can_transition_to(ParticipantStatus::Invited));
        assert!(!ParticipantStatus::Left.can_transition_to(ParticipantStatus::Invited));
        assert!(!ParticipantStatus::Active.can_transition_to(ParticipantStatus::Invited));
    }

    #[test]
    fn domain_validation() {
        assert!(email_domain_allowed("a@example.com", &[]));
        assert!(email_domain_allowed(
            "a@example.com",
            &["example.com".to_string()]
        ));
        assert!(!email_domain_allowed(
            "a@other.com",
            &["example.com".to_string()]
        ));
        assert!(!email_domain_allowed("not-an-email", &[]));
    }
}
