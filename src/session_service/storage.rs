//! sqlx-backed persistence for sessions and participants.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator_user_id: String,
    pub status: String,
    pub max_participants: i64,
    pub allow_self_invite: bool,
    pub allow_role_requests: bool,
    pub allowed_domains: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRow {
    pub session_id: String,
    pub user_id: String,
    pub email: Option<String>,
    pub role: String,
    pub status: String,
    pub invited_by_user_id: Option<String>,
    pub invited_at: Option<String>,
    pub joined_at: Option<String>,
    pub left_at: Option<String>,
    pub last_active_at: Option<String>,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn new(store_uri: &str) -> Result<Self> {
        if let Some(parent) = Path::new(store_uri).parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{store_uri}?mode=rwc"))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        for sql in [include_str!("migrations/001_sessions.sql")] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn insert_session(
        &self,
        id: &str,
        name: &str,
        description: &str,
        creator_user_id: &str,
        max_participants: i64,
        allow_self_invite: bool,
        allow_role_requests: bool,
        allowed_domains: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, name, description, creator_user_id, status, \
             max_participants, allow_self_invite, allow_role_requests, allowed_domains, \
             created_at, updated_at) VALUES (?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(creator_user_id)
        .bind(max_participants)
        .bind(allow_self_invite)
        .bind(allow_role_requests)
        .bind(allowed_domains)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        Ok(sqlx::query_as("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_session(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
        max_participants: Option<i64>,
        allow_self_invite: Option<bool>,
        allow_role_requests: Option<bool>,
        allowed_domains: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let existing = self
            .get_session(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session not found"))?;
        sqlx::query(
            "UPDATE sessions SET name = ?, description = ?, max_participants = ?, \
             allow_self_invite = ?, allow_role_requests = ?, allowed_domains = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(name.unwrap_or(&existing.name))
        .bind(description.unwrap_or(&existing.description))
        .bind(max_participants.unwrap_or(existing.max_participants))
        .bind(allow_self_invite.unwrap_or(existing.allow_self_invite))
        .bind(allow_role_requests.unwrap_or(existing.allow_role_requests))
        .bind(allowed_domains.unwrap_or(&existing.allowed_domains))
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn soft_delete_session(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sessions SET status = 'deleted', updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_sessions_for_user(&self, user_id: &str) -> Result<Vec<(SessionRow, ParticipantRow)>> {
        let rows = sqlx::query(
            "SELECT s.*, p.session_id as p_session_id, p.user_id as p_user_id, p.email as p_email, \
             p.role as p_role, p.status as p_status, p.invited_by_user_id as p_invited_by_user_id, \
             p.invited_at as p_invited_at, p.joined_at as p_joined_at, p.left_at as p_left_at, \
             p.last_active_at as p_last_active_at \
             FROM sessions s JOIN participants p ON p.session_id = s.id \
             WHERE p.user_id = ? AND p.status IN ('active','invited') AND s.status = 'active' \
             ORDER BY s.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let session = SessionRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                creator_user_id: row.try_get("creator_user_id")?,
                status: row.try_get("status")?,
                max_participants: row.try_get("max_participants")?,
                allow_self_invite: row.try_get("allow_self_invite")?,
                allow_role_requests: row.try_get("allow_role_requests")?,
                allowed_domains: row.try_get("allowed_domains")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            };
            let participant = ParticipantRow {
                session_id: row.try_get("p_session_id")?,
                user_id: row.try_get("p_user_id")?,
                email: row.try_get("p_email")?,
                role: row.try_get("p_role")?,
                status: row.try_get("p_status")?,
                invited_by_user_id: row.try_get("p_invited_by_user_id")?,
                invited_at: row.try_get("p_invited_at")?,
                joined_at: row.try_get("p_joined_at")?,
                left_at: row.try_get("p_left_at")?,
                last_active_at: row.try_get("p_last_active_at")?,
            };
            out.push((session, participant));
        }
        Ok(out)
    }

    // ─── Participants ───────────────────────────────────────────────────────

    pub async fn get_participant(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Option<ParticipantRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM participants WHERE session_id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_participant_by_email(
        &self,
        session_id: &str,
        email: &str,
    ) -> Result<Option<ParticipantRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM participants WHERE session_id = ? AND email = ? COLLATE NOCASE",
        )
        .bind(session_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_participants(&self, session_id: &str) -> Result<Vec<ParticipantRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM participants WHERE session_id = ? ORDER BY invited_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_active(&self, session_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM participants WHERE session_id = ? AND status IN ('active','invited')",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_participant(
        &self,
        session_id: &str,
        user_id: &str,
        email: Option<&str>,
        role: &str,
        status: &str,
        invited_by_user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO participants (session_id, user_id, email, role, status, \
             invited_by_user_id, invited_at) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(session_id, user_id) DO UPDATE SET \
             email = excluded.email, role = excluded.role, status = excluded.status",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(email)
        .bind(role)
        .bind(status)
        .bind(invited_by_user_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_participant_status(
        &self,
        session_id: &str,
        user_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (joined_col, left_col) = match status {
            "active" => (Some("joined_at"), None),
            "left" => (None, Some("left_at")),
            _ => (None, None),
        };
        let mut query = String::from("UPDATE participants SET status = ?");
        if joined_col.is_some() {
            query.push_str(", joined_at = ?");
        }
        if left_col.is_some() {
            query.push_str(", left_at = ?");
        }
        query.push_str(" WHERE session_id = ? AND user_id = ?");

        let mut q = sqlx::query(&query).bind(status);
        if joined_col.is_some() || left_col.is_some() {
            q = q.bind(now.to_rfc3339());
        }
        q.bind(session_id).bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn delete_participant(&self, session_id: &str, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM participants WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_participant_role(&self, session_id: &str, user_id: &str, role: &str) -> Result<()> {
        sqlx::query("UPDATE participants SET role = ? WHERE session_id = ? AND user_id = ?")
            .bind(role)
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically demote the current owner to admin and promote `new_owner`
    /// to owner, inside one transaction (§4.2 ownership-transfer side effect).
    pub async fn transfer_ownership(
        &self,
        session_id: &str,
        current_owner: &str,
        new_owner: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE participants SET role = 'admin' WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(current_owner)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE participants SET role = 'owner' WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(new_owner)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
