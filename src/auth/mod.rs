//! §4.1 Auth Gate — verifies presented credentials against the identity
//! provider's JWKS and produces a [`Principal`]. Does not issue credentials.

mod jwks;

use crate::errors::{HubError, HubResult};
use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use jwks::JwksClient;

const DEFAULT_SESSION_COOKIE_NAME: &str = "collabhub_session";
/// Clock skew tolerance on `exp`/`nbf` (§4.1).
pub const CLOCK_SKEW_SECS: u64 = 60;

/// An authenticated user identity as seen by the core (§3.1). Produced by
/// the Auth Gate; never mutated downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone)]
pub struct AuthGate {
    jwks: Arc<JwksClient>,
    session_cookie_name: String,
}

impl AuthGate {
    pub fn new(jwks_url: String) -> Self {
        Self {
            jwks: Arc::new(JwksClient::new(jwks_url)),
            session_cookie_name: DEFAULT_SESSION_COOKIE_NAME.to_string(),
        }
    }

    fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
        if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
            if let Ok(s) = value.to_str() {
                if let Some(token) = s.strip_prefix("Bearer ") {
                    return Some(token.to_string());
                }
            }
        }
        let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((name, value)) = part.split_once('=') {
                if name == cookie_name {
                    return Some(value.to_string());
                }
            }
        }
        None
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> HubResult<Principal> {
        let token = Self::extract_token(headers, &self.session_cookie_name)
            .ok_or(HubError::Unauthenticated)?;
        self.authenticate_token(&token).await
    }

    pub async fn authenticate_token(&self, token: &str) -> HubResult<Principal> {
        let claims: Claims = self
            .jwks
            .verify(token)
            .await
            .map_err(|_| HubError::Unauthenticated)?;

        let email = claims.email.clone().unwrap_or_default();
        let display_name = claims
            .preferred_username
            .clone()
            .or(claims.name.clone())
            .unwrap_or_else(|| email.clone());

        Ok(Principal {
            user_id: claims.sub,
            email,
            display_name,
        })
    }
}

/// Axum extractor so route handlers can take `Principal` directly as an
/// argument. Requires [`AuthGate`] to be reachable via `State`.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    Arc<AuthGate>: axum::extract::FromRef<S>,
{
    type Rejection = HubError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<AuthGate>::from_ref(state);
        gate.authenticate(&parts.headers).await
    }
}

/// Middleware form of the gate, used in front of routes that need the
/// principal in request extensions rather than as an extractor argument
/// (e.g. the WebSocket upgrade handler, per §4.7 step 2).
pub async fn require_principal(
    State(gate): State<Arc<AuthGate>>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<Response, HubError> {
    let principal = gate.authenticate(req.headers()).await?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(
            AuthGate::extract_token(&headers, DEFAULT_SESSION_COOKIE_NAME),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn extracts_session_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("foo=bar; collabhub_session=xyz; baz=qux"),
        );
        assert_eq!(
            AuthGate::extract_token(&headers, DEFAULT_SESSION_COOKIE_NAME),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn no_credentials_present() {
        let headers = HeaderMap::new();
        assert_eq!(
            AuthGate::extract_token(&headers, DEFAULT_SESSION_COOKIE_NAME),
            None
        );
    }
}
