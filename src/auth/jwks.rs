//! JWKS fetch, cache, and JWT verification (§4.1a).

use anyhow::{anyhow, bail, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
    #[serde(default)]
    alg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

struct CachedKey {
    key: DecodingKey,
    algorithm: Algorithm,
}

/// Fetches and caches an identity provider's JSON Web Key Set, refreshing
/// on a `kid` cache-miss at most once per miss so a malformed token cannot
/// trigger a retry storm against the IdP (§4.1a).
pub struct JwksClient {
    jwks_url: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, CachedKey>>,
}

impl JwksClient {
    pub fn new(jwks_url: String) -> Self {
        Self {
            jwks_url,
            http: reqwest::Client::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or_else(|| anyhow!("token missing kid"))?;

        if !self.cache.read().await.contains_key(&kid) {
            self.refresh().await?;
        }

        let cache = self.cache.read().await;
        let cached = cache
            .get(&kid)
            .ok_or_else(|| anyhow!("unknown signing key: {kid}"))?;

        let mut validation = Validation::new(cached.algorithm);
        validation.leeway = crate::auth::CLOCK_SKEW_SECS;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let data = decode::<T>(token, &cached.key, &validation)?;
        Ok(data.claims)
    }

    async fn refresh(&self) -> Result<()> {
        let doc: JwksDocument = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut fresh = HashMap::new();
        for jwk in doc.keys {
            if let Some(cached) = Self::decode_key(&jwk)? {
                fresh.insert(jwk.kid.clone(), cached);
            }
        }
        if fresh.is_empty() {
            bail!("JWKS document contained no usable keys");
        }
        *self.cache.write().await = fresh;
        Ok(())
    }

    fn decode_key(jwk: &Jwk) -> Result<Option<CachedKey>> {
        match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or_else(|| anyhow!("RSA jwk missing n"))?;
                let e = jwk.e.as_deref().ok_or_else(|| anyhow!("RSA jwk missing e"))?;
                let algorithm = match jwk.alg.as_deref() {
                    Some("RS384") => Algorithm::RS384,
                    Some("RS512") => Algorithm::RS512,
                    _ => Algorithm::RS256,
                };
                Ok(Some(CachedKey {
                    key: DecodingKey::from_rsa_components(n, e)?,
                    algorithm,
                }))
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or_else(|| anyhow!("EC jwk missing x"))?;
                let y = jwk.y.as_deref().ok_or_else(|| anyhow!("EC jwk missing y"))?;
                let algorithm = match jwk.crv.as_deref() {
                    Some("P-384") => Algorithm::ES384,
                    _ => Algorithm::ES256,
                };
                Ok(Some(CachedKey {
                    key: DecodingKey::from_ec_components(x, y)?,
                    algorithm,
                }))
            }
            _ => Ok(None),
        }
    }
}
