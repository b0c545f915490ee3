//! Google service-account authentication.
//!
//! Mints an RS256-signed JWT from the service-account key and exchanges it at
//! the OAuth2 token endpoint for a bearer token. The token is cached and
//! reused until a minute before it expires, so a long run over many files
//! only authenticates about once an hour.

use crate::credentials::ServiceAccountKey;
use crate::error::OcrError;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Scope accepted by both Vision and Document AI.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

/// Bearer-token source for one service account.
#[derive(Clone)]
pub struct GoogleAuth {
    key: ServiceAccountKey,
    scope: String,
    encoding_key: jsonwebtoken::EncodingKey,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl std::fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAuth")
            .field("client_email", &self.key.client_email)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl GoogleAuth {
    /// Parse the private key up front so a bad key fails at startup.
    pub fn new(key: ServiceAccountKey, scope: impl Into<String>) -> Result<Self, OcrError> {
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| OcrError::InvalidCredentials {
                path: "service account".into(),
                detail: format!("invalid RSA private key: {e}"),
            })?;
        Ok(Self {
            key,
            scope: scope.into(),
            encoding_key,
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// A valid access token, refreshing if expired.
    pub async fn access_token(
        &self,
        client: &reqwest::Client,
        provider: &str,
        timeout: Duration,
    ) -> Result<String, OcrError> {
        if let Some(token) = self.cached(now_secs()) {
            return Ok(token);
        }

        let now = now_secs();
        let jwt = self.signed_assertion(now)?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let request = client.post(self.token_uri()).form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ]);
        let body = super::http::send_json(provider, timeout, request)
            .await
            .map_err(|e| match e {
                OcrError::Http { status, body, .. } => OcrError::Auth {
                    provider: provider.to_string(),
                    detail: format!("token exchange returned HTTP {status}: {body}"),
                },
                other => other,
            })?;
        let resp: TokenResponse =
            serde_json::from_value(body).map_err(|e| OcrError::Auth {
                provider: provider.to_string(),
                detail: format!("unexpected token response: {e}"),
            })?;

        info!(
            "Obtained Google access token for {} (expires in {}s)",
            self.key.client_email, resp.expires_in
        );
        let token = resp.access_token.clone();
        *self.lock() = Some(CachedToken {
            access_token: resp.access_token,
            expires_at: now + resp.expires_in,
        });
        Ok(token)
    }

    fn cached(&self, now: u64) -> Option<String> {
        let cache = self.lock();
        cache
            .as_ref()
            .filter(|c| now < c.expires_at.saturating_sub(60))
            .map(|c| {
                debug!("Reusing cached Google access token");
                c.access_token.clone()
            })
    }

    fn signed_assertion(&self, now: u64) -> Result<String, OcrError> {
        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": self.scope,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| OcrError::Internal(format!("failed to sign JWT: {e}")))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CachedToken>> {
        self.token_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
