//! Google service-account OAuth token provider.
//!
//! Tokens are minted via the JWT bearer flow (RS256-signed assertion
//! exchanged at the OAuth token endpoint) and cached until shortly before
//! expiry, so concurrent pipeline runs share one token per scope.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use documind_core::ResolvedCredentials;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: i64,
}

pub struct GoogleTokenProvider {
    http: reqwest::Client,
    credentials: ResolvedCredentials,
    scope: String,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl GoogleTokenProvider {
    pub fn new(credentials: ResolvedCredentials, scope: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client for token provider")?;
        Ok(Self {
            http,
            credentials,
            scope: scope.into(),
            token_url: TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Override the token endpoint (tests).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn signed_assertion(&self, now: i64) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .context("Service-account private key is not a valid RSA PEM")?;
        let claims = Claims {
            iss: &self.credentials.client_email,
            scope: &self.scope,
            aud: &self.token_url,
            iat: now,
            exp: now + 3600,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("Failed to sign token assertion")
    }

    /// Current access token, minting a fresh one when the cache is empty or
    /// within the expiry margin.
    pub async fn token(&self) -> Result<String> {
        let now = Utc::now().timestamp();

        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(entry.token.clone());
            }
        }

        let assertion = self.signed_assertion(now)?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", &assertion)])
            .send()
            .await
            .context("Token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token endpoint returned {}: {}", status, body);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        tracing::debug!(
            scope = %self.scope,
            expires_in = token.expires_in,
            "Obtained service-account access token"
        );

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }
}
