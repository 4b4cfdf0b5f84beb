//! OAuth access tokens for the warehouse API.
//!
//! Supports Google service-account keys (signed JWT assertion), authorized
//! user credentials (refresh-token grant), and static pre-minted tokens.

use std::error::Error;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CredentialSource;

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug)]
pub enum AuthError {
    ReadCredentials(String),
    InvalidCredentials(String),
    Sign(String),
    Exchange(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadCredentials(message) => write!(f, "failed to read credentials: {message}"),
            Self::InvalidCredentials(message) => write!(f, "invalid credentials: {message}"),
            Self::Sign(message) => write!(f, "failed to sign token assertion: {message}"),
            Self::Exchange(message) => write!(f, "token exchange failed: {message}"),
        }
    }
}

impl Error for AuthError {}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Clone, Deserialize)]
pub struct AuthorizedUserKey {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Parsed credential material.
#[derive(Clone)]
pub enum Credentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
    Static(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount(key) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .finish_non_exhaustive(),
            Self::AuthorizedUser(key) => f
                .debug_struct("AuthorizedUser")
                .field("client_id", &key.client_id)
                .finish_non_exhaustive(),
            Self::Static(_) => f.write_str("Static(<redacted>)"),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

impl Credentials {
    /// Loads a Google credentials JSON file.
    ///
    /// # Errors
    /// Returns `AuthError` if the file is unreadable or not a supported
    /// credential type.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| AuthError::ReadCredentials(format!("{}: {err}", path.display())))?;
        Self::from_json(&text)
    }

    /// Parses Google credentials JSON text.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCredentials` for unsupported or malformed
    /// documents.
    pub fn from_json(text: &str) -> Result<Self, AuthError> {
        let parsed: CredentialsFile = serde_json::from_str(text)
            .map_err(|err| AuthError::InvalidCredentials(err.to_string()))?;
        Ok(match parsed {
            CredentialsFile::ServiceAccount(key) => Self::ServiceAccount(key),
            CredentialsFile::AuthorizedUser(key) => Self::AuthorizedUser(key),
        })
    }

    /// Resolves credentials for a configured source.
    ///
    /// # Errors
    /// Returns `AuthError` if a credentials file cannot be loaded.
    pub fn from_source(source: &CredentialSource) -> Result<Self, AuthError> {
        match source {
            CredentialSource::File(path) => Self::from_file(path),
            CredentialSource::AccessToken(token) => Ok(Self::Static(token.clone())),
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Mints and caches bearer tokens for warehouse requests.
pub struct TokenProvider {
    http: reqwest::Client,
    credentials: Credentials,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            cached: RwLock::new(None),
        }
    }

    /// Returns a bearer token, minting a new one when the cache is stale.
    ///
    /// # Errors
    /// Returns `AuthError` if signing or the token exchange fails.
    pub async fn token(&self) -> Result<String, AuthError> {
        if let Credentials::Static(token) = &self.credentials {
            return Ok(token.clone());
        }

        let now = Utc::now();
        if let Some(cached) = self.cached.read().await.as_ref()
            && cached.is_fresh(now)
        {
            return Ok(cached.value.clone());
        }

        let mut slot = self.cached.write().await;
        if let Some(cached) = slot.as_ref()
            && cached.is_fresh(now)
        {
            return Ok(cached.value.clone());
        }

        let minted = self.mint(now).await?;
        let value = minted.value.clone();
        *slot = Some(minted);
        Ok(value)
    }

    async fn mint(&self, now: DateTime<Utc>) -> Result<CachedToken, AuthError> {
        let (token_uri, form) = match &self.credentials {
            Credentials::ServiceAccount(key) => {
                let assertion = sign_assertion(key, now)?;
                debug!(client_email = %key.client_email, "exchanging service account assertion");
                (
                    key.token_uri.as_str(),
                    vec![
                        ("grant_type", JWT_BEARER_GRANT.to_string()),
                        ("assertion", assertion),
                    ],
                )
            }
            Credentials::AuthorizedUser(key) => {
                debug!(client_id = %key.client_id, "refreshing authorized user token");
                (
                    key.token_uri.as_str(),
                    vec![
                        ("grant_type", "refresh_token".to_string()),
                        ("client_id", key.client_id.clone()),
                        ("client_secret", key.client_secret.clone()),
                        ("refresh_token", key.refresh_token.clone()),
                    ],
                )
            }
            Credentials::Static(token) => {
                return Ok(CachedToken {
                    value: token.clone(),
                    expires_at: DateTime::<Utc>::MAX_UTC,
                });
            }
        };

        let response = self
            .http
            .post(token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|err| AuthError::Exchange(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange(format!("{status}: {body}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| AuthError::Exchange(err.to_string()))?;

        Ok(CachedToken {
            value: token.access_token,
            expires_at: token_expiry(now, token.expires_in),
        })
    }
}

/// Expiry for a freshly minted token. Missing or unrepresentable lifetimes
/// fall back to the assertion lifetime.
fn token_expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let fallback = now + TimeDelta::seconds(ASSERTION_LIFETIME_SECS);
    expires_in
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(fallback)
}

fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, AuthError> {
    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: BIGQUERY_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid.clone_from(&key.private_key_id);
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|err| AuthError::InvalidCredentials(err.to_string()))?;
    jsonwebtoken::encode(&header, &claims, &encoding_key).map_err(|err| AuthError::Sign(err.to_string()))
}
