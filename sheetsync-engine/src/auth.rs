//! Service-account credentials: RS256 JWT assertion exchanged for an access
//! token at the key's `token_uri`, cached until shortly before it expires.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{io_err, SyncError};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// A cached token this close to expiry is refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

const OP_TOKEN: &str = "oauth2.token";

/// The fields of a Google service-account JSON key that the exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            SyncError::Credentials(format!("invalid service-account key {}: {e}", path.display()))
        })
    }
}

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
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expiry_timestamp: i64,
}

impl CachedToken {
    fn expires_within(&self, now: i64, seconds: i64) -> bool {
        self.expiry_timestamp <= now.saturating_add(seconds)
    }
}

/// Mints and caches access tokens for one service account.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth").field("key", &self.key).finish_non_exhaustive()
    }
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey) -> Result<Self, SyncError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SyncError::Credentials(format!("service-account private key: {e}")))?;
        Ok(Self {
            key,
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        Self::new(ServiceAccountKey::load(path)?)
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Signed JWT asserting the service account's identity, valid for an hour from `now`.
    pub fn assertion(&self, now: i64) -> Result<String, SyncError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| SyncError::Credentials(format!("could not sign assertion: {e}")))
    }

    /// Cached token, or a fresh one when none is held or it is about to expire.
    pub async fn token(&self, http: &reqwest::Client) -> Result<String, SyncError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if !token.expires_within(now, REFRESH_MARGIN_SECS) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.exchange(http, now).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    async fn exchange(&self, http: &reqwest::Client, now: i64) -> Result<CachedToken, SyncError> {
        let assertion = self.assertion(now)?;
        let response = http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|source| SyncError::Transport {
                operation: OP_TOKEN,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                operation: OP_TOKEN,
                message,
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| SyncError::Decode {
            operation: OP_TOKEN,
            message: e.to_string(),
        })?;
        if body.access_token.trim().is_empty() {
            return Err(SyncError::Credentials("token endpoint returned an empty access token".to_string()));
        }

        tracing::info!(
            client_email = %self.key.client_email,
            expires_in = body.expires_in,
            "minted service-account access token"
        );
        Ok(CachedToken {
            access_token: body.access_token,
            expiry_timestamp: now.saturating_add(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/service_account_key.pem");
    const PUBLIC_KEY: &str = include_str!("../tests/fixtures/service_account_pub.pem");

    fn key(token_uri: &str) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "sync@project.iam.gserviceaccount.com".to_string(),
            private_key: PRIVATE_KEY.to_string(),
            private_key_id: Some("kid-1".to_string()),
            token_uri: token_uri.to_string(),
        }
    }

    #[derive(Debug, Deserialize)]
    struct DecodedClaims {
        iss: String,
        scope: String,
        aud: String,
        iat: i64,
        exp: i64,
    }

    #[test]
    fn assertion_is_rs256_signed_for_the_sheets_scope() {
        let auth = ServiceAccountAuth::new(key("https://oauth2.example/token")).unwrap();
        let now = Utc::now().timestamp();
        let jwt = auth.assertion(now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["https://oauth2.example/token"]);
        let decoded = decode::<DecodedClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.header.kid.as_deref(), Some("kid-1"));
        assert_eq!(decoded.claims.iss, "sync@project.iam.gserviceaccount.com");
        assert_eq!(decoded.claims.scope, SHEETS_SCOPE);
        assert_eq!(decoded.claims.aud, "https://oauth2.example/token");
        assert_eq!(decoded.claims.exp - decoded.claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn malformed_private_key_is_a_credentials_error() {
        let mut bad = key(DEFAULT_TOKEN_URI);
        bad.private_key = "not a pem".to_string();
        let err = ServiceAccountAuth::new(bad).unwrap_err();
        assert!(matches!(err, SyncError::Credentials(_)));
    }

    #[test]
    fn key_file_defaults_token_uri_and_hides_private_key_in_debug() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("key.json");
        std::fs::write(
            &path,
            json!({
                "type": "service_account",
                "client_email": "sync@project.iam.gserviceaccount.com",
                "private_key": PRIVATE_KEY,
            })
            .to_string(),
        )
        .unwrap();

        let loaded = ServiceAccountKey::load(&path).unwrap();
        assert_eq!(loaded.token_uri, DEFAULT_TOKEN_URI);
        assert!(!format!("{loaded:?}").contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn token_is_cached_until_near_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .and(body_string_contains("assertion="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "minted",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = ServiceAccountAuth::new(key(&format!("{}/token", server.uri()))).unwrap();
        let http = reqwest::Client::new();
        assert_eq!(auth.token(&http).await.unwrap(), "minted");
        assert_eq!(auth.token(&http).await.unwrap(), "minted");
    }

    #[tokio::test]
    async fn short_lived_token_is_exchanged_again() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "brief",
                "expires_in": 30
            })))
            .expect(2)
            .mount(&server)
            .await;

        let auth = ServiceAccountAuth::new(key(&format!("{}/token", server.uri()))).unwrap();
        let http = reqwest::Client::new();
        auth.token(&http).await.unwrap();
        auth.token(&http).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_exchange_maps_to_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let auth = ServiceAccountAuth::new(key(&format!("{}/token", server.uri()))).unwrap();
        let err = auth.token(&reqwest::Client::new()).await.unwrap_err();
        match err {
            SyncError::Remote { status, operation, message } => {
                assert_eq!(status, 400);
                assert_eq!(operation, OP_TOKEN);
                assert!(message.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
