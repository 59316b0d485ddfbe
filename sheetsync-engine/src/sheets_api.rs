//! REST client for the Google Sheets `values` API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sheetsync_core::{SheetId, Table};

use crate::auth::ServiceAccountAuth;
use crate::error::{io_err, SyncError};
use crate::gateway::{RangeUpdate, SheetGateway};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const TOKEN_FILE_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN_FILE";
pub const SERVICE_ACCOUNT_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Service-account key picked up from the working directory.
pub const KEY_FILE_NAME: &str = "key.json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const OP_BATCH_GET: &str = "values.batchGet";
const OP_BATCH_UPDATE: &str = "values.batchUpdate";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Where the bearer token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A fixed token, captured once.
    Static(String),
    /// A file re-read on every request, so an external refresher can rotate it.
    File(PathBuf),
    /// A service-account JSON key; tokens are minted and refreshed in-process.
    ServiceAccount(PathBuf),
}

impl TokenSource {
    /// Resolve from the process environment and working directory.
    pub fn from_env() -> Result<Self, SyncError> {
        let cwd = std::env::current_dir().map_err(|e| io_err(".", e))?;
        Self::from_lookup(|name| std::env::var(name).ok(), &cwd)
    }

    /// First match wins: `GOOGLE_OAUTH_ACCESS_TOKEN_FILE`,
    /// `GOOGLE_OAUTH_ACCESS_TOKEN`, `key.json` in `cwd`,
    /// `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_lookup<F>(lookup: F, cwd: &Path) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_blank(TOKEN_FILE_ENV) {
            return Ok(TokenSource::File(PathBuf::from(path)));
        }
        if let Some(token) = non_blank(TOKEN_ENV) {
            return Ok(TokenSource::Static(token.trim().to_string()));
        }
        let key_file = cwd.join(KEY_FILE_NAME);
        if key_file.is_file() {
            return Ok(TokenSource::ServiceAccount(key_file));
        }
        if let Some(path) = non_blank(SERVICE_ACCOUNT_ENV) {
            return Ok(TokenSource::ServiceAccount(PathBuf::from(path)));
        }
        Err(SyncError::Credentials(format!(
            "set {TOKEN_ENV}, {TOKEN_FILE_ENV} or {SERVICE_ACCOUNT_ENV}, or place {KEY_FILE_NAME} in the working directory"
        )))
    }
}

/// Resolved credentials held by the client.
#[derive(Debug, Clone)]
enum Credentials {
    Static(String),
    File(PathBuf),
    ServiceAccount(Arc<ServiceAccountAuth>),
}

impl Credentials {
    fn resolve(source: TokenSource) -> Result<Self, SyncError> {
        Ok(match source {
            TokenSource::Static(token) => Credentials::Static(token),
            TokenSource::File(path) => Credentials::File(path),
            TokenSource::ServiceAccount(path) => {
                let auth = ServiceAccountAuth::from_file(&path)?;
                tracing::info!(client_email = auth.client_email(), key = %path.display(), "using service-account credentials");
                Credentials::ServiceAccount(Arc::new(auth))
            }
        })
    }

    async fn access_token(&self, http: &reqwest::Client) -> Result<String, SyncError> {
        let token = match self {
            Credentials::Static(token) => token.clone(),
            Credentials::File(path) => std::fs::read_to_string(path)
                .map_err(|e| io_err(path, e))?
                .trim()
                .to_string(),
            Credentials::ServiceAccount(auth) => auth.token(http).await?,
        };
        if token.is_empty() {
            return Err(SyncError::Credentials("access token is empty".to_string()));
        }
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateRequest<'a> {
    value_input_option: &'static str,
    data: &'a [RangeUpdate],
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl GoogleSheetsClient {
    pub fn new(base_url: impl Into<String>, tokens: TokenSource) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| SyncError::Transport {
                operation: "client.build",
                source,
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: Credentials::resolve(tokens)?,
        })
    }

    fn values_url(&self, sheet: &SheetId, method: &str) -> String {
        format!("{}/v4/spreadsheets/{}/values:{}", self.base_url, sheet, method)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<reqwest::Response, SyncError> {
        let token = self.credentials.access_token(&self.http).await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| SyncError::Transport { operation, source })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(SyncError::Remote {
            status: status.as_u16(),
            operation,
            message,
        })
    }
}

#[async_trait]
impl SheetGateway for GoogleSheetsClient {
    async fn read_ranges(&self, sheet: &SheetId, ranges: &[String]) -> Result<Vec<Table>, SyncError> {
        let mut query: Vec<(&str, &str)> = ranges.iter().map(|r| ("ranges", r.as_str())).collect();
        query.push(("majorDimension", "ROWS"));

        let request = self.http.get(self.values_url(sheet, "batchGet")).query(&query);
        let response = self.send(request, OP_BATCH_GET).await?;
        let body: BatchGetResponse = response.json().await.map_err(|e| SyncError::Decode {
            operation: OP_BATCH_GET,
            message: e.to_string(),
        })?;

        tracing::debug!(sheet = %sheet, ranges = ranges.len(), "batch read");
        Ok(body
            .value_ranges
            .into_iter()
            .map(|vr| Table(vr.values))
            .collect())
    }

    async fn write_ranges(&self, sheet: &SheetId, updates: &[RangeUpdate]) -> Result<(), SyncError> {
        let body = BatchUpdateRequest {
            value_input_option: "RAW",
            data: updates,
        };
        let request = self.http.post(self.values_url(sheet, "batchUpdate")).json(&body);
        self.send(request, OP_BATCH_UPDATE).await?;

        tracing::debug!(sheet = %sheet, ranges = updates.len(), "batch write");
        Ok(())
    }
}
