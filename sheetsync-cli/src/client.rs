//! Blocking HTTP client for the daemon's admin API.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct ApiClient {
    base: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.agent.get(&self.url(path));
        self.finish("GET", path, request.call())
    }

    pub fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.agent.post(&self.url(path));
        self.finish("POST", path, request.call())
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.agent.post(&self.url(path));
        self.finish("POST", path, request.send_json(body))
    }

    pub fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.agent.put(&self.url(path));
        self.finish("PUT", path, request.send_json(body))
    }

    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.agent.delete(&self.url(path));
        self.finish("DELETE", path, request.call())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn finish<T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<T> {
        match result {
            Ok(response) => response
                .into_json()
                .with_context(|| format!("invalid response body from {method} {path}")),
            Err(ureq::Error::Status(code, response)) => {
                let message = response
                    .into_json::<Value>()
                    .ok()
                    .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "no error message".to_string());
                Err(anyhow!("{method} {path} failed ({code}): {message}"))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("could not reach sheetsync daemon at {}", self.base))),
        }
    }
}
