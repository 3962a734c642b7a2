//! Per-request HTTP forwarding.

use me_bridge::{JsonRpcRequest, JsonRpcResponse};
use me_types::{AppError, AppResult};
use std::time::Duration;
use tracing::trace;

/// How long a single forwarded request may take end to end.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Forwards each request as one `POST {base_url}/{target_id}`.
pub struct HttpForwarder {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(base_url: &str, target_id: &str, api_key: Option<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), target_id),
            api_key,
            client,
        })
    }

    pub async fn forward(&self, request: &JsonRpcRequest) -> AppResult<JsonRpcResponse> {
        trace!("Forwarding request to {}", self.endpoint);

        let body = serde_json::to_string(request)?;
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                AppError::Transport(format!("Could not connect to {}", self.endpoint))
            } else if e.is_timeout() {
                AppError::Timeout(format!("No response from {} within 30s", self.endpoint))
            } else {
                AppError::Transport(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => AppError::Transport(format!(
                    "Remote rejected credentials for {}. Check MCPEVERYTHING_API_KEY or the config file",
                    self.endpoint
                )),
                404 => AppError::Transport(format!("No hosted instance at {}", self.endpoint)),
                _ => AppError::Transport(format!("HTTP {} from remote: {}", status, text)),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Protocol(format!("Failed to parse remote response: {}", e)))
    }
}
