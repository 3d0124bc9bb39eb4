//! Business operations over HTTP
//!
//! Each tool maps to `POST {base_url}/tools/{name}` with
//! `{call_id, from_address, agent_id, arguments}`.

use crate::domain::tool::{BusinessOperations, OperationError, ToolContext, ToolInvocation};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct OperationRequest<'a> {
    call_id: String,
    from_address: &'a str,
    agent_id: Option<&'a str>,
    arguments: Value,
}

pub struct HttpBusinessOperations {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBusinessOperations {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, invocation: &ToolInvocation) -> String {
        format!("{}/tools/{}", self.base_url, invocation.name())
    }
}

/// Unwrap `{success, data, error}` envelopes; other bodies pass through
fn interpret_body(body: Value) -> Result<Value, OperationError> {
    match body.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(body.get("data").cloned().unwrap_or(Value::Null)),
        Some(false) => Err(OperationError::Rejected(
            body.get("error")
                .and_then(Value::as_str)
                .unwrap_or("operation failed")
                .to_string(),
        )),
        None => Ok(body),
    }
}

#[async_trait]
impl BusinessOperations for HttpBusinessOperations {
    async fn execute(
        &self,
        context: &ToolContext,
        invocation: &ToolInvocation,
    ) -> Result<Value, OperationError> {
        let url = self.endpoint(invocation);
        debug!("Invoking {} for call {}", url, context.call_id);

        let mut request = self.http.post(&url).json(&OperationRequest {
            call_id: context.call_id.to_string(),
            from_address: &context.from_address,
            agent_id: context.agent_id.as_deref(),
            arguments: invocation.arguments(),
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OperationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(OperationError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OperationError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OperationError::Unavailable(e.to_string()))?;
        interpret_body(body)
    }
}
