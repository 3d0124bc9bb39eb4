//! Carrier REST client

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::directive::hangup_directive;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CarrierError {
    #[error("Carrier request failed: {0}")]
    Http(String),
    #[error("Carrier API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid carrier response: {0}")]
    InvalidResponse(String),
}

/// Outbound call placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCallRequest {
    pub to: String,
    pub from: String,
    /// Markup executed once the callee answers
    pub directive: String,
    pub status_callback_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Ask the carrier to place a call; returns the carrier call id
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<String, CarrierError>;

    /// Replace the live call's instructions with a hangup
    async fn hangup(&self, carrier_call_id: &str) -> Result<(), CarrierError>;
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

pub struct RestCarrierClient {
    http: reqwest::Client,
    api_base: String,
    account_id: String,
    auth_token: String,
}

impl RestCarrierClient {
    pub fn new(
        api_base: impl Into<String>,
        account_id: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CarrierError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CarrierError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            auth_token: auth_token.into(),
        })
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", self.api_base, self.account_id)
    }

    fn call_url(&self, carrier_call_id: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.api_base, self.account_id, carrier_call_id
        )
    }

    async fn post_form(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, CarrierError> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| CarrierError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarrierError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CarrierClient for RestCarrierClient {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<String, CarrierError> {
        let form = [
            ("To", request.to.as_str()),
            ("From", request.from.as_str()),
            ("Twiml", request.directive.as_str()),
            ("StatusCallback", request.status_callback_url.as_str()),
            ("StatusCallbackMethod", "POST"),
            ("StatusCallbackEvent", "initiated"),
            ("StatusCallbackEvent", "ringing"),
            ("StatusCallbackEvent", "answered"),
            ("StatusCallbackEvent", "completed"),
        ];
        let response = self.post_form(self.calls_url(), &form).await?;
        let call: CallResource = response
            .json()
            .await
            .map_err(|e| CarrierError::InvalidResponse(e.to_string()))?;

        info!("Carrier accepted outbound call to {}: {}", request.to, call.sid);
        Ok(call.sid)
    }

    async fn hangup(&self, carrier_call_id: &str) -> Result<(), CarrierError> {
        let directive = hangup_directive();
        match self
            .post_form(self.call_url(carrier_call_id), &[("Twiml", directive.as_str())])
            .await
        {
            Ok(_) => {
                info!("Hangup issued for carrier call {}", carrier_call_id);
                Ok(())
            }
            Err(e) => {
                warn!("Hangup failed for carrier call {}: {}", carrier_call_id, e);
                Err(e)
            }
        }
    }
}
