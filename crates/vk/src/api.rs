use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use nowbot_core::domain::UserId;
use nowbot_relay::api::{ChatApi, OutboundError};

const API_BASE: &str = "https://api.vk.com/method";
const API_VERSION: &str = "5.74";

#[derive(Debug, Error)]
pub enum VkApiError {
    #[error("vk transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("vk api error {code}: {message}")]
    Api { code: i64, message: String },
}

#[derive(Debug, Deserialize)]
struct MethodResponse {
    response: Option<Value>,
    error: Option<MethodError>,
}

#[derive(Debug, Deserialize)]
struct MethodError {
    error_code: i64,
    error_msg: String,
}

/// Caller of the VK method API. Community-level calls (sending messages) use
/// the group token; `status.set` runs under the individual user's token.
#[derive(Clone)]
pub struct VkApi {
    http: Client,
    group_token: SecretString,
}

impl VkApi {
    pub fn new(http: Client, group_token: SecretString) -> Self {
        Self { http, group_token }
    }

    pub(crate) async fn call(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, VkApiError> {
        let url = format!("{API_BASE}/{method}");
        let response =
            self.http.post(&url).form(params).send().await?.json::<MethodResponse>().await?;

        if let Some(error) = response.error {
            return Err(VkApiError::Api { code: error.error_code, message: error.error_msg });
        }

        debug!(method, "vk method call succeeded");
        Ok(response.response.unwrap_or(Value::Null))
    }

    pub(crate) fn group_token(&self) -> &str {
        self.group_token.expose_secret()
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }
}

/// messages.send deduplicates on `random_id`; a millisecond timestamp is
/// unique enough for one community.
fn random_id() -> String {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0).to_string()
}

#[async_trait]
impl ChatApi for VkApi {
    async fn send_message(&self, user_id: &UserId, text: &str) -> Result<(), OutboundError> {
        let random_id = random_id();
        self.call(
            "messages.send",
            &[
                ("user_id", user_id.0.as_str()),
                ("message", text),
                ("random_id", random_id.as_str()),
                ("access_token", self.group_token()),
                ("v", API_VERSION),
            ],
        )
        .await
        .map(|_| ())
        .map_err(|error| OutboundError::SendMessage(error.to_string()))
    }

    async fn set_status(&self, text: &str, auth_token: &str) -> Result<(), OutboundError> {
        self.call(
            "status.set",
            &[("text", text), ("access_token", auth_token), ("v", API_VERSION)],
        )
        .await
        .map(|_| ())
        .map_err(|error| OutboundError::SetStatus(error.to_string()))
    }
}

pub(crate) fn api_version() -> &'static str {
    API_VERSION
}
