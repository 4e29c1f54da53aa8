//! Dialogflow REST client for intent mode.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use nowbot_relay::intent::{session_key, IntentClassifier, IntentError, RateLimiter};

const API_BASE: &str = "https://dialogflow.googleapis.com/v2";

/// Calls `detectIntent` on the project agent. The session id is the derived
/// session key, so each user/channel pair keeps its own conversation context
/// on the Dialogflow side. All calls queue behind one shared rate gate.
pub struct DialogflowClient {
    http: Client,
    project_id: String,
    access_token: SecretString,
    language: String,
    limiter: RateLimiter,
}

impl DialogflowClient {
    pub fn new(http: Client, project_id: String, access_token: SecretString, language: String) -> Self {
        Self { http, project_id, access_token, language, limiter: RateLimiter::default() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectIntentResponse {
    query_result: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResult {
    fulfillment_text: Option<String>,
}

#[async_trait]
impl IntentClassifier for DialogflowClient {
    async fn detect_intent(
        &self,
        text: &str,
        user_id: i64,
        channel_id: i64,
    ) -> Result<String, IntentError> {
        let session = session_key(user_id, channel_id);
        let url = format!("{API_BASE}/projects/{}/agent/sessions/{session}:detectIntent", self.project_id);

        self.limiter.wait_before_request().await;

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&json!({
                "queryInput": {
                    "text": { "text": text, "languageCode": self.language }
                }
            }))
            .send()
            .await
            .map_err(|error| IntentError::Detect(error.to_string()))?
            .error_for_status()
            .map_err(|error| IntentError::Detect(error.to_string()))?
            .json::<DetectIntentResponse>()
            .await
            .map_err(|error| IntentError::Detect(error.to_string()))?;

        debug!(session, "intent detected");
        Ok(response
            .query_result
            .and_then(|result| result.fulfillment_text)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::DetectIntentResponse;

    #[test]
    fn decodes_fulfillment_text() {
        let raw = r#"{"queryResult":{"fulfillmentText":"Привет!","intent":{"displayName":"greet"}}}"#;
        let decoded: DetectIntentResponse = serde_json::from_str(raw).expect("decode");

        let text = decoded.query_result.and_then(|result| result.fulfillment_text);
        assert_eq!(text.as_deref(), Some("Привет!"));
    }

    #[test]
    fn missing_fulfillment_decodes_to_none() {
        let raw = r#"{"queryResult":{}}"#;
        let decoded: DetectIntentResponse = serde_json::from_str(raw).expect("decode");

        assert!(decoded.query_result.expect("result").fulfillment_text.is_none());
    }
}
