use std::collections::VecDeque;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use nowbot_core::domain::{ChatMessage, UserId};
use nowbot_relay::orchestrator::{MessageStream, StreamError};

use crate::api::{api_version, VkApi, VkApiError};

#[derive(Debug, Error)]
pub enum LongPollError {
    #[error(transparent)]
    Api(#[from] VkApiError),
    #[error("long poll transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Clone, Debug, Deserialize)]
struct Session {
    key: String,
    server: String,
    ts: Value,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    ts: Option<Value>,
    updates: Option<Vec<PollUpdate>>,
    failed: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PollUpdate {
    #[serde(rename = "type")]
    kind: String,
    object: Value,
}

#[derive(Default)]
struct PollState {
    session: Option<Session>,
    pending: VecDeque<ChatMessage>,
}

/// Community long-poll subscription; one HTTP poll returns a batch of
/// updates, which are buffered and handed out one message at a time.
pub struct VkLongPoller {
    api: VkApi,
    group_id: String,
    wait_secs: u64,
    state: Mutex<PollState>,
}

impl VkLongPoller {
    pub fn new(api: VkApi, group_id: String, wait_secs: u64) -> Self {
        Self { api, group_id, wait_secs, state: Mutex::new(PollState::default()) }
    }

    async fn fetch_session(&self) -> Result<Session, LongPollError> {
        let response = self
            .api
            .call(
                "groups.getLongPollServer",
                &[
                    ("group_id", self.group_id.as_str()),
                    ("access_token", self.api.group_token()),
                    ("v", api_version()),
                ],
            )
            .await?;

        let session: Session =
            serde_json::from_value(response).map_err(|error| {
                LongPollError::Api(VkApiError::Api { code: -1, message: error.to_string() })
            })?;
        debug!(server = %session.server, "long poll session established");
        Ok(session)
    }

    async fn poll(&self, session: &Session) -> Result<PollResponse, LongPollError> {
        let wait = self.wait_secs.to_string();
        let ts = value_as_string(&session.ts);
        let response = self
            .api
            .http()
            .get(&session.server)
            .query(&[
                ("act", "a_check"),
                ("key", session.key.as_str()),
                ("ts", ts.as_str()),
                ("wait", wait.as_str()),
            ])
            .send()
            .await?
            .json::<PollResponse>()
            .await?;
        Ok(response)
    }
}

/// VK returns `ts` as a string in some responses and a number in others.
fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Extracts the consumed fields of a `message_new` update. Field names vary
/// by API version; both spellings are accepted.
fn chat_message(object: &Value) -> Option<ChatMessage> {
    let user_id = object
        .get("user_id")
        .or_else(|| object.get("from_id"))
        .map(value_as_string)
        .filter(|raw| !raw.is_empty())?;
    let text = object
        .get("body")
        .or_else(|| object.get("text"))
        .and_then(Value::as_str)
        .map(str::to_owned)?;

    Some(ChatMessage { user_id: UserId(user_id), text })
}

#[async_trait]
impl MessageStream for VkLongPoller {
    async fn next_message(&self) -> Result<Option<ChatMessage>, StreamError> {
        let mut state = self.state.lock().await;

        loop {
            if let Some(message) = state.pending.pop_front() {
                return Ok(Some(message));
            }

            let session = match &state.session {
                Some(session) => session.clone(),
                None => {
                    let session = self
                        .fetch_session()
                        .await
                        .map_err(|error| StreamError::Connect(error.to_string()))?;
                    state.session = Some(session.clone());
                    session
                }
            };

            let response = match self.poll(&session).await {
                Ok(response) => response,
                Err(error) => {
                    // Drop the session; the next attempt re-keys from scratch.
                    state.session = None;
                    return Err(StreamError::Receive(error.to_string()));
                }
            };

            if let Some(failed) = response.failed {
                warn!(failed, "long poll session invalidated");
                if failed == 1 {
                    // History outran us; resume from the fresh ts.
                    if let (Some(session), Some(ts)) = (state.session.as_mut(), response.ts) {
                        session.ts = ts;
                    }
                } else {
                    state.session = None;
                }
                continue;
            }

            if let (Some(session), Some(ts)) = (state.session.as_mut(), response.ts) {
                session.ts = ts;
            }

            for update in response.updates.unwrap_or_default() {
                if update.kind != "message_new" {
                    continue;
                }
                match chat_message(&update.object) {
                    Some(message) => state.pending.push_back(message),
                    None => warn!("message_new update without user id or text skipped"),
                }
            }
        }
    }
}
