use async_trait::async_trait;
use thiserror::Error;

use nowbot_core::domain::UserId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutboundError {
    #[error("send message failed: {0}")]
    SendMessage(String),
    #[error("status update failed: {0}")]
    SetStatus(String),
}

/// Outbound VK surface the routers and publisher depend on.
///
/// `send_message` posts a chat reply on behalf of the bot's community;
/// `set_status` writes a user's own status and therefore takes that user's
/// stored auth token.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, user_id: &UserId, text: &str) -> Result<(), OutboundError>;
    async fn set_status(&self, text: &str, auth_token: &str) -> Result<(), OutboundError>;
}

#[derive(Default)]
pub struct NoopChatApi;

#[async_trait]
impl ChatApi for NoopChatApi {
    async fn send_message(&self, _user_id: &UserId, _text: &str) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn set_status(&self, _text: &str, _auth_token: &str) -> Result<(), OutboundError> {
        Ok(())
    }
}
