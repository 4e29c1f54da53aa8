//! Per-mode message routing.
//!
//! Each bot mode is its own `MessageRouter` implementation with its own state
//! machine; the orchestrator holds exactly one of them for the lifetime of
//! the process. All three share the token-linking step: a user with no stored
//! auth token is asked to authorize, and a pasted callback URL either links
//! them or re-prompts with the same text (a garbage URL is indistinguishable
//! from no URL).
//!
//! Directory mutations happen under a single lock acquisition per message and
//! the lock is released before any outbound call, so multi-step sequences
//! like relinking look atomic to every concurrent handler.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use nowbot_core::directory::{DirectoryError, SharedDirectories, UserPatch};
use nowbot_core::domain::{ChatMessage, ScrobbleId};
use nowbot_core::{extract_token, messages};

use crate::api::{ChatApi, OutboundError};
use crate::intent::{IntentClassifier, IntentError};

const SET_COMMAND_PREFIX: &str = "setlastfm ";
const UNSET_COMMAND_PREFIX: &str = "unsetlastfm";
const FORGET_COMMAND_PREFIX: &str = "forget";

#[derive(Debug, Error)]
pub enum RouteError {
    /// A directory contract violation; indicates a router bug and is logged
    /// loudly rather than answered to the user.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Outbound(#[from] OutboundError),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("user id `{0}` is not numeric")]
    NonNumericUserId(String),
}

#[async_trait]
pub trait MessageRouter: Send + Sync {
    async fn handle(&self, message: &ChatMessage) -> Result<(), RouteError>;
}

/// Outcome of the shared token-linking step.
enum TokenStep {
    /// User already linked; proceed to the mode's own handling.
    AlreadyLinked { auth_token: String },
    /// Token stored or prompt required; the reply closes out the message.
    Reply(String),
}

/// Runs the shared linking steps under an already-held lock: creates the
/// record on first contact and works through the token flow for unlinked
/// users.
fn token_step(
    directories: &mut nowbot_core::Directories,
    message: &ChatMessage,
    linked_reply: fn() -> String,
) -> Result<TokenStep, DirectoryError> {
    let record = directories.ensure_user(&message.user_id)?;

    if let Some(auth_token) = record.auth_token {
        return Ok(TokenStep::AlreadyLinked { auth_token });
    }

    match extract_token(&message.text, &message.user_id.0) {
        Some(token) => {
            directories.users.update(
                &message.user_id,
                UserPatch { auth_token: Some(token), ..UserPatch::default() },
            )?;
            Ok(TokenStep::Reply(linked_reply()))
        }
        None => Ok(TokenStep::Reply(messages::authorize_prompt())),
    }
}

/// Scrobble mode: `setlastfm <name>` / `unsetlastfm` / `forget` over the two
/// directories.
pub struct ScrobbleRouter {
    directories: SharedDirectories,
    api: Arc<dyn ChatApi>,
}

impl ScrobbleRouter {
    pub fn new(directories: SharedDirectories, api: Arc<dyn ChatApi>) -> Self {
        Self { directories, api }
    }
}

#[async_trait]
impl MessageRouter for ScrobbleRouter {
    async fn handle(&self, message: &ChatMessage) -> Result<(), RouteError> {
        let reply = {
            let mut directories = self.directories.lock().await;

            match token_step(&mut directories, message, messages::linked_scrobble_instructions)? {
                TokenStep::Reply(reply) => Some(reply),
                TokenStep::AlreadyLinked { .. } => {
                    if let Some(name) = message.text.strip_prefix(SET_COMMAND_PREFIX) {
                        // The remainder is taken verbatim: no trimming, no
                        // validation. An odd name only fails at poll time.
                        let scrobble_id = ScrobbleId(name.to_owned());
                        directories.link_scrobble(&message.user_id, scrobble_id.clone())?;
                        Some(messages::scrobble_set(&scrobble_id.0, &message.user_id.0))
                    } else if message.text.starts_with(UNSET_COMMAND_PREFIX) {
                        match directories.unlink_scrobble(&message.user_id)? {
                            Some(scrobble_id) => Some(messages::scrobble_unset(&scrobble_id.0)),
                            None => Some(messages::nothing_to_unset()),
                        }
                    } else if message.text.starts_with(FORGET_COMMAND_PREFIX) {
                        // Placeholder for account deletion: no mutation, no reply.
                        debug!(user_id = %message.user_id.0, "forget command ignored");
                        None
                    } else {
                        Some(messages::help())
                    }
                }
            }
        };

        if let Some(text) = reply {
            self.api.send_message(&message.user_id, &text).await?;
        }

        Ok(())
    }
}

/// Status mode: after linking, every message is the literal status text. No
/// command parsing at all.
pub struct StatusRouter {
    directories: SharedDirectories,
    api: Arc<dyn ChatApi>,
}

impl StatusRouter {
    pub fn new(directories: SharedDirectories, api: Arc<dyn ChatApi>) -> Self {
        Self { directories, api }
    }
}

#[async_trait]
impl MessageRouter for StatusRouter {
    async fn handle(&self, message: &ChatMessage) -> Result<(), RouteError> {
        let step = {
            let mut directories = self.directories.lock().await;
            token_step(&mut directories, message, messages::linked_status_instructions)?
        };

        match step {
            TokenStep::Reply(text) => {
                self.api.send_message(&message.user_id, &text).await?;
            }
            TokenStep::AlreadyLinked { auth_token } => {
                self.api.set_status(&message.text, &auth_token).await?;
            }
        }

        Ok(())
    }
}

/// Intent mode: after linking, every message is answered with the external
/// classifier's fulfillment text. The classifier enforces its own shared
/// rate gate.
pub struct IntentRouter {
    directories: SharedDirectories,
    api: Arc<dyn ChatApi>,
    classifier: Arc<dyn IntentClassifier>,
}

impl IntentRouter {
    pub fn new(
        directories: SharedDirectories,
        api: Arc<dyn ChatApi>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self { directories, api, classifier }
    }
}

#[async_trait]
impl MessageRouter for IntentRouter {
    async fn handle(&self, message: &ChatMessage) -> Result<(), RouteError> {
        let step = {
            let mut directories = self.directories.lock().await;
            token_step(&mut directories, message, messages::linked_status_instructions)?
        };

        let reply = match step {
            TokenStep::Reply(text) => text,
            TokenStep::AlreadyLinked { .. } => {
                let user_id = message
                    .user_id
                    .0
                    .parse::<i64>()
                    .map_err(|_| RouteError::NonNumericUserId(message.user_id.0.clone()))?;
                let fulfillment = self.classifier.detect_intent(&message.text, user_id, 0).await?;
                if fulfillment.is_empty() {
                    debug!(user_id = %message.user_id.0, "classifier returned no fulfillment text");
                    return Ok(());
                }
                fulfillment
            }
        };

        self.api.send_message(&message.user_id, &reply).await?;
        Ok(())
    }
}
