use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use nowbot_core::domain::{ChatMessage, NowPlayingEvent};

use crate::publisher::StatusPublisher;
use crate::router::{MessageRouter, RouteError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream failed to connect: {0}")]
    Connect(String),
    #[error("stream read failed: {0}")]
    Receive(String),
}

/// Long-lived subscription to inbound chat messages. `Ok(None)` means the
/// stream closed for good.
#[async_trait]
pub trait MessageStream: Send + Sync {
    async fn next_message(&self) -> Result<Option<ChatMessage>, StreamError>;
}

/// Long-lived subscription to now-playing changes.
#[async_trait]
pub trait NowPlayingStream: Send + Sync {
    async fn next_event(&self) -> Result<Option<NowPlayingEvent>, StreamError>;
}

/// Stream for modes without a scrobbling integration: closes immediately, so
/// the now-playing pump idles out while the message pump keeps running.
#[derive(Default)]
pub struct NoopNowPlayingStream;

#[async_trait]
impl NowPlayingStream for NoopNowPlayingStream {
    async fn next_event(&self) -> Result<Option<NowPlayingEvent>, StreamError> {
        Ok(None)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Owns the two subscriptions and dispatches every event as an independent
/// task. The pump loops never wait on a handler: dispatch is fire-and-forget
/// with unbounded fan-out, so a slow outbound call occupies one task without
/// delaying its siblings or the subscription itself.
pub struct Orchestrator {
    messages: Arc<dyn MessageStream>,
    now_playing: Arc<dyn NowPlayingStream>,
    router: Arc<dyn MessageRouter>,
    publisher: Arc<StatusPublisher>,
    retry_policy: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        messages: Arc<dyn MessageStream>,
        now_playing: Arc<dyn NowPlayingStream>,
        router: Arc<dyn MessageRouter>,
        publisher: Arc<StatusPublisher>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self { messages, now_playing, router, publisher, retry_policy }
    }

    /// Runs both pumps until each of them either closes or exhausts its
    /// retries. In-flight handlers are left to finish on the runtime.
    pub async fn run(&self) {
        tokio::join!(self.pump_messages(), self.pump_now_playing());
    }

    async fn pump_messages(&self) {
        let mut attempt: u32 = 0;
        loop {
            match self.messages.next_message().await {
                Ok(Some(message)) => {
                    attempt = 0;
                    let correlation_id = Uuid::new_v4().to_string();
                    info!(
                        event_name = "ingress.vk.message_received",
                        correlation_id = %correlation_id,
                        user_id = %message.user_id.0,
                        "received chat message"
                    );

                    let router = self.router.clone();
                    tokio::spawn(async move {
                        if let Err(error) = router.handle(&message).await {
                            log_route_error(&correlation_id, &message.user_id.0, &error);
                        }
                    });
                }
                Ok(None) => {
                    info!(event_name = "ingress.vk.stream_closed", "message stream closed");
                    return;
                }
                Err(stream_error) => {
                    if !self.note_stream_failure("vk", &mut attempt, &stream_error).await {
                        return;
                    }
                }
            }
        }
    }

    async fn pump_now_playing(&self) {
        let mut attempt: u32 = 0;
        loop {
            match self.now_playing.next_event().await {
                Ok(Some(event)) => {
                    attempt = 0;
                    let correlation_id = Uuid::new_v4().to_string();
                    info!(
                        event_name = "ingress.lastfm.now_playing_changed",
                        correlation_id = %correlation_id,
                        scrobble_id = %event.scrobble_id.0,
                        has_track = event.track.is_some(),
                        "received now-playing change"
                    );

                    let publisher = self.publisher.clone();
                    tokio::spawn(async move {
                        publisher.publish(&event).await;
                    });
                }
                Ok(None) => {
                    info!(event_name = "ingress.lastfm.stream_closed", "now-playing stream closed");
                    return;
                }
                Err(stream_error) => {
                    if !self.note_stream_failure("lastfm", &mut attempt, &stream_error).await {
                        return;
                    }
                }
            }
        }
    }

    /// Returns false once retries are exhausted; the pump stops but the
    /// process keeps running on the other subscription.
    async fn note_stream_failure(
        &self,
        source: &str,
        attempt: &mut u32,
        stream_error: &StreamError,
    ) -> bool {
        warn!(
            source,
            attempt = *attempt,
            max_retries = self.retry_policy.max_retries,
            error = %stream_error,
            "event stream failed"
        );

        if *attempt >= self.retry_policy.max_retries {
            warn!(source, "stream retries exhausted; pump stopped without crash");
            return false;
        }

        let delay = self.retry_policy.backoff(*attempt);
        *attempt += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        true
    }
}

fn log_route_error(correlation_id: &str, user_id: &str, route_error: &RouteError) {
    match route_error {
        // A directory miss on a guarded path means the atomicity contract
        // was violated somewhere; keep it loud.
        RouteError::Directory(directory_error) => error!(
            correlation_id,
            user_id,
            error = %directory_error,
            "directory contract violation while handling message"
        ),
        other => warn!(
            correlation_id,
            user_id,
            error = %other,
            "message handler failed; sibling handlers unaffected"
        ),
    }
}
