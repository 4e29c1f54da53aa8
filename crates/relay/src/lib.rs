//! Event orchestration for nowbot.
//!
//! This crate wires the two inbound event streams (chat messages, now-playing
//! changes) to the shared directories and the outbound VK calls:
//! - **Outbound seam** (`api`) - `ChatApi` trait for `messages.send` / `status.set`
//! - **Routers** (`router`) - one state machine per bot mode, never merged
//! - **Publisher** (`publisher`) - now-playing fan-out to subscriber statuses
//! - **Orchestrator** (`orchestrator`) - the two pump loops, one task per event
//! - **Intent** (`intent`) - classifier seam plus the shared rate gate
//!
//! Vendor clients implement the seams from `nowbot-vk`, `nowbot-lastfm`, and
//! the server crate; everything here is testable against scripted fakes.

pub mod api;
pub mod intent;
pub mod orchestrator;
pub mod publisher;
pub mod router;

pub use api::{ChatApi, NoopChatApi, OutboundError};
pub use intent::{IntentClassifier, IntentError, RateLimiter};
pub use orchestrator::{
    MessageStream, NoopNowPlayingStream, NowPlayingStream, Orchestrator, RetryPolicy, StreamError,
};
pub use publisher::StatusPublisher;
pub use router::{IntentRouter, MessageRouter, RouteError, ScrobbleRouter, StatusRouter};
