//! VK API integration.
//!
//! Thin wrappers over the VK method API (`api.rs`) and the community long
//! poll (`longpoll.rs`). Both implement the seams from `nowbot-relay`, so
//! the orchestration core never sees an HTTP detail.

pub mod api;
pub mod longpoll;

pub use api::{VkApi, VkApiError};
pub use longpoll::VkLongPoller;
