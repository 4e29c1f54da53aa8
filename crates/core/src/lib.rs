//! Core domain for nowbot: account directories, token extraction, user-facing
//! text, and configuration.
//!
//! Everything here is synchronous, in-memory state. The async orchestration
//! that drives it lives in `nowbot-relay`; vendor API clients live in
//! `nowbot-vk` and `nowbot-lastfm`.

pub mod config;
pub mod directory;
pub mod domain;
pub mod messages;
pub mod token;

pub use directory::{
    shared_directories, Directories, DirectoryError, ScrobbleLinkDirectory, SharedDirectories,
    UserDirectory, UserField, UserPatch,
};
pub use domain::{ChatMessage, NowPlayingEvent, ScrobbleId, ScrobbleLink, Track, UserId, UserRecord};
pub use token::extract_token;
