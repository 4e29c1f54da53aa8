//! Last.fm integration.
//!
//! Last.fm has no push channel for "now playing", so the poller walks the
//! linked scrobble accounts on an interval, asks each one for its most
//! recent track, and emits an event only when the now-playing state actually
//! changed (including track → nothing).

pub mod poller;

pub use poller::{LastFmError, NowPlayingPoller};
