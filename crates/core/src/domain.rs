use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrobbleId(pub String);

/// One VK account as the bot knows it.
///
/// Created with both optional fields absent on the first message ever seen
/// from the account; never deleted (the `forget` command is a placeholder).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    /// VK token obtained through the OAuth redirect flow; required to set
    /// the account's status.
    pub auth_token: Option<String>,
    /// Last.fm account this VK account currently watches.
    pub scrobble_id: Option<ScrobbleId>,
}

impl UserRecord {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, auth_token: None, scrobble_id: None }
    }
}

/// A Last.fm account together with the VK accounts watching it.
///
/// Invariant: an entry exists iff `subscribers` is non-empty. Removal of the
/// last subscriber deletes the entry, never leaves it empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScrobbleLink {
    pub scrobble_id: ScrobbleId,
    pub subscribers: Vec<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub artist: String,
    pub name: String,
}

/// Inbound chat event from the VK message stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub user_id: UserId,
    pub text: String,
}

/// A scrobble account's now-playing track changed (or cleared).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NowPlayingEvent {
    pub scrobble_id: ScrobbleId,
    pub track: Option<Track>,
}
