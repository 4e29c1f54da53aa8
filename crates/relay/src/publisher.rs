use std::sync::Arc;

use tracing::{debug, warn};

use nowbot_core::directory::SharedDirectories;
use nowbot_core::domain::{NowPlayingEvent, UserId};
use nowbot_core::messages;

use crate::api::ChatApi;

/// Fans a now-playing change out to the status of every subscribed account.
pub struct StatusPublisher {
    directories: SharedDirectories,
    api: Arc<dyn ChatApi>,
}

impl StatusPublisher {
    pub fn new(directories: SharedDirectories, api: Arc<dyn ChatApi>) -> Self {
        Self { directories, api }
    }

    /// An id with no link is a silent no-op (the last subscriber may have
    /// unlinked while the poll was in flight). Subscribers whose token has
    /// not been stored yet are skipped; a failed status call is logged and
    /// never blocks the remaining subscribers.
    pub async fn publish(&self, event: &NowPlayingEvent) {
        let recipients: Vec<(UserId, String)> = {
            let directories = self.directories.lock().await;
            let Ok(link) = directories.links.get(&event.scrobble_id) else {
                debug!(
                    scrobble_id = %event.scrobble_id.0,
                    "now-playing event for unlinked scrobble account ignored"
                );
                return;
            };

            link.subscribers
                .iter()
                .filter_map(|user_id| {
                    let record = directories.users.get(user_id).ok()?;
                    let auth_token = record.auth_token.clone()?;
                    Some((user_id.clone(), auth_token))
                })
                .collect()
        };

        let text = messages::status_text(event.track.as_ref());
        for (user_id, auth_token) in recipients {
            if let Err(error) = self.api.set_status(&text, &auth_token).await {
                warn!(
                    user_id = %user_id.0,
                    scrobble_id = %event.scrobble_id.0,
                    error = %error,
                    "status update failed for subscriber"
                );
            }
        }
    }
}
