use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use nowbot_core::directory::SharedDirectories;
use nowbot_core::domain::{NowPlayingEvent, ScrobbleId, Track};
use nowbot_relay::orchestrator::{NowPlayingStream, StreamError};

const API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

#[derive(Debug, Error)]
pub enum LastFmError {
    #[error("last.fm transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("last.fm api error {code}: {message}")]
    Api { code: i64, message: String },
}

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: Option<RecentTracks>,
    error: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: Vec<RecentTrack>,
}

#[derive(Debug, Deserialize)]
struct RecentTrack {
    artist: RecentTrackArtist,
    name: String,
    #[serde(rename = "@attr")]
    attr: Option<RecentTrackAttr>,
}

#[derive(Debug, Deserialize)]
struct RecentTrackArtist {
    #[serde(rename = "#text")]
    text: String,
}

#[derive(Debug, Deserialize)]
struct RecentTrackAttr {
    nowplaying: Option<String>,
}

/// The most recent track counts only while it is flagged as playing right
/// now; a finished scrobble means the account currently plays nothing.
fn now_playing(response: RecentTracksResponse) -> Result<Option<Track>, LastFmError> {
    if let Some(code) = response.error {
        return Err(LastFmError::Api {
            code,
            message: response.message.unwrap_or_else(|| "unknown".to_owned()),
        });
    }

    let track = response
        .recenttracks
        .map(|recent| recent.track)
        .unwrap_or_default()
        .into_iter()
        .find(|track| {
            track
                .attr
                .as_ref()
                .and_then(|attr| attr.nowplaying.as_deref())
                .is_some_and(|flag| flag == "true")
        });

    Ok(track.map(|track| Track { artist: track.artist.text, name: track.name }))
}

#[derive(Default)]
struct PollCache {
    now_playing: HashMap<String, Option<Track>>,
    pending: VecDeque<NowPlayingEvent>,
}

/// Polls every linked scrobble account on an interval and queues an event
/// per observed change.
pub struct NowPlayingPoller {
    http: Client,
    api_key: SecretString,
    directories: SharedDirectories,
    poll_interval: Duration,
    cache: Mutex<PollCache>,
}

impl NowPlayingPoller {
    pub fn new(
        http: Client,
        api_key: SecretString,
        directories: SharedDirectories,
        poll_interval: Duration,
    ) -> Self {
        Self { http, api_key, directories, poll_interval, cache: Mutex::new(PollCache::default()) }
    }

    async fn fetch_now_playing(&self, scrobble_id: &ScrobbleId) -> Result<Option<Track>, LastFmError> {
        let response = self
            .http
            .get(API_BASE)
            .query(&[
                ("method", "user.getrecenttracks"),
                ("user", scrobble_id.0.as_str()),
                ("api_key", self.api_key.expose_secret()),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .json::<RecentTracksResponse>()
            .await?;

        now_playing(response)
    }
}

#[async_trait]
impl NowPlayingStream for NowPlayingPoller {
    async fn next_event(&self) -> Result<Option<NowPlayingEvent>, StreamError> {
        let mut cache = self.cache.lock().await;

        loop {
            if let Some(event) = cache.pending.pop_front() {
                return Ok(Some(event));
            }

            tokio::time::sleep(self.poll_interval).await;

            let scrobble_ids = { self.directories.lock().await.links.scrobble_ids() };
            // Unlinked accounts stop being polled and forget their state.
            cache
                .now_playing
                .retain(|cached_id, _| scrobble_ids.iter().any(|id| id.0 == *cached_id));

            for scrobble_id in scrobble_ids {
                let current = match self.fetch_now_playing(&scrobble_id).await {
                    Ok(current) => current,
                    Err(error) => {
                        // One account's failure must not starve the others.
                        warn!(
                            scrobble_id = %scrobble_id.0,
                            error = %error,
                            "now-playing poll failed for account"
                        );
                        continue;
                    }
                };

                let previous = cache.now_playing.get(&scrobble_id.0).cloned().unwrap_or(None);
                if previous == current {
                    cache.now_playing.entry(scrobble_id.0.clone()).or_insert(current);
                    continue;
                }

                debug!(scrobble_id = %scrobble_id.0, playing = current.is_some(), "now-playing changed");
                cache.now_playing.insert(scrobble_id.0.clone(), current.clone());
                cache.pending.push_back(NowPlayingEvent { scrobble_id, track: current });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{now_playing, LastFmError, RecentTracksResponse};

    fn decode(raw: &str) -> RecentTracksResponse {
        serde_json::from_str(raw).expect("decode")
    }

    #[test]
    fn currently_playing_track_is_extracted() {
        let raw = r##"{"recenttracks":{"track":[
            {"artist":{"#text":"Kino"},"name":"Gruppa krovi","@attr":{"nowplaying":"true"}}
        ]}}"##;

        let track = now_playing(decode(raw)).expect("ok").expect("track");
        assert_eq!(track.artist, "Kino");
        assert_eq!(track.name, "Gruppa krovi");
    }

    #[test]
    fn finished_scrobble_counts_as_nothing_playing() {
        let raw = r##"{"recenttracks":{"track":[
            {"artist":{"#text":"Kino"},"name":"Gruppa krovi"}
        ]}}"##;

        assert_eq!(now_playing(decode(raw)).expect("ok"), None);
    }

    #[test]
    fn empty_history_counts_as_nothing_playing() {
        let raw = r#"{"recenttracks":{"track":[]}}"#;
        assert_eq!(now_playing(decode(raw)).expect("ok"), None);
    }

    #[test]
    fn api_error_payload_is_surfaced() {
        let raw = r#"{"error":6,"message":"User not found"}"#;
        let error = now_playing(decode(raw)).err().expect("error");

        assert!(matches!(error, LastFmError::Api { code: 6, .. }));
    }
}
