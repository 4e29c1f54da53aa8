use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use nowbot_core::config::{AppConfig, BotMode, ConfigError, LoadOptions};
use nowbot_core::directory::{shared_directories, SharedDirectories};
use nowbot_lastfm::NowPlayingPoller;
use nowbot_relay::orchestrator::{
    MessageStream, NoopNowPlayingStream, NowPlayingStream, Orchestrator, RetryPolicy,
};
use nowbot_relay::publisher::StatusPublisher;
use nowbot_relay::router::{IntentRouter, MessageRouter, ScrobbleRouter, StatusRouter};
use nowbot_vk::{VkApi, VkLongPoller};

use crate::dialogflow::DialogflowClient;

pub struct Application {
    pub config: AppConfig,
    pub directories: SharedDirectories,
    pub orchestrator: Orchestrator,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        mode = ?config.bot.mode,
        "starting application bootstrap"
    );

    let http = reqwest::Client::builder().build().map_err(BootstrapError::HttpClient)?;
    let directories = shared_directories();

    let vk_api = VkApi::new(http.clone(), config.vk.group_token.clone());
    let api = Arc::new(vk_api.clone());
    let messages: Arc<dyn MessageStream> = Arc::new(VkLongPoller::new(
        vk_api,
        config.vk.group_id.clone(),
        config.vk.long_poll_wait_secs,
    ));
    let publisher = Arc::new(StatusPublisher::new(directories.clone(), api.clone()));

    let (router, now_playing): (Arc<dyn MessageRouter>, Arc<dyn NowPlayingStream>) =
        match config.bot.mode {
            BotMode::Scrobble => (
                Arc::new(ScrobbleRouter::new(directories.clone(), api.clone())),
                Arc::new(NowPlayingPoller::new(
                    http,
                    config.lastfm.api_key.clone(),
                    directories.clone(),
                    Duration::from_secs(config.lastfm.poll_interval_secs),
                )),
            ),
            BotMode::Status => (
                Arc::new(StatusRouter::new(directories.clone(), api.clone())),
                Arc::new(NoopNowPlayingStream),
            ),
            BotMode::Intent => {
                let project_id = config.intent.project_id.clone().ok_or_else(|| {
                    ConfigError::Validation("intent.project_id is required in intent mode".to_owned())
                })?;
                let access_token = config.intent.access_token.clone().ok_or_else(|| {
                    ConfigError::Validation(
                        "intent.access_token is required in intent mode".to_owned(),
                    )
                })?;
                let classifier = Arc::new(DialogflowClient::new(
                    http,
                    project_id,
                    access_token,
                    config.intent.language.clone(),
                ));
                (
                    Arc::new(IntentRouter::new(directories.clone(), api.clone(), classifier)),
                    Arc::new(NoopNowPlayingStream),
                )
            }
        };

    let orchestrator =
        Orchestrator::new(messages, now_playing, router, publisher, RetryPolicy::default());

    info!(event_name = "system.bootstrap.ready", "application bootstrap finished");
    Ok(Application { config, directories, orchestrator })
}

#[cfg(test)]
mod tests {
    use nowbot_core::config::{BotMode, ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn scrobble_overrides() -> ConfigOverrides {
        ConfigOverrides {
            vk_group_id: Some("123".to_owned()),
            vk_group_token: Some("group-token".to_owned()),
            lastfm_api_key: Some("fm-key".to_owned()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_vk_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                vk_group_id: Some("123".to_owned()),
                lastfm_api_key: Some("fm-key".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("vk.group_token"));
    }

    #[tokio::test]
    async fn bootstrap_wires_scrobble_mode() {
        let app = bootstrap(LoadOptions {
            overrides: scrobble_overrides(),
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap");

        assert_eq!(app.config.bot.mode, BotMode::Scrobble);
        assert!(app.directories.lock().await.links.scrobble_ids().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_in_intent_mode_without_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                mode: Some(BotMode::Intent),
                vk_group_id: Some("123".to_owned()),
                vk_group_token: Some("group-token".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("intent.project_id"));
    }
}
