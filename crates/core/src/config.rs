use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub vk: VkConfig,
    pub lastfm: LastFmConfig,
    pub intent: IntentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub mode: BotMode,
}

#[derive(Clone, Debug)]
pub struct VkConfig {
    pub group_id: String,
    pub group_token: SecretString,
    pub long_poll_wait_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LastFmConfig {
    pub api_key: SecretString,
    pub poll_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IntentConfig {
    pub project_id: Option<String>,
    pub access_token: Option<SecretString>,
    pub language: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Which router state machine the bot runs; selected once at startup and
/// never mixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotMode {
    /// Last.fm link/unlink commands plus now-playing status forwarding.
    Scrobble,
    /// Messages from linked users become their VK status verbatim.
    Status,
    /// Messages from linked users are answered by the intent classifier.
    Intent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub mode: Option<BotMode>,
    pub vk_group_id: Option<String>,
    pub vk_group_token: Option<String>,
    pub lastfm_api_key: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig { mode: BotMode::Scrobble },
            vk: VkConfig {
                group_id: String::new(),
                group_token: String::new().into(),
                long_poll_wait_secs: 25,
            },
            lastfm: LastFmConfig { api_key: String::new().into(), poll_interval_secs: 10 },
            intent: IntentConfig { project_id: None, access_token: None, language: "ru".to_owned() },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for BotMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scrobble" => Ok(Self::Scrobble),
            "status" => Ok(Self::Status),
            "intent" => Ok(Self::Intent),
            other => Err(ConfigError::Validation(format!(
                "unsupported bot mode `{other}` (expected scrobble|status|intent)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("nowbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(bot) = patch.bot {
            if let Some(mode) = bot.mode {
                self.bot.mode = mode;
            }
        }

        if let Some(vk) = patch.vk {
            if let Some(group_id) = vk.group_id {
                self.vk.group_id = group_id;
            }
            if let Some(group_token_value) = vk.group_token {
                self.vk.group_token = secret_value(group_token_value);
            }
            if let Some(long_poll_wait_secs) = vk.long_poll_wait_secs {
                self.vk.long_poll_wait_secs = long_poll_wait_secs;
            }
        }

        if let Some(lastfm) = patch.lastfm {
            if let Some(api_key_value) = lastfm.api_key {
                self.lastfm.api_key = secret_value(api_key_value);
            }
            if let Some(poll_interval_secs) = lastfm.poll_interval_secs {
                self.lastfm.poll_interval_secs = poll_interval_secs;
            }
        }

        if let Some(intent) = patch.intent {
            if let Some(project_id) = intent.project_id {
                self.intent.project_id = Some(project_id);
            }
            if let Some(access_token_value) = intent.access_token {
                self.intent.access_token = Some(secret_value(access_token_value));
            }
            if let Some(language) = intent.language {
                self.intent.language = language;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("NOWBOT_BOT_MODE") {
            self.bot.mode = value.parse()?;
        }

        if let Some(value) = read_env("NOWBOT_VK_GROUP_ID") {
            self.vk.group_id = value;
        }
        if let Some(value) = read_env("NOWBOT_VK_GROUP_TOKEN") {
            self.vk.group_token = secret_value(value);
        }
        if let Some(value) = read_env("NOWBOT_VK_LONG_POLL_WAIT_SECS") {
            self.vk.long_poll_wait_secs = parse_u64("NOWBOT_VK_LONG_POLL_WAIT_SECS", &value)?;
        }

        if let Some(value) = read_env("NOWBOT_LASTFM_API_KEY") {
            self.lastfm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("NOWBOT_LASTFM_POLL_INTERVAL_SECS") {
            self.lastfm.poll_interval_secs =
                parse_u64("NOWBOT_LASTFM_POLL_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("NOWBOT_INTENT_PROJECT_ID") {
            self.intent.project_id = Some(value);
        }
        if let Some(value) = read_env("NOWBOT_INTENT_ACCESS_TOKEN") {
            self.intent.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("NOWBOT_INTENT_LANGUAGE") {
            self.intent.language = value;
        }

        let log_level = read_env("NOWBOT_LOGGING_LEVEL").or_else(|| read_env("NOWBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("NOWBOT_LOGGING_FORMAT").or_else(|| read_env("NOWBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(mode) = overrides.mode {
            self.bot.mode = mode;
        }
        if let Some(group_id) = overrides.vk_group_id {
            self.vk.group_id = group_id;
        }
        if let Some(group_token) = overrides.vk_group_token {
            self.vk.group_token = secret_value(group_token);
        }
        if let Some(api_key) = overrides.lastfm_api_key {
            self.lastfm.api_key = secret_value(api_key);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_vk(&self.vk)?;
        if self.bot.mode == BotMode::Scrobble {
            validate_lastfm(&self.lastfm)?;
        }
        if self.bot.mode == BotMode::Intent {
            validate_intent(&self.intent)?;
        }
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("nowbot.toml"), PathBuf::from("config/nowbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_vk(vk: &VkConfig) -> Result<(), ConfigError> {
    if vk.group_id.trim().is_empty() {
        return Err(ConfigError::Validation("vk.group_id is required".to_owned()));
    }
    if vk.group_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "vk.group_token is required. Create one under the community's API settings".to_owned(),
        ));
    }
    if vk.long_poll_wait_secs == 0 || vk.long_poll_wait_secs > 90 {
        return Err(ConfigError::Validation(
            "vk.long_poll_wait_secs must be in range 1..=90".to_owned(),
        ));
    }
    Ok(())
}

fn validate_lastfm(lastfm: &LastFmConfig) -> Result<(), ConfigError> {
    if lastfm.api_key.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "lastfm.api_key is required in scrobble mode. Get it from https://www.last.fm/api/account/create".to_owned(),
        ));
    }
    if lastfm.poll_interval_secs == 0 || lastfm.poll_interval_secs > 300 {
        return Err(ConfigError::Validation(
            "lastfm.poll_interval_secs must be in range 1..=300".to_owned(),
        ));
    }
    Ok(())
}

fn validate_intent(intent: &IntentConfig) -> Result<(), ConfigError> {
    let missing_project =
        intent.project_id.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
    if missing_project {
        return Err(ConfigError::Validation(
            "intent.project_id is required in intent mode".to_owned(),
        ));
    }

    let missing_token = intent
        .access_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_token {
        return Err(ConfigError::Validation(
            "intent.access_token is required in intent mode".to_owned(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_owned(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    bot: Option<BotPatch>,
    vk: Option<VkPatch>,
    lastfm: Option<LastFmPatch>,
    intent: Option<IntentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    mode: Option<BotMode>,
}

#[derive(Debug, Default, Deserialize)]
struct VkPatch {
    group_id: Option<String>,
    group_token: Option<String>,
    long_poll_wait_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LastFmPatch {
    api_key: Option<String>,
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IntentPatch {
    project_id: Option<String>,
    access_token: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use secrecy::ExposeSecret;

    use super::{AppConfig, BotMode, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            vk_group_id: Some("123".to_owned()),
            vk_group_token: Some("group-token".to_owned()),
            lastfm_api_key: Some("fm-key".to_owned()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_fail_validation_without_tokens() {
        let result = AppConfig::load(LoadOptions::default());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn overrides_produce_a_valid_scrobble_config() {
        let config = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.bot.mode, BotMode::Scrobble);
        assert_eq!(config.vk.group_id, "123");
        assert_eq!(config.vk.group_token.expose_secret(), "group-token");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn status_mode_does_not_require_lastfm_key() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                mode: Some(BotMode::Status),
                vk_group_id: Some("123".to_owned()),
                vk_group_token: Some("group-token".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.bot.mode, BotMode::Status);
    }

    #[test]
    fn intent_mode_requires_classifier_credentials() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                mode: Some(BotMode::Intent),
                vk_group_id: Some("123".to_owned()),
                vk_group_token: Some("group-token".to_owned()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("intent mode must fail").to_string();
        assert!(message.contains("intent.project_id"));
    }

    #[test]
    fn toml_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "[bot]\nmode = \"status\"\n\n[vk]\ngroup_id = \"777\"\ngroup_token = \"tok\"\n\n[logging]\nformat = \"json\"\n"
        )
        .expect("write");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            ..LoadOptions::default()
        })
        .expect("load");

        assert_eq!(config.bot.mode, BotMode::Status);
        assert_eq!(config.vk.group_id, "777");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/there.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn unterminated_interpolation_is_rejected() {
        let result = super::interpolate_env_vars("token = \"${NOWBOT_UNTERMINATED");
        assert!(matches!(result, Err(ConfigError::UnterminatedInterpolation)));
    }

    #[test]
    fn invalid_mode_string_is_rejected() {
        let result = "karaoke".parse::<BotMode>();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
