use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::reactor::ReactorConfig;
use crate::reactor::corrector::{CorrectionRule, Corrector, DEFAULT_CORRECTIONS};
use crate::reactor::engine::DEFAULT_UNDO_EMOJI;
use crate::reactor::parrot::{
    DEFAULT_MOCK_FREQUENCY, DEFAULT_MOCK_URL, DEFAULT_PARROT_LIMIT, DEFAULT_TYPING_FREQUENCY,
    ParrotSettings, TriggerEmoji,
};
use crate::reactor::repost::{DEFAULT_REPOST, RepostRule, RepostTrigger};
use crate::reactor::triggers::{DEFAULT_REACTIONS, TriggerRule, TriggerTable};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Invalid regex pattern.
    InvalidRegex { pattern: String, source: regex::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidRegex { pattern, source } => {
                write!(f, "invalid regex pattern '{}': {}", pattern, source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    slack_bot_token: String,
    /// Parrot announcements; nominations and status queries are accepted here.
    debug_channel: Option<String>,
    /// Logs are mirrored here; WARN/ERROR immediately, INFO batched.
    log_channel: Option<String>,
    /// New emoji and new channels are announced here.
    announce_channel: Option<String>,
    /// Directory for log files. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_api_base")]
    api_base: String,
    undo_emoji: Option<String>,
    #[serde(default = "default_reconnect_delay_secs")]
    reconnect_delay_secs: u64,
    #[serde(default)]
    parrot: ParrotFile,
    /// Replaces the built-in reaction table when present.
    reactions: Option<Vec<ReactionFile>>,
    reposts: Option<Vec<RepostFile>>,
    corrections: Option<Vec<CorrectionFile>>,
}

#[derive(Deserialize, Default)]
struct ParrotFile {
    mock_frequency: Option<u32>,
    typing_frequency: Option<u32>,
    parrot_limit: Option<u32>,
    mock_url: Option<String>,
    triggers: Option<Vec<TriggerFile>>,
}

#[derive(Deserialize)]
struct TriggerFile {
    emoji: String,
    chance: f64,
}

#[derive(Deserialize)]
struct ReactionFile {
    pattern: String,
    emojis: Vec<String>,
}

#[derive(Deserialize)]
struct RepostFile {
    pattern: String,
    channel: String,
    description: String,
    emoji: String,
    #[serde(default)]
    ephemeral: bool,
}

#[derive(Deserialize)]
struct CorrectionFile {
    pattern: String,
    message: String,
    icon_emoji: String,
    username: String,
    #[serde(default)]
    ephemeral: bool,
}

fn default_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

pub struct Config {
    pub slack_bot_token: String,
    pub debug_channel: Option<String>,
    pub log_channel: Option<String>,
    pub announce_channel: Option<String>,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub api_base: String,
    pub reconnect_delay: Duration,
    pub reactor: ReactorConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.slack_bot_token.trim().is_empty() {
            return Err(ConfigError::Validation("slack_bot_token is required".into()));
        }
        if !file.slack_bot_token.trim().starts_with("xox") {
            return Err(ConfigError::Validation(
                "slack_bot_token appears invalid (expected format: xoxb-...)".into(),
            ));
        }

        let debug_channel = non_empty(file.debug_channel);
        let announce_channel = non_empty(file.announce_channel);

        let reactor = ReactorConfig {
            triggers: load_reactions(file.reactions)?,
            reposts: load_reposts(file.reposts)?,
            corrector: load_corrections(file.corrections)?,
            parrot: load_parrot(file.parrot)?,
            debug_channel: debug_channel.clone(),
            announce_channel: announce_channel.clone(),
            undo_emoji: non_empty(file.undo_emoji)
                .map(|e| e.trim_matches(':').to_string())
                .unwrap_or_else(|| DEFAULT_UNDO_EMOJI.to_string()),
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            slack_bot_token: file.slack_bot_token.trim().to_string(),
            debug_channel,
            log_channel: non_empty(file.log_channel),
            announce_channel,
            data_dir,
            api_base: file.api_base,
            reconnect_delay: Duration::from_secs(file.reconnect_delay_secs.max(1)),
            reactor,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Patterns match case-insensitively.
fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidRegex { pattern: pattern.to_string(), source: e })
}

fn load_reactions(reactions: Option<Vec<ReactionFile>>) -> Result<TriggerTable, ConfigError> {
    let rules = match reactions {
        Some(reactions) => reactions
            .into_iter()
            .map(|r| Ok(TriggerRule::new(compile(&r.pattern)?, r.emojis)))
            .collect::<Result<Vec<_>, ConfigError>>()?,
        None => DEFAULT_REACTIONS
            .iter()
            .map(|(pattern, emojis)| {
                let emojis = emojis.iter().map(|e| e.to_string()).collect();
                Ok(TriggerRule::new(compile(pattern)?, emojis))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
    };
    Ok(TriggerTable::new(rules))
}

fn load_reposts(reposts: Option<Vec<RepostFile>>) -> Result<RepostTrigger, ConfigError> {
    let rules = match reposts {
        Some(reposts) => reposts
            .into_iter()
            .map(|r| {
                Ok(RepostRule {
                    pattern: compile(&r.pattern)?,
                    target_channel: r.channel,
                    description: r.description,
                    emoji: r.emoji.trim_matches(':').to_string(),
                    ephemeral: r.ephemeral,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
        None => {
            let (pattern, channel, description, emoji) = DEFAULT_REPOST;
            vec![RepostRule {
                pattern: compile(pattern)?,
                target_channel: channel.to_string(),
                description: description.to_string(),
                emoji: emoji.to_string(),
                ephemeral: false,
            }]
        }
    };
    Ok(RepostTrigger::new(rules))
}

fn load_corrections(corrections: Option<Vec<CorrectionFile>>) -> Result<Corrector, ConfigError> {
    let rules = match corrections {
        Some(corrections) => corrections
            .into_iter()
            .map(|c| {
                Ok(CorrectionRule {
                    pattern: compile(&c.pattern)?,
                    message: c.message,
                    icon_emoji: c.icon_emoji,
                    username: c.username,
                    ephemeral: c.ephemeral,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
        None => DEFAULT_CORRECTIONS
            .iter()
            .map(|(pattern, message, icon_emoji, username)| {
                Ok(CorrectionRule {
                    pattern: compile(pattern)?,
                    message: message.to_string(),
                    icon_emoji: icon_emoji.to_string(),
                    username: username.to_string(),
                    ephemeral: false,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
    };
    Ok(Corrector::new(rules))
}

fn load_parrot(file: ParrotFile) -> Result<ParrotSettings, ConfigError> {
    let mut settings = ParrotSettings::default();
    if let Some(triggers) = file.triggers {
        settings.triggers = triggers
            .into_iter()
            .map(|t| TriggerEmoji { name: t.emoji.trim_matches(':').to_string(), chance: t.chance })
            .collect();
    }
    for trigger in &settings.triggers {
        if !(0.0..=1.0).contains(&trigger.chance) {
            return Err(ConfigError::Validation(format!(
                "parrot trigger :{}: has chance {} (must be between 0 and 1)",
                trigger.name, trigger.chance
            )));
        }
    }

    settings.mock_frequency = file.mock_frequency.unwrap_or(DEFAULT_MOCK_FREQUENCY);
    settings.typing_frequency = file.typing_frequency.unwrap_or(DEFAULT_TYPING_FREQUENCY);
    settings.parrot_limit = file.parrot_limit.unwrap_or(DEFAULT_PARROT_LIMIT);
    settings.mock_url = file.mock_url.unwrap_or_else(|| DEFAULT_MOCK_URL.to_string());

    if settings.mock_frequency == 0 || settings.typing_frequency == 0 || settings.parrot_limit == 0 {
        return Err(ConfigError::Validation(
            "parrot mock_frequency, typing_frequency and parrot_limit must be positive".into(),
        ));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(r#"{ "slack_bot_token": "xoxb-123-abc" }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.slack_bot_token, "xoxb-123-abc");
        assert_eq!(config.api_base, "https://slack.com/api");
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert!(config.debug_channel.is_none());
        assert_eq!(config.reactor.triggers.len(), DEFAULT_REACTIONS.len());
        assert_eq!(config.reactor.undo_emoji, "x");
        assert_eq!(config.reactor.parrot, ParrotSettings::default());
        assert!(config.reactor.reposts.is_watch_emoji("mask-parrot"));
    }

    #[test]
    fn test_full_config() {
        let file = write_config(r#"{
            "slack_bot_token": "xoxb-1",
            "debug_channel": "CDEBUG",
            "log_channel": " ",
            "undo_emoji": ":wastebasket:",
            "parrot": {
                "mock_frequency": 2,
                "parrot_limit": 4,
                "triggers": [{ "emoji": ":rip:", "chance": 1.0 }]
            },
            "reactions": [{ "pattern": "hello", "emojis": ["wave"] }],
            "reposts": [{
                "pattern": "rust",
                "channel": "CRUST",
                "description": "Rust",
                "emoji": "crab",
                "ephemeral": true
            }],
            "corrections": []
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.debug_channel.as_deref(), Some("CDEBUG"));
        assert_eq!(config.reactor.debug_channel.as_deref(), Some("CDEBUG"));
        assert!(config.log_channel.is_none());
        assert_eq!(config.reactor.undo_emoji, "wastebasket");
        assert_eq!(config.reactor.parrot.mock_frequency, 2);
        assert_eq!(config.reactor.parrot.typing_frequency, DEFAULT_TYPING_FREQUENCY);
        assert_eq!(config.reactor.parrot.parrot_limit, 4);
        assert_eq!(config.reactor.parrot.triggers[0].name, "rip");
        assert_eq!(config.reactor.triggers.apply("HELLO"), vec!["wave"]);
        assert!(config.reactor.reposts.is_watch_emoji("crab"));
        assert!(!config.reactor.reposts.is_watch_emoji("mask-parrot"));
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{ "slack_bot_token": "" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("slack_bot_token"));
    }

    #[test]
    fn test_invalid_token_format() {
        let file = write_config(r#"{ "slack_bot_token": "not-a-token" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn test_missing_token() {
        let file = write_config(r#"{ "debug_channel": "C1" }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_chance_out_of_range() {
        let file = write_config(r#"{
            "slack_bot_token": "xoxb-1",
            "parrot": { "triggers": [{ "emoji": "rip", "chance": 1.5 }] }
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains(":rip:"));
    }

    #[test]
    fn test_zero_frequency() {
        let file = write_config(r#"{
            "slack_bot_token": "xoxb-1",
            "parrot": { "typing_frequency": 0 }
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_regex_pattern() {
        let file = write_config(r#"{
            "slack_bot_token": "xoxb-1",
            "reactions": [{ "pattern": "[invalid(regex", "emojis": ["x"] }]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
