//! Configuration loading and validation.

use crate::error::{ConfigError, Result};
use crate::llm::RetryPolicy;
use crate::persona::PersonaKind;

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMPLETION_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_IMAGE_URL: &str = "https://fal.run/fal-ai/flux/schnell";

/// Discord rejects messages above 2000 characters.
pub const PLATFORM_MESSAGE_CAP: usize = 2000;

/// Overmind configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory path.
    pub data_dir: PathBuf,

    /// Discord gateway token.
    pub discord_token: String,

    pub completion: CompletionConfig,

    /// Image generation; `None` disables `/imagine`.
    pub image: Option<ImageConfig>,

    pub history: HistoryConfig,

    pub persona: PersonaKind,

    pub dispatch: DispatchConfig,

    pub reactions: ReactionConfig,

    /// Greet members joining a guild.
    pub welcome_messages: bool,

    pub log_file: PathBuf,
}

/// Completion provider configuration.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Image provider configuration.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Thread history configuration.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,

    /// Exchanges (user + assistant pairs) kept per thread.
    pub max_exchanges: usize,
}

impl HistoryConfig {
    /// Turn cap enforced on every thread.
    pub fn max_turns(&self) -> usize {
        self.max_exchanges * 2
    }
}

/// Outbound message configuration.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Single-message character limit, kept under the platform cap.
    pub message_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            message_limit: 1990,
        }
    }
}

/// Trigger-word reaction configuration.
#[derive(Debug, Clone)]
pub struct ReactionConfig {
    /// Overrides the persona's defaults when set.
    pub trigger_words: Option<Vec<String>>,
    pub chance: f64,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            trigger_words: None,
            chance: 0.25,
        }
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(error) if error.not_found() => {}
            Err(error) => tracing::warn!(%error, "failed to read .env"),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let discord_token =
            get("DISCORD_TOKEN").ok_or_else(|| ConfigError::MissingKey("DISCORD_TOKEN".into()))?;
        let completion_key =
            get("GROQ_API_KEY").ok_or_else(|| ConfigError::MissingKey("GROQ_API_KEY".into()))?;

        let data_dir = get("OVERMIND_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_dir().map(|d| d.join("overmind")))
            .unwrap_or_else(|| PathBuf::from("./data"));

        let timeout_secs = parse_or(&get, "COMPLETION_TIMEOUT_SECS", 45u64)?;
        if timeout_secs == 0 {
            return Err(invalid("COMPLETION_TIMEOUT_SECS", "must be at least 1").into());
        }
        let timeout = Duration::from_secs(timeout_secs);
        let retry = RetryPolicy {
            max_retries: parse_or(&get, "COMPLETION_MAX_RETRIES", 1u32)?,
            ..RetryPolicy::default()
        };

        let completion = CompletionConfig {
            url: get("COMPLETION_URL").unwrap_or_else(|| DEFAULT_COMPLETION_URL.into()),
            api_key: completion_key,
            model: get("COMPLETION_MODEL").unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.into()),
            timeout,
            retry,
        };

        let image = get("IMAGE_API_KEY").map(|api_key| ImageConfig {
            url: get("IMAGE_URL").unwrap_or_else(|| DEFAULT_IMAGE_URL.into()),
            api_key,
            timeout: Duration::from_secs(120),
        });

        let max_exchanges = parse_or(&get, "MAX_HISTORY", 12usize)?;
        if max_exchanges == 0 {
            return Err(invalid("MAX_HISTORY", "must be at least 1").into());
        }
        let history = HistoryConfig {
            path: get("HISTORY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("overmind_threads.json")),
            max_exchanges,
        };

        let persona = match get("PERSONA") {
            Some(value) => value.parse::<PersonaKind>()?,
            None => PersonaKind::default(),
        };

        let message_limit = parse_or(&get, "MESSAGE_LIMIT", DispatchConfig::default().message_limit)?;
        if message_limit == 0 || message_limit > PLATFORM_MESSAGE_CAP {
            return Err(invalid(
                "MESSAGE_LIMIT",
                &format!("must be between 1 and {PLATFORM_MESSAGE_CAP}"),
            )
            .into());
        }

        let chance = parse_or(&get, "TRIGGER_REACTION_CHANCE", ReactionConfig::default().chance)?;
        if !(0.0..=1.0).contains(&chance) {
            return Err(invalid("TRIGGER_REACTION_CHANCE", "must be between 0.0 and 1.0").into());
        }
        let reactions = ReactionConfig {
            trigger_words: get("TRIGGER_WORDS").map(|value| {
                value
                    .split(',')
                    .map(|word| word.trim().to_lowercase())
                    .filter(|word| !word.is_empty())
                    .collect()
            }),
            chance,
        };

        let welcome_messages = parse_or(&get, "WELCOME_MESSAGES", false)?;

        let log_file = get("LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("overmind.log"));

        Ok(Self {
            data_dir,
            discord_token,
            completion,
            image,
            history,
            persona,
            dispatch: DispatchConfig { message_limit },
            reactions,
            welcome_messages,
            log_file,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|error| invalid(key, &error.to_string()).into()),
        None => Ok(default),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.into(),
        reason: reason.into(),
    }
}
