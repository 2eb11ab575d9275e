//! Client configuration from the environment

use crate::store::ChatContext;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("COMPANION_ACCESS_TOKEN is not set; sign in and export the session token")]
    MissingAccessToken,
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Settings for the companion client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub access_token: String,
    /// Farewell display time before the log is wiped
    pub clear_delay: Duration,
    pub max_message_chars: usize,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: String::new(),
            clear_delay: ChatContext::DEFAULT_CLEAR_DELAY,
            max_message_chars: ChatContext::DEFAULT_MAX_MESSAGE_CHARS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_token = var("COMPANION_ACCESS_TOKEN").ok_or(ConfigError::MissingAccessToken)?;
        let api_url = var("COMPANION_API_URL").unwrap_or(defaults.api_url);

        let clear_delay = match var("COMPANION_CLEAR_DELAY_MS") {
            Some(value) => Duration::from_millis(parse_number("COMPANION_CLEAR_DELAY_MS", value)?),
            None => defaults.clear_delay,
        };
        let max_message_chars = match var("COMPANION_MAX_MESSAGE_CHARS") {
            Some(value) => parse_number("COMPANION_MAX_MESSAGE_CHARS", value)?,
            None => defaults.max_message_chars,
        };
        let connect_timeout = match var("COMPANION_CONNECT_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_number("COMPANION_CONNECT_TIMEOUT_SECS", value)?),
            None => defaults.connect_timeout,
        };

        Ok(Self {
            api_url,
            access_token,
            clear_delay,
            max_message_chars,
            connect_timeout,
        })
    }

    pub fn chat_context(&self) -> ChatContext {
        ChatContext::new(self.clear_delay, self.max_message_chars)
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { name, value })
}
