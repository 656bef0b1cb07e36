//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default request body limit: 64 KiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Quotes API server.
#[derive(Parser, Debug)]
#[command(name = "quotes", version, about = "Idempotent quote creation API")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "QUOTES_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Accepted bearer token(s), comma-separated
    #[arg(long, env = "QUOTES_API_TOKEN", value_delimiter = ',')]
    pub api_token: Vec<String>,

    /// Append-only data file; the in-memory store is used when absent
    #[arg(long, env = "QUOTES_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Upper bound for each store call, in milliseconds
    #[arg(long, env = "QUOTES_STORE_TIMEOUT_MS", default_value_t = 5000)]
    pub store_timeout_ms: u64,

    /// Value of the Retry-After header on 503 responses
    #[arg(long, env = "QUOTES_RETRY_AFTER_SECS", default_value_t = 5)]
    pub retry_after_secs: u64,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "QUOTES_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid bind address '{0}'")]
    InvalidBind(String),

    #[error("at least one API token is required (--api-token or QUOTES_API_TOKEN)")]
    MissingApiToken,

    #[error("store timeout must be greater than zero")]
    ZeroStoreTimeout,

    #[error("max body size must be greater than zero")]
    ZeroBodyLimit,
}

/// Validated server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub api_tokens: Vec<String>,
    pub data_file: Option<PathBuf>,
    pub store_timeout: Duration,
    pub retry_after_secs: u64,
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Defaults for everything except the accepted tokens.
    pub fn with_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_tokens: tokens.into_iter().map(Into::into).collect(),
            data_file: None,
            store_timeout: quotes_core::DEFAULT_STORE_TIMEOUT,
            retry_after_secs: 5,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let bind = cli
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBind(cli.bind.clone()))?;

        let api_tokens: Vec<String> = cli
            .api_token
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if api_tokens.is_empty() {
            return Err(ConfigError::MissingApiToken);
        }
        if cli.store_timeout_ms == 0 {
            return Err(ConfigError::ZeroStoreTimeout);
        }
        if cli.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }

        Ok(Self {
            bind,
            api_tokens,
            data_file: cli.data_file,
            store_timeout: Duration::from_millis(cli.store_timeout_ms),
            retry_after_secs: cli.retry_after_secs,
            max_body_bytes: cli.max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, ConfigError> {
        let mut argv = vec!["quotes"];
        argv.extend_from_slice(args);
        ServerConfig::try_from(Cli::try_parse_from(argv).expect("clap parse"))
    }

    #[test]
    fn defaults_apply() {
        let config = parse(&["--api-token", "secret"]).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.api_tokens, vec!["secret".to_string()]);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_after_secs, 5);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.data_file.is_none());
    }

    #[test]
    fn tokens_split_on_commas_and_blank_entries_drop() {
        let config = parse(&["--api-token", "a, b,,"]).unwrap();
        assert_eq!(config.api_tokens, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn blank_token_list_is_rejected() {
        assert_eq!(
            parse(&["--api-token", " , "]).unwrap_err(),
            ConfigError::MissingApiToken
        );
    }

    #[test]
    fn bad_bind_and_zero_limits_are_rejected() {
        assert_eq!(
            parse(&["--api-token", "t", "--bind", "nowhere"]).unwrap_err(),
            ConfigError::InvalidBind("nowhere".into())
        );
        assert_eq!(
            parse(&["--api-token", "t", "--store-timeout-ms", "0"]).unwrap_err(),
            ConfigError::ZeroStoreTimeout
        );
        assert_eq!(
            parse(&["--api-token", "t", "--max-body-bytes", "0"]).unwrap_err(),
            ConfigError::ZeroBodyLimit
        );
    }
}
