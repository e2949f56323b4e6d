//! Environment-driven configuration, read once at start-up

use crate::flow::{FlowTable, TableError};
use crate::system_prompt::{BASE_PROMPT, WELCOME_MESSAGE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid flow table in {path}: {source}")]
    TableFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Settings for the chat-completion endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

/// What every session of a flow variant shares
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub table: FlowTable,
    pub system_prompt: String,
    pub welcome_message: String,
    /// Upper bound on one reply, first byte to last fragment
    pub request_timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            table: FlowTable::standard(),
            system_prompt: BASE_PROMPT.to_string(),
            welcome_message: WELCOME_MESSAGE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Sessions untouched this long, with no open stream, are dropped
    pub session_idle_timeout: Duration,
    pub llm: LlmConfig,
    pub flow: FlowConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("GAIA_PORT") {
            Some(raw) => parse_number::<u16>("GAIA_PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let timeout_secs = match var("GAIA_REQUEST_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("GAIA_REQUEST_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let request_timeout = Duration::from_secs(timeout_secs);
        let idle_secs = match var("GAIA_SESSION_IDLE_SECS") {
            Some(raw) => parse_number::<u64>("GAIA_SESSION_IDLE_SECS", &raw)?,
            None => DEFAULT_SESSION_IDLE_SECS,
        };

        let llm = LlmConfig {
            api_key: var("OPENAI_API_KEY").map(|k| k.trim().to_string()),
            base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: var("GAIA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout,
        };

        let table = match var("GAIA_FLOW_TABLE") {
            Some(path) => load_table(Path::new(&path))?,
            None => FlowTable::standard(),
        };
        let system_prompt = match var("GAIA_SYSTEM_PROMPT") {
            Some(path) => read_file(Path::new(&path))?,
            None => BASE_PROMPT.to_string(),
        };

        Ok(Self {
            port,
            session_idle_timeout: Duration::from_secs(idle_secs),
            llm,
            flow: FlowConfig {
                table,
                system_prompt,
                welcome_message: WELCOME_MESSAGE.to_string(),
                request_timeout,
            },
        })
    }
}

fn parse_number<T: std::str::FromStr + PartialEq + Default>(
    var: &'static str,
    raw: &str,
) -> Result<T, ConfigError> {
    match raw.trim().parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            var,
            value: raw.to_string(),
        }),
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate a JSON flow table
pub fn load_table(path: &Path) -> Result<FlowTable, ConfigError> {
    let raw = read_file(path)?;
    let table: FlowTable =
        serde_json::from_str(&raw).map_err(|source| ConfigError::TableFormat {
            path: path.to_path_buf(),
            source,
        })?;
    table.validate()?;
    Ok(table)
}
