
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
pub const DEFAULT_BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one GROQ_API_KEY_n environment variable must be set")]
    MissingGroqKeys,
    #[error("EMBEDDING_API_URL environment variable must be set")]
    MissingEmbeddingUrl,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Application configuration, read from the environment at startup.
///
/// Required: at least one `GROQ_API_KEY_n` and `EMBEDDING_API_URL`. Everything
/// else has a default or gates an optional subsystem (static bearer auth,
/// OTP email, token issuance).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Static bearer key for the RAG endpoints. `None` disables the check.
    pub api_key: Option<String>,
    pub groq_api_keys: Vec<String>,
    pub groq_api_url: String,
    pub embedding_api_url: String,
    pub embedding_batch_size: usize,
    /// Directory holding the vector store and the user database.
    pub data_dir: PathBuf,
    pub jwt_secret: Option<String>,
    pub jwt_expiry_minutes: i64,
    pub brevo_api_key: Option<String>,
    pub brevo_sender_email: Option<String>,
    pub brevo_endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let groq_api_keys = collect_groq_keys();

        let config = Self {
            port: parse_env("PORT", 8000)?,
            api_key: non_empty_env("API_KEY"),
            groq_api_keys,
            groq_api_url: non_empty_env("GROQ_API_URL")
                .unwrap_or_else(|| DEFAULT_GROQ_API_URL.to_string()),
            embedding_api_url: non_empty_env("EMBEDDING_API_URL")
                .ok_or(ConfigError::MissingEmbeddingUrl)?,
            embedding_batch_size: parse_env(
                "EMBEDDING_API_BATCH_SIZE",
                DEFAULT_EMBEDDING_BATCH_SIZE,
            )?,
            data_dir: non_empty_env("DATA_DIR").map_or_else(|| PathBuf::from("data"), PathBuf::from),
            jwt_secret: non_empty_env("JWT_SECRET"),
            jwt_expiry_minutes: parse_env("JWT_EXPIRATION_MINUTES", 1440)?,
            brevo_api_key: non_empty_env("BREVO_API_KEY"),
            brevo_sender_email: non_empty_env("BREVO_SENDER_EMAIL"),
            brevo_endpoint: non_empty_env("BREVO_EMAIL_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_BREVO_ENDPOINT.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groq_api_keys.is_empty() {
            return Err(ConfigError::MissingGroqKeys);
        }

        Url::parse(&self.groq_api_url)
            .map_err(|_| ConfigError::InvalidUrl(self.groq_api_url.clone()))?;
        Url::parse(&self.embedding_api_url)
            .map_err(|_| ConfigError::InvalidUrl(self.embedding_api_url.clone()))?;

        if self.embedding_batch_size == 0 || self.embedding_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.embedding_batch_size));
        }

        if self.jwt_expiry_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "JWT_EXPIRATION_MINUTES",
                self.jwt_expiry_minutes.to_string(),
            ));
        }

        Ok(())
    }

    pub fn vector_store_path(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn user_database_path(&self) -> PathBuf {
        self.data_dir.join("users.db")
    }
}

/// Collect the Groq key pool from `GROQ_API_KEY_1` through `GROQ_API_KEY_9`.
/// Gaps are allowed; order is preserved but callers shuffle before use anyway.
fn collect_groq_keys() -> Vec<String> {
    (1..=9)
        .filter_map(|n| non_empty_env(&format!("GROQ_API_KEY_{n}")))
        .collect()
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Copy,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        _ => Ok(default),
    }
}
