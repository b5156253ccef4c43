//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Deduplication
//!
//! - `DEDUP_HEADER`: Header carrying the client request id (default: `Request-Id`)
//! - `DEDUP_REJECT_ON_MISSING_ID`: Reject non-GET requests without an id (default: false)
//! - `DEDUP_MISSING_ID_MESSAGE` / `DEDUP_DUPLICATE_MESSAGE`: Client-facing error texts
//! - `TRUSTED_PROXIES`: CIDR ranges allowed to supply `X-Forwarded-For`
//!
//! # Observability
//!
//! - `RUST_LOG`: Tracing filter (default: `info`)
//! - `LOG_FORMAT`: `text` or `json` (default: `text`)
//! - `METRICS_PORT`: Prometheus listener port, `0` disables (default: 9090)

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderName;

use crate::error::{AppError, AppResult};
use crate::middleware::{DEFAULT_HEADER_NAME, DedupConfig};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    /// Render HTML pages for 404/405 and recover handler panics (default: true)
    pub error_pages_enabled: bool,

    // =========================================================================
    // Deduplication Configuration
    // =========================================================================
    /// Header carrying the request id (default: "Request-Id")
    pub dedup_header: String,

    /// Reject non-GET requests without an id instead of passing them through
    pub reject_on_missing_id: bool,

    /// Message for 400 responses; empty derives one from the header name
    pub missing_id_message: String,

    /// Message for 403 responses; empty uses the built-in default
    pub duplicate_message: String,

    /// Trusted proxy CIDR ranges.
    ///
    /// Only peers inside these ranges may supply the client address through
    /// `X-Forwarded-For` / `X-Real-IP`. Empty trusts nobody.
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Demo Job Configuration
    // =========================================================================
    /// Upper bound for the simulated work of `POST /jobs` (default: 30s)
    pub job_max_work: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Log output format
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or
    /// validate.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,
            error_pages_enabled: Self::parse_env("ERROR_PAGES_ENABLED", true)?,

            // Deduplication
            dedup_header: env::var("DEDUP_HEADER")
                .unwrap_or_else(|_| DEFAULT_HEADER_NAME.to_string()),
            reject_on_missing_id: Self::parse_env("DEDUP_REJECT_ON_MISSING_ID", false)?,
            missing_id_message: env::var("DEDUP_MISSING_ID_MESSAGE").unwrap_or_default(),
            duplicate_message: env::var("DEDUP_DUPLICATE_MESSAGE").unwrap_or_default(),
            trusted_proxies: Self::parse_trusted_proxies(),

            // Demo jobs
            job_max_work: Duration::from_millis(Self::parse_env("JOB_MAX_WORK_MS", 30_000)?),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Text)?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if HeaderName::from_bytes(self.dedup_header.trim().as_bytes()).is_err() {
            return Err(AppError::ConfigError(format!(
                "DEDUP_HEADER ('{}') is not a valid HTTP header name",
                self.dedup_header
            )));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.job_max_work.is_zero() {
            return Err(AppError::ConfigError(
                "JOB_MAX_WORK_MS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Deduplication settings derived from this configuration.
    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            header_name: self.dedup_header.trim().to_string(),
            reject_on_missing_id: self.reject_on_missing_id,
            missing_id_message: self.missing_id_message.clone(),
            duplicate_message: self.duplicate_message.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse trusted proxy CIDR ranges from environment variable.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    fn parse_trusted_proxies() -> Vec<String> {
        env::var("TRUSTED_PROXIES")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 1024 * 1024,
            error_pages_enabled: true,
            // Deduplication
            dedup_header: DEFAULT_HEADER_NAME.to_string(),
            reject_on_missing_id: false,
            missing_id_message: String::new(),
            duplicate_message: String::new(),
            trusted_proxies: vec![],
            // Demo jobs
            job_max_work: Duration::from_secs(30),
            // Observability
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_port: 9090,
        }
    }
}
