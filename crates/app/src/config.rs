//! Application configuration loaded from environment variables.

use std::str::FromStr;

/// Default recipient of admin notifications.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Storefront configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: Postgres connection string (default: none, in-memory storage)
/// - `ADMIN_EMAILS`: comma-separated notification recipients (default: `"admin@example.com"`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` or `pretty` (default: `"pretty"`)
/// - `DB_MAX_CONNECTIONS`: connection pool size (default: `5`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub admin_emails: Vec<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub db_max_connections: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let admin_emails = lookup("ADMIN_EMAILS")
            .map(|raw| parse_list(&raw))
            .filter(|emails| !emails.is_empty())
            .unwrap_or(defaults.admin_emails);

        let log_format = match lookup("LOG_FORMAT").map(|raw| raw.parse::<LogFormat>()) {
            Some(Ok(format)) => format,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring LOG_FORMAT");
                defaults.log_format
            }
            None => defaults.log_format,
        };

        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            admin_emails,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.db_max_connections),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            admin_emails: vec![DEFAULT_ADMIN_EMAIL.to_string()],
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            db_max_connections: 5,
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
