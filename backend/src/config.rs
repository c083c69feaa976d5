use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("unsupported log format: {}", other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_ms: u64,
    pub db_acquire_timeout_ms: u64,
    pub db_idle_timeout_ms: u64,
    pub cors_allowed_origins: Vec<String>,
    pub cors_allowed_methods: Vec<String>,
    pub cors_allowed_headers: Vec<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub api_version: String,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub logo_search_paths: Vec<PathBuf>,
    pub asset_base_dir: Option<PathBuf>,
    pub brand_name: String,
    pub brand_tagline: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Missing keys fall
    /// back to defaults; malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let database_url = var("DATABASE_URL", "postgres://localhost:5432/logistics");
        let database_name = lookup("DATABASE_NAME").filter(|name| !name.trim().is_empty());
        let db_max_connections: u32 = var("DB_MAX_CONNECTIONS", "10")
            .parse()
            .context("invalid DB_MAX_CONNECTIONS")?;
        if db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }
        let db_connect_timeout_ms = var("DB_CONNECT_TIMEOUT_MS", "5000")
            .parse()
            .context("invalid DB_CONNECT_TIMEOUT_MS")?;
        let db_acquire_timeout_ms = var("DB_ACQUIRE_TIMEOUT_MS", "10000")
            .parse()
            .context("invalid DB_ACQUIRE_TIMEOUT_MS")?;
        let db_idle_timeout_ms = var("DB_IDLE_TIMEOUT_MS", "45000")
            .parse()
            .context("invalid DB_IDLE_TIMEOUT_MS")?;

        let cors_allowed_origins = split_list(&var("CORS_ALLOWED_ORIGINS", "*"));
        let cors_allowed_methods = split_list(&var("CORS_ALLOWED_METHODS", "*"));
        let cors_allowed_headers = split_list(&var("CORS_ALLOWED_HEADERS", "*"));

        let debug = parse_bool(&var("DEBUG", "false")).context("invalid DEBUG")?;
        let log_level = var("LOG_LEVEL", if debug { "debug" } else { "info" });
        let log_format = var("LOG_FORMAT", "text").parse()?;

        let api_version = var("API_VERSION", "1.0.0");
        let host = var("HOST", "0.0.0.0");
        let port = var("PORT", "8000").parse().context("invalid PORT")?;

        let logo_search_paths = split_list(&var(
            "LOGO_SEARCH_PATHS",
            "assets/logo.png,static/logo.png,logo.png",
        ))
        .into_iter()
        .map(PathBuf::from)
        .collect();
        let asset_base_dir = lookup("ASSET_BASE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        let brand_name = var("BRAND_NAME", "LOGISTICS");
        let brand_tagline = var("BRAND_TAGLINE", "Delivery Services");

        Ok(Self {
            database_url,
            database_name,
            db_max_connections,
            db_connect_timeout_ms,
            db_acquire_timeout_ms,
            db_idle_timeout_ms,
            cors_allowed_origins,
            cors_allowed_methods,
            cors_allowed_headers,
            log_level,
            log_format,
            api_version,
            host,
            port,
            debug,
            logo_search_paths,
            asset_base_dir,
            brand_name,
            brand_tagline,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn db_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.db_connect_timeout_ms)
    }

    pub fn db_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.db_acquire_timeout_ms)
    }

    pub fn db_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.db_idle_timeout_ms)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {}", other),
    }
}
