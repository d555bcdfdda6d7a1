use std::path::PathBuf;

use anyhow::Context;

use batchconv::config::validate_config;
use batchconv::{load_config, ConfigError, ServiceConfig};

/// Log output format, selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins from the comma-separated `CORS_ORIGINS`. Empty
    /// means no CORS layer.
    pub cors_origins: Vec<String>,
    /// Optional JSON file with the conversion service settings.
    pub service_config_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            service_config_path: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default   |
    /// |---------------------|-----------|
    /// | `HOST`              | `0.0.0.0` |
    /// | `PORT`              | `8000`    |
    /// | `CORS_ORIGINS`      | (none)    |
    /// | `BATCHCONV_CONFIG`  | (none)    |
    /// | `LOG_FORMAT`        | `pretty`  |
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let port = match std::env::var("PORT") {
            Ok(value) => value
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a valid u16, got '{}'", value))?,
            Err(_) => defaults.port,
        };

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|value| parse_origins(&value))
            .unwrap_or_default();

        let service_config_path = std::env::var("BATCHCONV_CONFIG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let log_format = match std::env::var("LOG_FORMAT") {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            service_config_path,
            log_format,
        })
    }

    /// Reads the service settings file when one is configured; defaults
    /// otherwise. Both paths are validated.
    pub fn load_service_config(&self) -> Result<ServiceConfig, ConfigError> {
        match &self.service_config_path {
            Some(path) => load_config(path),
            None => {
                let config = ServiceConfig::default();
                validate_config(&config)?;
                Ok(config)
            }
        }
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(" http://a.test, ,http://b.test "),
            vec!["http://a.test", "http://b.test"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_default_service_config_is_valid() {
        let config = ServerConfig::default();
        let service = config.load_service_config().unwrap();
        assert_eq!(service.max_concurrent_jobs, None);
    }

    #[test]
    fn test_service_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"max_concurrent_jobs": 2, "render_dpi": 100}"#).unwrap();

        let config = ServerConfig {
            service_config_path: Some(path),
            ..ServerConfig::default()
        };
        let service = config.load_service_config().unwrap();

        assert_eq!(service.max_concurrent_jobs, Some(2));
        assert_eq!(service.render_dpi, 100);
    }
}
