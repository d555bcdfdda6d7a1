use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.archive_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "archive_directory must not be empty".to_string(),
        });
    }

    if config.max_concurrent_jobs == Some(0) {
        return Err(ConfigError::Validation {
            message: "max_concurrent_jobs must be at least 1 when set".to_string(),
        });
    }

    if config.item_timeout_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "item_timeout_secs must be at least 1 when set".to_string(),
        });
    }

    if config.max_upload_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "max_upload_bytes must be greater than zero".to_string(),
        });
    }

    for (field, dpi) in [("render_dpi", config.render_dpi), ("ocr.dpi", config.ocr.dpi)] {
        if !(36..=1200).contains(&dpi) {
            return Err(ConfigError::Validation {
                message: format!("{} must be between 36 and 1200, got {}", field, dpi),
            });
        }
    }

    if config.ocr.languages.is_empty() {
        return Err(ConfigError::Validation {
            message: "ocr.languages must name at least one language".to_string(),
        });
    }

    // Validate tool names
    for (field, tool) in [
        ("tools.pdftoppm", &config.tools.pdftoppm),
        ("tools.pdfinfo", &config.tools.pdfinfo),
        ("tools.soffice", &config.tools.soffice),
    ] {
        if tool.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", field),
            });
        }
    }

    Ok(())
}
