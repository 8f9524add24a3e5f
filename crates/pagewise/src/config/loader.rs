use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let processing = &config.processing;
    if !(72..=600).contains(&processing.dpi) {
        return Err(invalid(format!(
            "processing.dpi must be between 72 and 600, got {}",
            processing.dpi
        )));
    }
    if processing.max_image_bytes == 0 {
        return Err(invalid("processing.max_image_bytes must be greater than 0"));
    }
    if processing.min_edge_px == 0 {
        return Err(invalid("processing.min_edge_px must be greater than 0"));
    }
    if !(1..=100).contains(&processing.retry_quality) {
        return Err(invalid(format!(
            "processing.retry_quality must be between 1 and 100, got {}",
            processing.retry_quality
        )));
    }

    let inference = &config.inference;
    if inference.max_attempts == 0 {
        return Err(invalid("inference.max_attempts must be at least 1"));
    }
    if inference.request_timeout_secs == 0 || inference.connect_timeout_secs == 0 {
        return Err(invalid("inference timeouts must be greater than 0"));
    }
    if !(0.0..=2.0).contains(&inference.temperature) {
        return Err(invalid(format!(
            "inference.temperature must be between 0 and 2, got {}",
            inference.temperature
        )));
    }

    if config.aggregate.chunk_target == 0 {
        return Err(invalid("aggregate.chunk_target must be greater than 0"));
    }

    let export = &config.export;
    if export.upload_workers == 0 {
        return Err(invalid("export.upload_workers must be at least 1"));
    }
    if export.upload_timeout_secs == 0 || export.session_ttl_secs == 0 {
        return Err(invalid(
            "export.upload_timeout_secs and export.session_ttl_secs must be greater than 0",
        ));
    }
    if let Some(remote) = &export.remote {
        if remote.request_timeout_secs == 0 {
            return Err(invalid("export.remote.request_timeout_secs must be greater than 0"));
        }
    }

    if config.store.max_attempts == 0 {
        return Err(invalid("store.max_attempts must be at least 1"));
    }

    Ok(())
}
