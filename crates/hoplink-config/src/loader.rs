//! Configuration file loading and error types.

use std::{fs, path::Path};

use crate::types::HoplinkConfig;
use crate::validate::validate_config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config format")]
    UnsupportedFormat,
    #[error("validation: {0}")]
    Validation(String),
}

/// Load a configuration document, picking the parser by file extension.
///
/// Structural validation errors fail the load. Non-fatal warnings are the
/// caller's concern through [`validate_config`].
pub fn load_config(path: impl AsRef<Path>) -> Result<HoplinkConfig, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)?;
    let config: HoplinkConfig = match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
        "json" | "jsonc" => {
            let stripped = json_comments::StripComments::new(data.as_bytes());
            serde_json::from_reader(stripped)?
        }
        "yaml" | "yml" => serde_yaml::from_str(&data)?,
        "toml" => toml::from_str(&data)?,
        _ => return Err(ConfigError::UnsupportedFormat),
    };
    validate_config(&config).map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(config)
}
