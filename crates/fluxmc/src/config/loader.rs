use std::path::{Path, PathBuf};

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;
use crate::sanitize::safe_relative_path;

/// Loads a config file. `.json` files are parsed as JSON, anything else as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let config: Config = serde_json::from_str(&content)?;
        validate_config(&config)?;
        return Ok(config);
    }

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content)?
    };

    validate_config(&config)?;

    Ok(config)
}

/// `<config dir>/fluxmc/config.yaml`, e.g. `~/.config/fluxmc/config.yaml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fluxmc").join("config.yaml"))
}

/// Loads the config at `path`, or the default location when `path` is `None`.
///
/// A missing file at the default location yields the default config; an explicit
/// path must exist.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.is_file() => {
            log::debug!("Loading config from {}", path.display());
            load_config(&path)
        }
        _ => Ok(Config::default()),
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.publish.branch.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "publish.branch must not be empty".to_string(),
        });
    }

    if config.publish.commit_message.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "publish.commitMessage must not be empty".to_string(),
        });
    }

    if config.publish.author_name.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "publish.authorName must not be empty".to_string(),
        });
    }

    for (field, value) in [
        ("publish.subdirectory", &config.publish.subdirectory),
        ("sync.appsDirectory", &config.sync.apps_directory),
    ] {
        if safe_relative_path(Path::new(value)).is_none() {
            return Err(ConfigError::InvalidPath {
                field: field.to_string(),
                value: value.clone(),
            });
        }
    }

    Ok(())
}
