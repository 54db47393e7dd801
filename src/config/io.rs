use std::path::{Path, PathBuf};

use crate::app_dirs;

use super::types::{ConfigError, SessionSettings};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings file path inside the app root, which is created if needed.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load settings, returning defaults when no file exists yet.
pub fn load_or_default() -> Result<SessionSettings, ConfigError> {
    load_from(&config_path()?)
}

pub fn save(settings: &SessionSettings) -> Result<(), ConfigError> {
    save_to_path(settings, &config_path()?)
}

pub fn load_from(path: &Path) -> Result<SessionSettings, ConfigError> {
    if !path.exists() {
        return Ok(SessionSettings::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
        .map(SessionSettings::normalized)
}

/// Write settings, creating parent directories as needed.
pub fn save_to_path(settings: &SessionSettings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(settings).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => {
            ConfigError::CreateDir { path, source }
        }
    }
}
