// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from JSON and YAML files.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::types::AppConfig;

/// Workspace config file names, in search order.
pub const CONFIG_FILES: &[&str] = &["agentlink.json", "agentlink.yaml", "agentlink.yml"];

/// Global config directory name under the home directory.
pub const GLOBAL_CONFIG_DIR: &str = ".agentlink";

pub const GLOBAL_CONFIG_FILE: &str = "config.json";

pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Find the config file for a directory.
///
/// Workspace files win over the global file.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
        .or_else(|| global_config_path().filter(|path| path.exists()))
}

/// Load a configuration file (JSON or YAML by extension).
pub fn load_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "Loading config");

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let config: AppConfig = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    if config.default_timeout_ms == 0 {
        return Err(ConfigError::invalid("default_timeout_ms", "must be greater than zero"));
    }
    Ok(config)
}

/// Load the config for a directory, or `None` when no file exists.
pub fn load_config(dir: &Path) -> Result<Option<AppConfig>, ConfigError> {
    find_config_file(dir)
        .map(|path| load_config_file(&path))
        .transpose()
}
