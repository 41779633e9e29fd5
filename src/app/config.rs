use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::LauncherError;

/// The original shared-preferences sentinel for "use the app-private file".
pub const INTERNAL_MAIN_FILE: &str = "internalMainFile";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LauncherSettings {
    /// Open the Play Store listing instead of failing when a privileged
    /// enable is refused.
    pub fallback_to_play_store: bool,
    /// Bump a package toward the front of the list after opening it.
    pub sort_apps_by_usage: bool,
    /// Path of the package document; empty or the legacy sentinel means the
    /// internal file.
    pub launchable_apps_file: String,
    /// Android user the disable command targets.
    pub user_id: i32,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            fallback_to_play_store: false,
            sort_apps_by_usage: false,
            launchable_apps_file: String::new(),
            user_id: 0,
        }
    }
}

impl LauncherSettings {
    pub fn uses_internal_file(&self) -> bool {
        let trimmed = self.launchable_apps_file.trim();
        trimmed.is_empty() || trimmed == INTERNAL_MAIN_FILE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    /// Explicit adb executable path; empty resolves to `adb` on PATH.
    pub command_path: String,
    /// Preferred device serial; empty auto-picks a single attached device.
    pub serial: String,
    pub command_timeout_secs: u64,
    /// Cap on concurrently running device commands.
    pub max_parallel_commands: usize,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            serial: String::new(),
            command_timeout_secs: 10,
            max_parallel_commands: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub launcher: LauncherSettings,
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            launcher: LauncherSettings::default(),
            adb: AdbSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("PARKED_CONFIG_DIR") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parked")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

pub fn backup_config_path() -> PathBuf {
    config_dir().join("config.backup.json")
}

pub fn load_config() -> Result<AppConfig, LauncherError> {
    load_config_from_path(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<(), LauncherError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, LauncherError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| LauncherError::ConfigFailure(format!("Failed to read config: {err}")))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| LauncherError::ConfigFailure(format!("Failed to parse config: {err}")))?;
    let mut config: AppConfig = serde_json::from_value(value.clone()).unwrap_or_default();
    config = apply_legacy_overrides(config, &value);
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), LauncherError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config).map_err(|err| {
        LauncherError::ConfigFailure(format!("Failed to serialize config: {err}"))
    })?;
    fs::write(path, payload)
        .map_err(|err| LauncherError::ConfigFailure(format!("Failed to write config: {err}")))?;
    Ok(())
}

/// The launcher settings were originally flat shared-preferences keys.
/// Documents written by that generation carry the camelCase keys at the top
/// level; honor them so a copied-over file keeps its meaning.
fn apply_legacy_overrides(mut config: AppConfig, value: &serde_json::Value) -> AppConfig {
    if let Some(fallback) = value.get("fallbackToGooglePlay").and_then(|v| v.as_bool()) {
        config.launcher.fallback_to_play_store = fallback;
    }
    if let Some(sort) = value.get("sortAppsByUsage").and_then(|v| v.as_bool()) {
        config.launcher.sort_apps_by_usage = sort;
    }
    if let Some(file) = value.get("launchableAppsFile").and_then(|v| v.as_str()) {
        config.launcher.launchable_apps_file = file.to_string();
    }
    config
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.adb.command_timeout_secs == 0 {
        config.adb.command_timeout_secs = 10;
    }
    if config.adb.max_parallel_commands == 0 {
        config.adb.max_parallel_commands = 4;
    }
    if config.launcher.user_id < 0 {
        config.launcher.user_id = 0;
    }
    config
}
