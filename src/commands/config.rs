use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{CopilotError, Result};
use crate::state::AppState;
use crate::util::{app_dir, expand_tilde};

pub const DEFAULT_CACHE_VERSION: &str = "14.24.1";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DDRAGON_BASE: &str = "https://ddragon.leagueoflegends.com";
pub const DEFAULT_SESSION_URL: &str = "http://localhost:8000/state";
pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:8000";
/// Floor for `pollIntervalMs`; smaller values would hammer the bridge.
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_true")]
    pub web_search: bool,
    /// Manually pinned game version mixed into every cache fingerprint.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    #[serde(default = "default_session_url")]
    pub session_url: String,
    /// Session poll period in milliseconds. Values below
    /// [`MIN_POLL_INTERVAL_MS`] are raised to it.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_ddragon_base")]
    pub ddragon_base: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// League install directory. Enables the built-in LCU bridge when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub league_path: Option<String>,
    #[serde(default = "default_bridge_addr")]
    pub bridge_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    1
}
fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_gemini_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.into()
}
fn default_true() -> bool {
    true
}
fn default_cache_version() -> String {
    DEFAULT_CACHE_VERSION.into()
}
fn default_session_url() -> String {
    DEFAULT_SESSION_URL.into()
}
fn default_poll_interval_ms() -> u64 {
    1500
}
fn default_ddragon_base() -> String {
    DEFAULT_DDRAGON_BASE.into()
}
fn default_locale() -> String {
    "zh_CN".into()
}
fn default_bridge_addr() -> String {
    DEFAULT_BRIDGE_ADDR.into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            api_key: None,
            model: default_model(),
            gemini_base_url: default_gemini_base_url(),
            web_search: true,
            cache_version: default_cache_version(),
            cache_dir: None,
            session_url: default_session_url(),
            poll_interval_ms: default_poll_interval_ms(),
            ddragon_base: default_ddragon_base(),
            locale: default_locale(),
            league_path: None,
            bridge_addr: default_bridge_addr(),
            log_level: default_log_level(),
        }
    }
}

impl CopilotConfig {
    /// API key from the config file, falling back to `GEMINI_API_KEY` then `API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Directory holding the strategy cache file.
    pub fn cache_dir(&self) -> PathBuf {
        match self.cache_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(expand_tilde(dir)),
            _ => app_dir()
                .unwrap_or_else(|| PathBuf::from(".lcu-copilot"))
                .join("cache"),
        }
    }

    /// Effective poll period, clamped to [`MIN_POLL_INTERVAL_MS`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// League install directory with `~` expanded, if configured.
    pub fn league_dir(&self) -> Option<PathBuf> {
        self.league_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(expand_tilde(p)))
    }
}

fn config_path() -> Option<PathBuf> {
    app_dir().map(|d| d.join("config.json"))
}

/// Read a config file. A missing file yields the defaults; a corrupt one is
/// an error so the caller can report it once logging is up.
pub fn read_config_from(path: &Path) -> Result<CopilotConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CopilotConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn write_config_to(path: &Path, config: &CopilotConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load `~/.lcu-copilot/config.json`, or the defaults.
pub fn read_config() -> Result<CopilotConfig> {
    match config_path() {
        Some(path) => read_config_from(&path),
        None => Ok(CopilotConfig::default()),
    }
}

#[tauri::command]
pub async fn load_config(app: tauri::State<'_, AppState>) -> Result<CopilotConfig> {
    Ok(app.config().await)
}

#[tauri::command]
pub async fn save_settings(
    settings: CopilotConfig,
    app: tauri::State<'_, AppState>,
) -> Result<CopilotConfig> {
    let path = config_path()
        .ok_or_else(|| CopilotError::Custom("Cannot find home directory".into()))?;

    write_config_to(&path, &settings)?;
    info!(path = %path.display(), "Settings saved");

    app.replace_config(settings.clone()).await;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: CopilotConfig =
            serde_json::from_str(r#"{"apiKey":"k","webSearch":false,"pollIntervalMs":500}"#)
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert!(!config.web_search);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.cache_version, DEFAULT_CACHE_VERSION);
        assert_eq!(config.session_url, DEFAULT_SESSION_URL);
        assert_eq!(config.locale, "zh_CN");
        assert_eq!(config.version, 1);
    }

    #[test]
    fn test_missing_file_defaults_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(read_config_from(&path).unwrap(), CopilotConfig::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_config_from(&path), Err(CopilotError::Json(_))));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = CopilotConfig {
            league_path: Some("C:/Riot Games/League of Legends".into()),
            cache_version: "15.1.1".into(),
            ..CopilotConfig::default()
        };
        write_config_to(&path, &config).unwrap();
        assert_eq!(read_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_poll_interval_floor() {
        let fast = CopilotConfig {
            poll_interval_ms: 10,
            ..CopilotConfig::default()
        };
        assert_eq!(fast.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
        assert_eq!(
            CopilotConfig::default().poll_interval(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_config_api_key_wins_over_env() {
        let config = CopilotConfig {
            api_key: Some("from-config".into()),
            ..CopilotConfig::default()
        };
        assert_eq!(config.resolved_api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_cache_dir_override() {
        let config = CopilotConfig {
            cache_dir: Some("/tmp/copilot-cache".into()),
            ..CopilotConfig::default()
        };
        assert!(config.cache_dir().ends_with("copilot-cache"));
        assert!(CopilotConfig::default().cache_dir().ends_with("cache"));
    }
}
