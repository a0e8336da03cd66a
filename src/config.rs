//! Configuration stored in ~/.crowdpix/config.json.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub firebase: FirebaseConfig,
    /// Log filter in `env_logger` syntax; `RUST_LOG` overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

/// Firebase project settings for the REST adapters.
///
/// Accepts both camelCase (app settings export) and snake_case
/// (`firebase_config.json` from the console) key spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    #[serde(alias = "api_key")]
    pub api_key: String,
    #[serde(alias = "project_id")]
    pub project_id: String,
    /// Host:port of a local Auth emulator, e.g. "127.0.0.1:9099".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_emulator_host: Option<String>,
    /// Host:port of a local Firestore emulator, e.g. "127.0.0.1:8080".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firestore_emulator_host: Option<String>,
}

/// Get the canonical config file path (~/.crowdpix/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".crowdpix").join("config.json"))
}

/// Load configuration from ~/.crowdpix/config.json
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;

    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"firebase\": {{ \"apiKey\": \"...\", \"projectId\": \"...\" }} }}",
            path.display()
        ));
    }

    load_config_from(&path)
}

/// Load and validate configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if config.firebase.api_key.trim().is_empty() {
        return Err("firebase.apiKey is empty".to_string());
    }
    if config.firebase.project_id.trim().is_empty() {
        return Err("firebase.projectId is empty".to_string());
    }

    Ok(config)
}

/// Initialize the global logger.
///
/// Precedence: `RUST_LOG` env var, then the config's `logFilter`, then
/// "info". Safe to call once at startup; later calls are ignored by
/// env_logger.
pub fn init_logging(config: Option<&Config>) {
    let default_filter = config
        .and_then(|c| c.log_filter.as_deref())
        .unwrap_or("info");
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config_round_trip() {
        let file = write_config(
            r#"{
                "firebase": {
                    "apiKey": "AIzaTest",
                    "projectId": "crowdpix-dev",
                    "authEmulatorHost": "127.0.0.1:9099"
                },
                "logFilter": "crowdpix_lib=debug"
            }"#,
        );

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.firebase.api_key, "AIzaTest");
        assert_eq!(config.firebase.project_id, "crowdpix-dev");
        assert_eq!(
            config.firebase.auth_emulator_host.as_deref(),
            Some("127.0.0.1:9099")
        );
        assert!(config.firebase.firestore_emulator_host.is_none());
        assert_eq!(config.log_filter.as_deref(), Some("crowdpix_lib=debug"));
    }

    #[test]
    fn test_load_config_accepts_console_key_spelling() {
        let file = write_config(
            r#"{ "firebase": { "api_key": "AIzaTest", "project_id": "crowdpix-dev" } }"#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.firebase.project_id, "crowdpix-dev");
    }

    #[test]
    fn test_load_config_rejects_missing_project() {
        let file = write_config(r#"{ "firebase": { "apiKey": "AIzaTest", "projectId": " " } }"#);
        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.contains("projectId"));
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let file = write_config("not json");
        let err = load_config_from(file.path()).unwrap_err();
        assert!(err.contains("parse"));
    }
}
