use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub jira: JiraConfig,
    pub github: GitHubConfig,
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    pub domain: String,
    pub email: String,
    #[serde(default)]
    pub api_token: String,
    pub project: String,
}

#[derive(Debug, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: String,
    pub owner: String,
    pub repository: String,
    pub project: String,
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
}

#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Path of the user mapping document, relative to the config file.
    pub mapping: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// PEM certificate chain; with `key`, the listener serves HTTPS.
    #[serde(default)]
    pub cert: Option<PathBuf>,
    /// PEM private key matching `cert`.
    #[serde(default)]
    pub key: Option<PathBuf>,
}

impl ListenerConfig {
    /// Certificate and key paths when TLS is configured.
    pub fn tls_files(&self) -> Option<(&Path, &Path)> {
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            queue_capacity: default_queue_capacity(),
            cert: None,
            key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_status_field")]
    pub status_field: String,
    /// Close target issues whose source task is Done.
    #[serde(default)]
    pub close_done: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            status_field: default_status_field(),
            close_done: false,
        }
    }
}

fn default_issue_type() -> String {
    "Task".into()
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    1988
}

fn default_queue_capacity() -> usize {
    16
}

fn default_status_field() -> String {
    "Status".into()
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".board-bridge")
        .join("config.toml")
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SyncError::config(format!("failed to read config from {}: {e}", path.display()))
    })?;
    let mut config: AppConfig = toml::from_str(&contents)
        .map_err(|e| SyncError::config(format!("failed to parse {}: {e}", path.display())))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.bridge.mapping = relative_to(base, config.bridge.mapping);
    config.listener.cert = config.listener.cert.map(|p| relative_to(base, p));
    config.listener.key = config.listener.key.map(|p| relative_to(base, p));
    if config.listener.cert.is_some() != config.listener.key.is_some() {
        return Err(SyncError::config(
            "listener.cert and listener.key must be set together",
        ));
    }

    config.jira.api_token = secret_or_env(config.jira.api_token, "JIRA_API_TOKEN")?;
    config.github.token = secret_or_env(config.github.token, "GITHUB_TOKEN")?;

    if config.listener.queue_capacity == 0 {
        return Err(SyncError::config("listener.queue_capacity must be at least 1"));
    }

    Ok(config)
}

fn relative_to(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

fn secret_or_env(value: String, var: &str) -> Result<String> {
    if !value.is_empty() {
        return Ok(value);
    }
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(SyncError::config(format!(
            "no credential configured and {var} is not set"
        ))),
    }
}
