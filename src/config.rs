use std::ffi::OsString;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub jira: JiraConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    pub base_url: String,
    /// Account the bridge acts as. Webhook events triggered by this user
    /// are suppressed to break feedback loops.
    pub username: String,
    pub api_token: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Default)]
pub struct AppConfigOverrides {
    pub jira_base_url: Option<String>,
    pub jira_username: Option<String>,
    pub jira_api_token: Option<String>,
    pub webhook_bind_addr: Option<String>,
    pub metrics_interval_secs: Option<u64>,
    pub logging_debug: Option<bool>,
}

impl AppConfigOverrides {
    /// Collects overrides from the environment, for container deployments
    /// that prefer env vars over editing the config file.
    pub fn from_env() -> Self {
        Self {
            jira_base_url: std::env::var("JIRA_BRIDGE_URL").ok(),
            jira_username: std::env::var("JIRA_BRIDGE_USERNAME").ok(),
            jira_api_token: std::env::var("JIRA_BRIDGE_API_TOKEN").ok(),
            webhook_bind_addr: std::env::var("JIRA_BRIDGE_BIND_ADDR").ok(),
            metrics_interval_secs: std::env::var("JIRA_BRIDGE_METRICS_INTERVAL_SECS")
                .ok()
                .and_then(|value| value.parse().ok()),
            logging_debug: std::env::var("JIRA_BRIDGE_DEBUG")
                .ok()
                .map(|value| matches!(value.trim(), "1" | "true" | "yes")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {path}. expected at $XDG_CONFIG_HOME/jira-bridge/config.toml or ~/.config/jira-bridge/config.toml")]
    MissingConfigFile { path: PathBuf },
    #[error("failed to resolve config path: HOME is not set and XDG_CONFIG_HOME is unset")]
    MissingHomeDirectory,
    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load() -> Result<AppConfig, ConfigError> {
    let path = resolve_config_path()?;
    load_from(&path)
}

pub fn load_from(path: &std::path::Path) -> Result<AppConfig, ConfigError> {
    let path = path.to_path_buf();
    let raw = std::fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingConfigFile { path: path.clone() }
        } else {
            ConfigError::ReadFailed {
                path: path.clone(),
                source,
            }
        }
    })?;

    let cfg = toml::from_str::<AppConfig>(&raw).map_err(|source| ConfigError::ParseFailed {
        path: path.clone(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME");
    let home = std::env::var_os("HOME");
    resolve_config_path_from_env(xdg_config_home, home)
}

fn resolve_config_path_from_env(
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = xdg_config_home.filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir).join("jira-bridge").join("config.toml"));
    }

    let home = home
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingHomeDirectory)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("jira-bridge")
        .join("config.toml"))
}

impl AppConfig {
    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) -> Result<(), ConfigError> {
        if let Some(value) = &overrides.jira_base_url {
            self.jira.base_url = value.clone();
        }
        if let Some(value) = &overrides.jira_username {
            self.jira.username = value.clone();
        }
        if let Some(value) = &overrides.jira_api_token {
            self.jira.api_token = value.clone();
        }
        if let Some(value) = &overrides.webhook_bind_addr {
            self.webhook.bind_addr = value.clone();
        }
        if let Some(value) = overrides.metrics_interval_secs {
            self.metrics.interval_secs = value;
        }
        if let Some(value) = overrides.logging_debug {
            self.logging.debug = value;
        }

        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.base_url must not be empty".into(),
            ));
        }
        if self.jira.username.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.username must not be empty".into(),
            ));
        }
        if self.jira.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.api_token must not be empty".into(),
            ));
        }
        if self.webhook.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "webhook.bind_addr must not be empty".into(),
            ));
        }
        if self.metrics.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "metrics.interval_secs must be > 0".into(),
            ));
        }

        Ok(())
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8484".to_string()
}

const fn default_metrics_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_path_prefers_xdg_config_home() {
        let path = resolve_config_path_from_env(
            Some(OsString::from("/tmp/xdg-home")),
            Some(OsString::from("/tmp/home")),
        )
        .expect("xdg path should resolve");

        assert_eq!(path, PathBuf::from("/tmp/xdg-home/jira-bridge/config.toml"));
    }

    #[test]
    fn resolve_path_falls_back_to_home_dot_config() {
        let path = resolve_config_path_from_env(None, Some(OsString::from("/tmp/home")))
            .expect("home path should resolve");

        assert_eq!(
            path,
            PathBuf::from("/tmp/home/.config/jira-bridge/config.toml")
        );
    }

    #[test]
    fn resolve_path_requires_home_when_xdg_missing() {
        let err = resolve_config_path_from_env(None, None).expect_err("resolution should fail");
        assert!(matches!(err, ConfigError::MissingHomeDirectory));
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let raw = r#"
            [jira]
            base_url = "https://example.atlassian.net"
            username = ""
            api_token = "token"
        "#;

        let cfg: AppConfig = toml::from_str(raw).expect("toml should parse");
        let err = cfg.validate().expect_err("empty username should fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validate_rejects_zero_metrics_interval() {
        let raw = r#"
            [jira]
            base_url = "https://example.atlassian.net"
            username = "integration-bot"
            api_token = "token"

            [metrics]
            interval_secs = 0
        "#;

        let cfg: AppConfig = toml::from_str(raw).expect("toml should parse");
        let err = cfg.validate().expect_err("zero interval should fail");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let raw = r#"
            [jira]
            base_url = "https://example.atlassian.net"
            username = "integration-bot"
            api_token = "token"
        "#;

        let cfg: AppConfig = toml::from_str(raw).expect("toml should parse");
        cfg.validate().expect("defaults should validate");
        assert_eq!(cfg.webhook.bind_addr, "127.0.0.1:8484");
        assert_eq!(cfg.metrics.interval_secs, 60);
        assert!(!cfg.logging.debug);
    }

    #[test]
    fn config_example_parses() {
        let raw = include_str!("../config.example.toml");
        let cfg: AppConfig = toml::from_str(raw).expect("example config should parse");
        cfg.validate().expect("example config should validate");
    }

    #[test]
    fn apply_overrides_updates_values() {
        let raw = include_str!("../config.example.toml");
        let mut cfg: AppConfig = toml::from_str(raw).expect("example config should parse");

        let overrides = AppConfigOverrides {
            jira_base_url: Some("https://override.atlassian.net".into()),
            jira_username: Some("override-bot".into()),
            jira_api_token: Some("override-token".into()),
            webhook_bind_addr: Some("0.0.0.0:9000".into()),
            metrics_interval_secs: Some(15),
            logging_debug: Some(true),
        };

        cfg.apply_overrides(&overrides)
            .expect("overrides should validate");

        assert_eq!(cfg.jira.base_url, "https://override.atlassian.net");
        assert_eq!(cfg.jira.username, "override-bot");
        assert_eq!(cfg.jira.api_token, "override-token");
        assert_eq!(cfg.webhook.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.metrics.interval_secs, 15);
        assert!(cfg.logging.debug);
    }
}
