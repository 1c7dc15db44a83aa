//! Server configuration: a YAML file, then `LANGSERVER_*` environment overrides.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Deserializer};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log every LSP request and notification.
    pub activate_rpc_log: bool,
    pub prometheus_url: Option<String>,
    /// Serve the REST API on this port instead of LSP when non zero.
    pub rest_api_port: u16,
    pub rest_api_prefix: String,
    /// Speak LSP over WebSocket on this port instead of stdio when non zero.
    pub websocket_port: u16,
    pub log_format: LogFormat,
    #[serde(deserialize_with = "duration")]
    pub metadata_lookback_interval: Duration,
    #[serde(deserialize_with = "duration")]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activate_rpc_log: false,
            prometheus_url: None,
            rest_api_port: 0,
            rest_api_prefix: String::new(),
            websocket_port: 0,
            log_format: LogFormat::Text,
            metadata_lookback_interval: Duration::from_secs(12 * 3600),
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    promls_parser::parse_duration(&text).map_err(serde::de::Error::custom)
}

impl Config {
    /// Read `path` if given, then apply the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or an environment
    /// variable holds an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML, unknown fields or bad durations.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Override fields from `LANGSERVER_*` variables found by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("LANGSERVER_ACTIVATERPCLOG") {
            self.activate_rpc_log = parse_bool("LANGSERVER_ACTIVATERPCLOG", &value)?;
        }
        if let Some(value) = lookup("LANGSERVER_PROMETHEUSURL") {
            self.prometheus_url = Some(value).filter(|url| !url.is_empty());
        }
        if let Some(value) = lookup("LANGSERVER_RESTAPIPORT") {
            self.rest_api_port = parse_port("LANGSERVER_RESTAPIPORT", &value)?;
        }
        if let Some(value) = lookup("LANGSERVER_WEBSOCKETPORT") {
            self.websocket_port = parse_port("LANGSERVER_WEBSOCKETPORT", &value)?;
        }
        if let Some(value) = lookup("LANGSERVER_RESTAPIPREFIX") {
            self.rest_api_prefix = value;
        }
        if let Some(value) = lookup("LANGSERVER_LOGFORMAT") {
            self.log_format = match value.trim().to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(invalid(
                        "LANGSERVER_LOGFORMAT",
                        &value,
                        format!("unknown format {other:?}, expected text or json"),
                    ));
                }
            };
        }
        if let Some(value) = lookup("LANGSERVER_METADATALOOKBACKINTERVAL") {
            self.metadata_lookback_interval =
                parse_duration("LANGSERVER_METADATALOOKBACKINTERVAL", &value)?;
        }
        if let Some(value) = lookup("LANGSERVER_REQUESTTIMEOUT") {
            self.request_timeout = parse_duration("LANGSERVER_REQUESTTIMEOUT", &value)?;
        }
        Ok(())
    }

    /// REST prefix normalised to `/segment` form, empty for the root.
    #[must_use]
    pub fn rest_prefix(&self) -> String {
        let trimmed = self.rest_api_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

fn invalid(name: &'static str, value: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason,
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(name, value, "expected a boolean".to_string())),
    }
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| invalid(name, value, err.to_string()))
}

fn parse_duration(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    promls_parser::parse_duration(value.trim()).map_err(|err| invalid(name, value, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() -> Result<(), ConfigError> {
        let config = Config::from_yaml("")?;
        assert_eq!(config, Config::default());
        assert_eq!(
            config.metadata_lookback_interval,
            Duration::from_secs(43_200)
        );
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.rest_prefix(), "");
        Ok(())
    }

    #[test]
    fn test_yaml_file() -> Result<(), ConfigError> {
        let config = Config::from_yaml(
            "activate_rpc_log: true
prometheus_url: http://localhost:9090
rest_api_port: 8080
rest_api_prefix: api/
websocket_port: 7070
log_format: json
metadata_lookback_interval: 1w
request_timeout: 1m30s
",
        )?;
        assert!(config.activate_rpc_log);
        assert_eq!(config.prometheus_url.as_deref(), Some("http://localhost:9090"));
        assert_eq!(config.rest_api_port, 8080);
        assert_eq!(config.rest_prefix(), "/api");
        assert_eq!(config.websocket_port, 7070);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.metadata_lookback_interval,
            Duration::from_secs(604_800)
        );
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        Ok(())
    }

    #[test]
    fn test_unknown_fields_and_bad_durations_are_rejected() {
        assert!(matches!(
            Config::from_yaml("prometheus: x"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_yaml("request_timeout: soon"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_environment_overrides_file() -> Result<(), ConfigError> {
        let mut config = Config::from_yaml("rest_api_port: 8080\nlog_format: json")?;
        config.apply_env(env(&[
            ("LANGSERVER_RESTAPIPORT", "0"),
            ("LANGSERVER_LOGFORMAT", "TEXT"),
            ("LANGSERVER_ACTIVATERPCLOG", "1"),
            ("LANGSERVER_PROMETHEUSURL", "http://prom:9090"),
            ("LANGSERVER_METADATALOOKBACKINTERVAL", "2h"),
            ("LANGSERVER_WEBSOCKETPORT", " 7070 "),
        ]))?;
        assert_eq!(config.rest_api_port, 0);
        assert_eq!(config.websocket_port, 7070);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.activate_rpc_log);
        assert_eq!(config.prometheus_url.as_deref(), Some("http://prom:9090"));
        assert_eq!(
            config.metadata_lookback_interval,
            Duration::from_secs(7200)
        );
        Ok(())
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("LANGSERVER_RESTAPIPORT", "http")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid {
                name: "LANGSERVER_RESTAPIPORT",
                ..
            })
        ));
        let err = config.apply_env(env(&[("LANGSERVER_WEBSOCKETPORT", "70000")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid {
                name: "LANGSERVER_WEBSOCKETPORT",
                ..
            })
        ));
        let err = config.apply_env(env(&[("LANGSERVER_REQUESTTIMEOUT", "5 minutes")]));
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
    }
}
