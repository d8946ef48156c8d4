//! Process configuration assembled from environment variables.

use crate::protocol::models::{DEFAULT_MODEL, DEFAULT_VOICE};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub voicelive: VoiceLiveConfig,
    /// Present when an Azure AI Search index is configured.
    pub search: Option<SearchConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Frontend assets; served at `/` when the directory exists.
    pub static_dir: PathBuf,
}

/// Upstream voice service settings.
#[derive(Debug, Clone)]
pub struct VoiceLiveConfig {
    /// Required at session start, not at boot.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub instructions_path: PathBuf,
    /// Bound on each wait of the tool-call handshake.
    pub tool_call_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "voicelive_bridge=debug,info".
    pub level: String,
    pub json: bool,
}

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TOOL_CALL_TIMEOUT_SECS: u64 = 30;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for VoiceLiveConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions_path: PathBuf::from("shared/instructions.txt"),
            tool_call_timeout: Duration::from_secs(DEFAULT_TOOL_CALL_TIMEOUT_SECS),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid { name: &'static str, value: String, reason: String },

    #[error("{present} is set but {missing} is not")]
    Incomplete { present: &'static str, missing: &'static str },
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// Recognised variables: `BRIDGE_HOST`, `BRIDGE_PORT`, `STATIC_DIR`,
    /// `AZURE_VOICELIVE_ENDPOINT`, `AZURE_VOICELIVE_API_KEY`, `VOICELIVE_MODEL`,
    /// `VOICELIVE_VOICE`, `INSTRUCTIONS_PATH`, `TOOL_CALL_TIMEOUT_SECS`,
    /// `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_INDEX`, `AZURE_SEARCH_API_KEY`,
    /// `LOG_LEVEL` and `LOG_JSON`.
    ///
    /// # Errors
    /// Returns `ConfigError` if a value does not parse or the search settings
    /// are only partially present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(host) = var("BRIDGE_HOST") {
            config.server.host = parse("BRIDGE_HOST", &host)?;
        }
        if let Some(port) = var("BRIDGE_PORT") {
            config.server.port = parse("BRIDGE_PORT", &port)?;
        }
        if let Some(dir) = var("STATIC_DIR") {
            config.server.static_dir = PathBuf::from(dir);
        }

        config.voicelive.endpoint = var("AZURE_VOICELIVE_ENDPOINT");
        config.voicelive.api_key = var("AZURE_VOICELIVE_API_KEY");
        if let Some(model) = var("VOICELIVE_MODEL") {
            config.voicelive.model = model;
        }
        if let Some(voice) = var("VOICELIVE_VOICE") {
            config.voicelive.voice = voice;
        }
        if let Some(path) = var("INSTRUCTIONS_PATH") {
            config.voicelive.instructions_path = PathBuf::from(path);
        }
        if let Some(secs) = var("TOOL_CALL_TIMEOUT_SECS") {
            let secs: u64 = parse("TOOL_CALL_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    name: "TOOL_CALL_TIMEOUT_SECS",
                    value: secs.to_string(),
                    reason: "must be at least one second".to_string(),
                });
            }
            config.voicelive.tool_call_timeout = Duration::from_secs(secs);
        }

        config.search = match (var("AZURE_SEARCH_ENDPOINT"), var("AZURE_SEARCH_INDEX")) {
            (Some(endpoint), Some(index)) => Some(SearchConfig {
                endpoint,
                index,
                api_key: var("AZURE_SEARCH_API_KEY").ok_or(ConfigError::Incomplete {
                    present: "AZURE_SEARCH_ENDPOINT",
                    missing: "AZURE_SEARCH_API_KEY",
                })?,
            }),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete {
                    present: "AZURE_SEARCH_ENDPOINT",
                    missing: "AZURE_SEARCH_INDEX",
                });
            }
            (None, _) => None,
        };

        if let Some(level) = var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = var("LOG_JSON") {
            config.logging.json = matches!(json.to_ascii_lowercase().as_str(), "true" | "1" | "yes");
        }

        Ok(config)
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.bind_addr().to_string(), "0.0.0.0:8000");
        assert_eq!(config.voicelive.model, "gpt-4o-realtime");
        assert_eq!(config.voicelive.voice, "pt-BR-FranciscaNeural");
        assert_eq!(config.voicelive.tool_call_timeout, Duration::from_secs(30));
        assert_eq!(config.voicelive.instructions_path, PathBuf::from("shared/instructions.txt"));
        assert!(config.voicelive.endpoint.is_none());
        assert!(config.search.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn overrides_apply() {
        let config = load(&[
            ("BRIDGE_HOST", "127.0.0.1"),
            ("BRIDGE_PORT", "9100"),
            ("AZURE_VOICELIVE_ENDPOINT", "https://voice.example.com"),
            ("AZURE_VOICELIVE_API_KEY", "k"),
            ("VOICELIVE_VOICE", "alloy"),
            ("TOOL_CALL_TIMEOUT_SECS", "5"),
            ("LOG_JSON", "true"),
        ])
        .unwrap();
        assert_eq!(config.server.bind_addr().to_string(), "127.0.0.1:9100");
        assert_eq!(config.voicelive.endpoint.as_deref(), Some("https://voice.example.com"));
        assert_eq!(config.voicelive.voice, "alloy");
        assert_eq!(config.voicelive.tool_call_timeout, Duration::from_secs(5));
        assert!(config.logging.json);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("AZURE_VOICELIVE_API_KEY", "  ")]).unwrap();
        assert!(config.voicelive.api_key.is_none());
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = load(&[("BRIDGE_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BRIDGE_PORT", .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(load(&[("TOOL_CALL_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn search_requires_index_and_key() {
        let err = load(&[("AZURE_SEARCH_ENDPOINT", "https://s.example.net")]).unwrap_err();
        assert!(matches!(err, ConfigError::Incomplete { missing: "AZURE_SEARCH_INDEX", .. }));

        let config = load(&[
            ("AZURE_SEARCH_ENDPOINT", "https://s.example.net"),
            ("AZURE_SEARCH_INDEX", "produtos"),
            ("AZURE_SEARCH_API_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(config.search.unwrap().index, "produtos");
    }
}
