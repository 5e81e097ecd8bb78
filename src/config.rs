//! TOML configuration. Every field has a default, so an empty file is valid.

use crate::runtime::RuntimeConfig;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown transport mode {0:?} (expected \"stdio\" or \"socket\")")]
    UnknownMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Stdio,
    Socket,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Mode::Stdio),
            "socket" => Ok(Mode::Socket),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub runtime: Runtime,
    pub sse: Sse,
    pub http: Http,
    pub websocket: WebSocket,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub modes: Vec<Mode>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Runtime {
    pub poll_timeout_ms: u64,
    pub read_buffer_size: usize,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Sse {
    /// GET requests whose path starts with this open an event stream.
    pub prefix: String,
    /// Path announced in the `endpoint` event.
    pub messages_path: String,
    pub keep_alive_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Http {
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct WebSocket {
    pub max_payload_bytes: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            modes: vec![Mode::Socket],
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            read_buffer_size: 8192,
        }
    }
}

impl Default for Sse {
    fn default() -> Self {
        Self {
            prefix: "/sse".to_string(),
            messages_path: "/messages".to_string(),
            keep_alive_secs: 15,
            max_lifetime_secs: 3600,
        }
    }
}

impl Default for Http {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl Default for WebSocket {
    fn default() -> Self {
        Self {
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;

        contents.parse()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            poll_timeout: Duration::from_millis(self.runtime.poll_timeout_ms),
            read_buffer_size: self.runtime.read_buffer_size.max(1),
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = "".parse().unwrap();

        assert_eq!(config.address(), "0.0.0.0:8081");
        assert_eq!(config.server.modes, vec![Mode::Socket]);
        assert_eq!(config.sse.prefix, "/sse");
        assert_eq!(config.runtime_config().poll_timeout, Duration::from_millis(100));
    }

    #[test]
    fn sections_override_individual_fields() {
        let config: Config = r#"
            [server]
            port = 9000
            modes = ["stdio", "socket"]

            [sse]
            keep_alive_secs = 5
        "#
        .parse()
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.modes, vec![Mode::Stdio, Mode::Socket]);
        assert_eq!(config.sse.keep_alive_secs, 5);
        assert_eq!(config.sse.max_lifetime_secs, 3600);
    }

    #[test]
    fn unknown_modes_are_rejected() {
        assert!("[server]\nmodes = [\"carrier-pigeon\"]".parse::<Config>().is_err());
        assert!(matches!("pigeon".parse::<Mode>(), Err(Error::UnknownMode(_))));
        assert_eq!(" Stdio ".parse::<Mode>().unwrap(), Mode::Stdio);
    }
}
