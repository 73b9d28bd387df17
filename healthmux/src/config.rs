//! Server configuration.
//!
//! Defaults are overridden by environment variables read once at startup:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `HEALTHMUX_ADDR` | [`ServerConfig::addr`] | `0.0.0.0:50051` |
//! | `PORT` | port of [`ServerConfig::addr`], when `HEALTHMUX_ADDR` is unset | `50051` |
//! | `HEALTHMUX_WATCH_UPDATES` | [`ServerConfig::watch_updates`] | `5` |
//! | `HEALTHMUX_WATCH_INTERVAL_MS` | [`ServerConfig::watch_interval`] | `2000` |
//! | `HEALTHMUX_MAX_REQUEST_BYTES` | [`ServerConfig::max_request_bytes`] | 4 MiB |

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

pub const ADDR_ENV: &str = "HEALTHMUX_ADDR";
pub const PORT_ENV: &str = "PORT";
pub const WATCH_UPDATES_ENV: &str = "HEALTHMUX_WATCH_UPDATES";
pub const WATCH_INTERVAL_ENV: &str = "HEALTHMUX_WATCH_INTERVAL_MS";
pub const MAX_REQUEST_BYTES_ENV: &str = "HEALTHMUX_MAX_REQUEST_BYTES";

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_WATCH_UPDATES: usize = 5;
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(2);
/// Default request body limit (4 MB), matching gRPC's default receive limit.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

impl ConfigError {
    /// The environment variable that held the bad value.
    pub fn key(&self) -> &'static str {
        self.key
    }
}

/// Server-wide settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the single listener binds to.
    pub addr: SocketAddr,
    /// Number of updates a `Watch` call sends before ending.
    pub watch_updates: usize,
    /// Pause between two `Watch` updates.
    pub watch_interval: Duration,
    /// Largest JSON request body accepted.
    pub max_request_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            watch_updates: DEFAULT_WATCH_UPDATES,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ADDR_ENV) {
            config.addr = parse(ADDR_ENV, addr)?;
        } else if let Some(port) = lookup(PORT_ENV) {
            config.addr.set_port(parse(PORT_ENV, port)?);
        }
        if let Some(updates) = lookup(WATCH_UPDATES_ENV) {
            config.watch_updates = parse(WATCH_UPDATES_ENV, updates)?;
        }
        if let Some(millis) = lookup(WATCH_INTERVAL_ENV) {
            config.watch_interval = Duration::from_millis(parse(WATCH_INTERVAL_ENV, millis)?);
        }
        if let Some(bytes) = lookup(MAX_REQUEST_BYTES_ENV) {
            config.max_request_bytes = parse(MAX_REQUEST_BYTES_ENV, bytes)?;
        }

        Ok(config)
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn watch_updates(mut self, updates: usize) -> Self {
        self.watch_updates = updates;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(err) => Err(ConfigError {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}
