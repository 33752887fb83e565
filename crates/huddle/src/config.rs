//! Server configuration.
//!
//! Every setting has a default, so an empty config file (or none at all)
//! gives a working server on port 8080. The binary layers sources with
//! `figment`, later ones overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. `huddle.toml` in the working directory, or the file named by
//!    `HUDDLE_CONFIG`
//! 3. `HUDDLE_`-prefixed environment variables, with `__` separating
//!    nested keys (`HUDDLE_ROOM__HISTORY_LIMIT=500`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use huddle_room::RoomConfig;
use huddle_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::HuddleError;

/// Config file read when `HUDDLE_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "huddle.toml";

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP + WebSocket listener binds to.
    pub bind: String,

    /// Log filter used when `RUST_LOG` is not set, e.g. `"info"` or
    /// `"huddle=debug,tower_http=info"`.
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,

    /// Close connections that send nothing for this many seconds. 0 disables
    /// the timeout.
    pub idle_timeout_secs: u64,

    /// Events that may queue for one connection before it is dropped as a
    /// slow consumer.
    pub outbox_capacity: usize,

    /// How often expired sessions are swept out of their rooms.
    pub sweep_interval_secs: u64,

    pub session: SessionConfig,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            idle_timeout_secs: 300,
            outbox_capacity: 256,
            sweep_interval_secs: 5,
            session: SessionConfig::default(),
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from defaults, the config file and the
    /// environment.
    pub fn load() -> Result<Self, HuddleError> {
        let path = std::env::var_os("HUDDLE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Like [`load`](Self::load), reading `path` as the config file.
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn load_from(path: &Path) -> Result<Self, HuddleError> {
        let config = Self::figment(path).extract()?;
        Ok(config)
    }

    /// The layered figment behind [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HUDDLE_").split("__"))
    }

    /// The idle read timeout, or `None` if disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// The session sweep period. Never zero.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
