//! Log output setup.

use tracing_subscriber::EnvFilter;

use crate::ServerConfig;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when set. Output is JSON lines
/// when `config.log_json` is on, human-readable otherwise. Calling it twice
/// is harmless; the second call does nothing.
pub fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
