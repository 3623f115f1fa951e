//! Process-wide setup, run once before any release is handled.

use regpub_config::config::Config;
use regpub_dl::http_client::configure_http_client;
use tracing::debug;

use crate::logging::{setup_logging, LogOptions};

/// Rebuilds the shared download agent with the configured timeout.
pub fn apply_http_settings(config: &Config) {
    let timeout = config.http_timeout();
    configure_http_client(|client| client.timeout = Some(timeout));
    debug!(timeout_secs = timeout.as_secs(), "configured http client");
}

/// Installs logging, then applies the HTTP settings of `config`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(config: &Config, log: &LogOptions) -> bool {
    let installed = setup_logging(log);
    apply_http_settings(config);
    installed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use regpub_dl::http_client::client_config;
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_apply_http_settings_sets_timeout() {
        let config = Config {
            http_timeout: Some(7),
            ..Config::default_config()
        };

        apply_http_settings(&config);
        assert_eq!(client_config().timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    #[serial]
    fn test_init_applies_http_settings() {
        let config = Config {
            http_timeout: Some(45),
            ..Config::default_config()
        };

        init(&config, &LogOptions::default());
        assert_eq!(client_config().timeout, Some(Duration::from_secs(45)));
    }
}
