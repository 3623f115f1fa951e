use std::{
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, RwLock},
    time::Duration,
};

use regpub_utils::path::xdg_config_home;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

pub const DEFAULT_REGISTRY: &str = "bazelbuild/bazel-central-registry";
pub const DEFAULT_AUTOMATION_LOGIN: &str = "github-actions[bot]";

/// Names of the credentials kept in the secrets store.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecretNames {
    pub webhook_app_private_key: String,
    pub webhook_app_client_id: String,
    pub webhook_app_client_secret: String,
    pub bot_app_private_key: String,
    pub bot_app_client_id: String,
    pub bot_app_client_secret: String,
}

impl Default for SecretNames {
    fn default() -> Self {
        Self {
            webhook_app_private_key: "github-app-private-key".into(),
            webhook_app_client_id: "github-app-client-id".into(),
            webhook_app_client_secret: "github-app-client-secret".into(),
            bot_app_private_key: "github-bot-app-private-key".into(),
            bot_app_client_id: "github-bot-app-client-id".into(),
            bot_app_client_secret: "github-bot-app-client-secret".into(),
        }
    }
}

/// Service configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Canonical registry that pull requests target, as `owner/name`.
    /// Default: bazelbuild/bazel-central-registry
    pub registry: Option<String>,

    /// Branch of the canonical registry pull requests target.
    /// Default: main
    pub registry_branch: Option<String>,

    /// Base delay of the artifact download backoff, in milliseconds.
    /// Default: 10000
    pub backoff_delay_factor: Option<u64>,

    /// Download attempts made after the first one fails.
    /// Default: 3
    pub download_retries: Option<u32>,

    /// Total attempts to push an entry branch to a fork.
    /// Default: 5
    pub push_attempts: Option<u32>,

    /// Base delay of the push backoff, in milliseconds.
    /// Default: 1000
    pub push_backoff: Option<u64>,

    /// HTTP timeout per request, in seconds.
    /// Default: 30
    pub http_timeout: Option<u64>,

    /// Logins of automation accounts that cannot author commits.
    /// Default: ["github-actions[bot]"]
    pub automation_logins: Option<Vec<String>>,

    pub secrets: Option<SecretNames>,

    /// Sender address of notification emails.
    pub notifications_sender: Option<String>,

    /// Recipient of internal error reports.
    pub debug_email: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("REGPUB_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("regpub").join("config.toml"),
    })
});

pub fn init() -> Result<()> {
    let config = Config::new()?;
    let mut global_config = CONFIG.write().unwrap_or_else(|e| e.into_inner());
    *global_config = Some(config);
    Ok(())
}

pub fn get_config() -> Config {
    let mut config_guard = CONFIG.write().unwrap_or_else(|e| e.into_inner());
    config_guard
        .get_or_insert_with(Config::default_config)
        .clone()
}

impl Config {
    pub fn default_config() -> Self {
        let mut config = Self::default();
        config.fill_defaults();
        config
    }

    /// Loads the configuration from [`CONFIG_PATH`], falling back to the defaults when the file
    /// does not exist.
    pub fn new() -> Result<Self> {
        let config_path = CONFIG_PATH
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .to_path_buf();
        Self::load(&config_path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    pub fn resolve(&mut self) -> Result<()> {
        self.fill_defaults();

        let registry = self.registry();
        match registry.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => return Err(ConfigError::InvalidRegistry(registry.to_string())),
        }

        if self.push_attempts == Some(0) {
            return Err(ConfigError::InvalidAttempts {
                field: "push_attempts",
            });
        }

        Ok(())
    }

    fn fill_defaults(&mut self) {
        self.registry.get_or_insert_with(|| DEFAULT_REGISTRY.into());
        self.registry_branch.get_or_insert_with(|| "main".into());
        self.backoff_delay_factor.get_or_insert(10_000);
        self.download_retries.get_or_insert(3);
        self.push_attempts.get_or_insert(5);
        self.push_backoff.get_or_insert(1_000);
        self.http_timeout.get_or_insert(30);
        self.automation_logins
            .get_or_insert_with(|| vec![DEFAULT_AUTOMATION_LOGIN.into()]);
        self.secrets.get_or_insert_with(SecretNames::default);
    }

    pub fn registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// `(owner, name)` of the canonical registry.
    pub fn registry_parts(&self) -> (&str, &str) {
        self.registry()
            .split_once('/')
            .unwrap_or(("bazelbuild", "bazel-central-registry"))
    }

    pub fn registry_branch(&self) -> &str {
        self.registry_branch.as_deref().unwrap_or("main")
    }

    /// Base download backoff. `BACKOFF_DELAY_FACTOR` (milliseconds) takes precedence.
    pub fn backoff_delay_factor(&self) -> Result<Duration> {
        if let Ok(value) = std::env::var("BACKOFF_DELAY_FACTOR") {
            let millis = value.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidEnvValue {
                    var: "BACKOFF_DELAY_FACTOR",
                    value: value.clone(),
                }
            })?;
            return Ok(Duration::from_millis(millis));
        }
        Ok(Duration::from_millis(
            self.backoff_delay_factor.unwrap_or(10_000),
        ))
    }

    pub fn download_retries(&self) -> u32 {
        self.download_retries.unwrap_or(3)
    }

    pub fn push_attempts(&self) -> u32 {
        self.push_attempts.unwrap_or(5).max(1)
    }

    pub fn push_backoff(&self) -> Duration {
        Duration::from_millis(self.push_backoff.unwrap_or(1_000))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout.unwrap_or(30))
    }

    pub fn is_automation_login(&self, login: &str) -> bool {
        match &self.automation_logins {
            Some(logins) => logins.iter().any(|l| l.eq_ignore_ascii_case(login)),
            None => login.eq_ignore_ascii_case(DEFAULT_AUTOMATION_LOGIN),
        }
    }

    pub fn secrets(&self) -> SecretNames {
        self.secrets.clone().unwrap_or_default()
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
