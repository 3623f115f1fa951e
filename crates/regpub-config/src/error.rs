use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(regpub_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    #[diagnostic(code(regpub_config::toml_serialize))]
    TomlSerError(#[from] toml::ser::Error),

    #[error("Invalid registry `{0}`")]
    #[diagnostic(
        code(regpub_config::invalid_registry),
        help("The registry must be written as `owner/name`")
    )]
    InvalidRegistry(String),

    #[error("`{field}` must be at least 1")]
    #[diagnostic(code(regpub_config::invalid_attempts))]
    InvalidAttempts { field: &'static str },

    #[error("Invalid value for `{var}`: {value}")]
    #[diagnostic(
        code(regpub_config::invalid_env),
        help("Use a whole number of milliseconds")
    )]
    InvalidEnvValue { var: &'static str, value: String },

    #[error("Invalid config file {}: {message}", path.display())]
    #[diagnostic(
        code(regpub_config::invalid_ruleset_config),
        help("See the documentation for the supported `moduleRoots` and `fixedReleaser` keys")
    )]
    InvalidRulesetConfig { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(regpub_config::io))]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ruleset_config_display() {
        let err = ConfigError::InvalidRulesetConfig {
            path: PathBuf::from(".bcr/config.yml"),
            message: "cannot parse file as yaml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid config file .bcr/config.yml: cannot parse file as yaml"
        );
    }

    #[test]
    fn test_invalid_registry_display() {
        let err = ConfigError::InvalidRegistry("registry".to_string());
        assert_eq!(err.to_string(), "Invalid registry `registry`");
    }
}
