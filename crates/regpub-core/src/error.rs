//! Error types for regpub-core.

use std::path::PathBuf;

use miette::Diagnostic;
use regpub_config::error::ConfigError;
use regpub_dl::error::DownloadError;
use regpub_registry::error::RegistryError;
use regpub_utils::error::FileSystemError;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PublishError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error("Error while {action}")]
    #[diagnostic(code(regpub_core::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid repository name `{0}`")]
    #[diagnostic(
        code(regpub_core::invalid_repository),
        help("Repositories are written as `owner/name`")
    )]
    InvalidRepositoryName(String),

    #[error(
        "Could not locate the following required files in {repository}:\n{}\nDid you forget to \
         add them to your ruleset repository?",
        files.iter().map(|f| format!("  {f}")).collect::<Vec<_>>().join("\n")
    )]
    #[diagnostic(code(regpub_core::missing_files))]
    MissingFiles {
        repository: String,
        files: Vec<String>,
    },

    #[error("Invalid metadata template file {}: {message}", path.display())]
    #[diagnostic(code(regpub_core::invalid_metadata_template))]
    InvalidMetadataTemplate { path: PathBuf, message: String },

    #[error("Invalid source template file {}: {message}", path.display())]
    #[diagnostic(code(regpub_core::invalid_source_template))]
    InvalidSourceTemplate { path: PathBuf, message: String },

    #[error("Invalid presubmit file {}: {message}", path.display())]
    #[diagnostic(
        code(regpub_core::invalid_presubmit),
        help("presubmit.yml must be valid YAML")
    )]
    InvalidPresubmit { path: PathBuf, message: String },

    #[error(
        "Cannot publish {repository}@{tag}: no usable fork of {registry} owned by {}",
        owners.join(" or ")
    )]
    #[diagnostic(
        code(regpub_core::no_candidate_forks),
        help("Fork the registry under the repository owner or the releaser and install the app on it")
    )]
    NoCandidateForks {
        repository: String,
        tag: String,
        registry: String,
        owners: Vec<String>,
    },

    #[error("Git {operation} failed: {message}")]
    #[diagnostic(code(regpub_core::git))]
    Git {
        operation: &'static str,
        message: String,
    },

    #[error("GitHub request to {action} failed: {message}")]
    #[diagnostic(code(regpub_core::github))]
    Github {
        action: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Could not access secret {name}: {message}")]
    #[diagnostic(code(regpub_core::secrets))]
    Secret { name: String, message: String },

    #[error("Failed to push branch {branch} to {fork} after {attempts} attempt(s): {source}")]
    #[diagnostic(code(regpub_core::push))]
    Push {
        fork: String,
        branch: String,
        attempts: u32,
        #[source]
        source: Box<PublishError>,
    },

    #[error("{0}")]
    #[diagnostic(code(regpub_core::error))]
    Custom(String),
}

impl PublishError {
    /// Whether the message is meant for the releaser.
    ///
    /// Everything else is an internal failure that only developers should see.
    pub fn is_user_facing(&self) -> bool {
        match self {
            Self::Registry(err) => err.is_user_facing(),
            Self::Config(err) => matches!(err, ConfigError::InvalidRulesetConfig { .. }),
            Self::Download(err) => matches!(err, DownloadError::ArtifactDownload { .. }),
            Self::MissingFiles { .. }
            | Self::InvalidMetadataTemplate { .. }
            | Self::InvalidSourceTemplate { .. }
            | Self::InvalidPresubmit { .. }
            | Self::NoCandidateForks { .. } => true,
            Self::Push { source, .. } => source.is_user_facing(),
            Self::FileSystem(_)
            | Self::IoError { .. }
            | Self::InvalidRepositoryName(_)
            | Self::Git { .. }
            | Self::Github { .. }
            | Self::Secret { .. }
            | Self::Custom(_) => false,
        }
    }
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> PublishResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> PublishResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            PublishError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_display() {
        let err = PublishError::MissingFiles {
            repository: "acme/rules_foo".into(),
            files: vec![
                ".bcr/presubmit.yml".into(),
                ".bcr/source.template.json".into(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Could not locate the following required files in acme/rules_foo:\n  \
             .bcr/presubmit.yml\n  .bcr/source.template.json\nDid you forget to add them to \
             your ruleset repository?"
        );
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_push_inherits_classification() {
        let err = PublishError::Push {
            fork: "acme/bazel-central-registry".into(),
            branch: "b".into(),
            attempts: 5,
            source: Box::new(PublishError::Git {
                operation: "push",
                message: "rejected".into(),
            }),
        };
        assert!(!err.is_user_facing());
    }

    #[test]
    fn test_with_context() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result.with_context(|| "reading metadata".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Error while reading metadata");
    }
}
