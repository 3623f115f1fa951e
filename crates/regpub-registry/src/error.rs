use std::{collections::BTreeSet, path::PathBuf};

use miette::Diagnostic;
use regpub_dl::error::{DownloadError, ExtractError};
use regpub_utils::error::{FileSystemError, HashError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Invalid module version '{0}'")]
    #[diagnostic(code(regpub_registry::version_parse))]
    VersionParse(String),

    #[error("Invalid source.template.json file: {reason}")]
    #[diagnostic(
        code(regpub_registry::invalid_source_template),
        help("`url` must be a string and `strip_prefix`, when present, must be a string")
    )]
    InvalidSourceTemplate { path: PathBuf, reason: String },

    #[error("Invalid attestations template file {}: {message}", path.display())]
    #[diagnostic(code(regpub_registry::invalid_attestations_template))]
    InvalidAttestationsTemplate { path: PathBuf, message: String },

    #[error("Could not read metadata file at {}: {message}", path.display())]
    #[diagnostic(code(regpub_registry::metadata))]
    Metadata { path: PathBuf, message: String },

    #[error("Version {version} is already published to this registry")]
    #[diagnostic(
        code(regpub_registry::version_already_published),
        help("Cut a new release instead of re-publishing an existing version")
    )]
    VersionAlreadyPublished { version: String },

    #[error(
        "{} contains unsubstituted variables: {}",
        path.display(),
        vars.iter().map(|v| format!("{{{v}}}")).collect::<Vec<_>>().join(", ")
    )]
    #[diagnostic(
        code(regpub_registry::unsubstituted_variables),
        help("Supported variables are {{OWNER}}, {{REPO}}, {{TAG}} and {{VERSION}}")
    )]
    UnsubstitutedVariables { path: PathBuf, vars: BTreeSet<String> },

    #[error("Failed to parse module name from {}", path.display())]
    #[diagnostic(
        code(regpub_registry::module_name),
        help("The MODULE.bazel file must declare module(name = \"...\")")
    )]
    ModuleName { path: PathBuf },

    #[error("Cannot stamp version {version} into {}: no module() call", path.display())]
    #[diagnostic(
        code(regpub_registry::no_module_call),
        help("Declare the module with module(name = \"...\") in the root MODULE.bazel file")
    )]
    NoModuleCall { path: PathBuf, version: String },

    #[error("Failed to apply patch {patch} to MODULE.bazel file: {message}")]
    #[diagnostic(
        code(regpub_registry::patch_module),
        help("Make sure the patch was generated against the MODULE.bazel in the release archive")
    )]
    PatchModule { patch: String, message: String },

    #[error("Invalid patch file {patch}: {message}")]
    #[diagnostic(code(regpub_registry::invalid_patch))]
    InvalidPatch { patch: String, message: String },

    #[error("Unsupported release archive format {extension} for {url}")]
    #[diagnostic(
        code(regpub_registry::unsupported_archive_format),
        help("Supported formats are .tar, .tar.gz, .tar.xz and .zip")
    )]
    UnsupportedArchiveFormat { url: String, extension: String },

    #[error(
        "Could not find MODULE.bazel in release archive at {}. Is the strip prefix in \
         source.template.json correct? (currently it's '{strip_prefix}')",
        path.display()
    )]
    #[diagnostic(code(regpub_registry::missing_module_file))]
    MissingModuleFile { path: PathBuf, strip_prefix: String },

    #[error(
        "Failed to download attestation from {url}. Received status {status}.{}",
        attestation_hint(*status)
    )]
    #[diagnostic(code(regpub_registry::attestation_download))]
    AttestationDownload { url: String, status: u16 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error("JSON error: {0}")]
    #[diagnostic(code(regpub_registry::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(regpub_registry::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(regpub_registry::hash))]
    Hash(#[from] HashError),

    #[error("IO error while {action}: {source}")]
    #[diagnostic(code(regpub_registry::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

fn attestation_hint(status: u16) -> &'static str {
    if status == 404 {
        "\n\nDouble check that the `url` in your ruleset's .bcr/attestations.template.json is correct."
    } else {
        ""
    }
}

impl RegistryError {
    pub fn io(action: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            action: action.into(),
            source,
        }
    }

    /// Whether the releaser can act on this error without developer help.
    pub fn is_user_facing(&self) -> bool {
        match self {
            Self::InvalidSourceTemplate { .. }
            | Self::InvalidAttestationsTemplate { .. }
            | Self::Metadata { .. }
            | Self::VersionAlreadyPublished { .. }
            | Self::UnsubstitutedVariables { .. }
            | Self::ModuleName { .. }
            | Self::NoModuleCall { .. }
            | Self::PatchModule { .. }
            | Self::InvalidPatch { .. }
            | Self::UnsupportedArchiveFormat { .. }
            | Self::MissingModuleFile { .. }
            | Self::AttestationDownload { .. }
            | Self::VersionParse(_) => true,
            Self::Download(err) => matches!(err, DownloadError::ArtifactDownload { .. }),
            Self::Extract(err) => matches!(err, ExtractError::UnsupportedFormat { .. }),
            Self::Json(_) | Self::FileSystem(_) | Self::Hash(_) | Self::Io { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
