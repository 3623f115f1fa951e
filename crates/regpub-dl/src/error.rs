use miette::Diagnostic;
use regpub_utils::error::{FileSystemError, HashError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(regpub_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to download artifact from {url}. Received status {status}")]
    #[diagnostic(
        code(regpub_dl::artifact_download),
        help("Make sure the release artifact exists and is publicly downloadable")
    )]
    ArtifactDownload { url: String, status: u16 },

    #[error("GET {url} failed; no response received: {reason}")]
    #[diagnostic(
        code(regpub_dl::no_response),
        help("Check your internet connection or try again later")
    )]
    NoResponse { url: String, reason: String },

    #[error("Failed to GET {url}: {reason}")]
    #[diagnostic(code(regpub_dl::request_not_sent))]
    RequestNotSent { url: String, reason: String },

    #[error("Connection dropped while downloading {url}")]
    #[diagnostic(code(regpub_dl::interrupted))]
    Interrupted {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::network))]
    Network(Box<ureq::Error>),

    #[error("Artifact {url} was already downloaded")]
    #[diagnostic(
        code(regpub_dl::already_downloaded),
        help("Create a new artifact to download the same URL again")
    )]
    AlreadyDownloaded { url: String },

    #[error("Artifact {url} has not been downloaded yet")]
    #[diagnostic(code(regpub_dl::not_downloaded))]
    NotDownloaded { url: String },

    #[error("File name could not be determined from {url}")]
    #[diagnostic(
        code(regpub_dl::no_filename),
        help("The URL path must end with the artifact file name")
    )]
    NoFilename { url: String },

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::hash))]
    Hash(#[from] HashError),

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::io))]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// 404 is included because release assets are often requested moments before their upload
    /// finishes.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::ArtifactDownload { status, .. } => {
                *status == 404 || *status == 408 || *status == 429 || *status >= 500
            }
            DownloadError::NoResponse { .. }
            | DownloadError::RequestNotSent { .. }
            | DownloadError::Interrupted { .. }
            | DownloadError::Network(_) => true,
            _ => false,
        }
    }

    /// Classifies a transport error for the given URL.
    pub fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => {
                DownloadError::ArtifactDownload {
                    url: url.to_string(),
                    status,
                }
            }
            ureq::Error::Timeout(_) | ureq::Error::Io(_) => {
                DownloadError::NoResponse {
                    url: url.to_string(),
                    reason: err.to_string(),
                }
            }
            ureq::Error::HostNotFound
            | ureq::Error::ConnectionFailed
            | ureq::Error::BadUri(_)
            | ureq::Error::Http(_) => {
                DownloadError::RequestNotSent {
                    url: url.to_string(),
                    reason: err.to_string(),
                }
            }
            other => DownloadError::Network(Box::new(other)),
        }
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum ExtractError {
    #[error("Unsupported archive format: {extension}")]
    #[diagnostic(
        code(regpub_dl::unsupported_format),
        help("Supported formats are .tar, .tar.gz, .tar.xz and .zip")
    )]
    UnsupportedFormat { extension: String },

    #[error("Failed to decode xz stream: {message}")]
    #[diagnostic(code(regpub_dl::xz_decode))]
    Decode { message: String },

    #[error("xz stream needs more than {limit} bytes of decoder memory")]
    #[diagnostic(
        code(regpub_dl::xz_memory_limit),
        help("The archive was compressed with settings too large to decode safely")
    )]
    MemoryLimit { limit: u64 },

    #[error("xz stream ended before the end of the compressed data")]
    #[diagnostic(code(regpub_dl::xz_truncated))]
    Truncated,

    #[error("Unexpected data after the end of the xz stream")]
    #[diagnostic(code(regpub_dl::xz_trailing_data))]
    TrailingData,

    #[error("xz decoder made no progress")]
    #[diagnostic(code(regpub_dl::xz_stalled))]
    Stalled,

    #[error("Archive entry escapes the extraction directory: {path}")]
    #[diagnostic(code(regpub_dl::unsafe_entry))]
    UnsafeEntry { path: String },

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::zip))]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(regpub_dl::io))]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
