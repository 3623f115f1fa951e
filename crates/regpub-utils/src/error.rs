use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum HashError {
    #[error("Failed to read file `{}` for hashing: {source}", path.display())]
    #[diagnostic(code(regpub_utils::hash_read))]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Diagnostic, Debug)]
pub enum FileSystemError {
    #[error("Failed to {action} file `{}`: {source}", path.display())]
    #[diagnostic(code(regpub_utils::file))]
    File {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to {action} directory `{}`: {source}", path.display())]
    #[diagnostic(code(regpub_utils::directory))]
    Directory {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` is not a directory", path.display())]
    #[diagnostic(
        code(regpub_utils::not_a_directory),
        help("Remove the file or choose another location")
    )]
    NotADirectory { path: PathBuf },
}

/// Any failure from this crate.
#[derive(Error, Diagnostic, Debug)]
pub enum UtilsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystem(#[from] FileSystemError),
}

pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;
pub type HashResult<T> = std::result::Result<T, HashError>;
pub type Result<T> = std::result::Result<T, UtilsError>;
