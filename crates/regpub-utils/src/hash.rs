use std::{fs::File, io, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Computes the Subresource Integrity string of a file.
///
/// The file is streamed through SHA-256 and the digest is rendered as `sha256-<base64>`, the
/// form registries record in `source.json` and `attestations.json`.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
///
/// # Example
///
/// ```no_run
/// use regpub_utils::error::HashResult;
/// use regpub_utils::hash::integrity_hash;
///
/// fn main() -> HashResult<()> {
///     let integrity = integrity_hash("/tmp/rules_foo-1.0.0.tar.gz")?;
///     println!("{integrity}");
///     Ok(())
/// }
/// ```
pub fn integrity_hash<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    let mut file = File::open(file_path).map_err(read_failed)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(read_failed)?;
    Ok(format_integrity(&hasher.finalize()))
}

/// Computes the Subresource Integrity string of an in-memory buffer.
pub fn integrity_hash_bytes(data: &[u8]) -> String {
    format_integrity(&Sha256::digest(data))
}

fn format_integrity(digest: &[u8]) -> String {
    format!("sha256-{}", STANDARD.encode(digest))
}
