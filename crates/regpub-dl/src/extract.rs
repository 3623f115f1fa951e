use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Component, Path, PathBuf},
};

use flate2::read::GzDecoder;
use regpub_utils::fs::{ensure_dir_exists, safe_remove};
use tracing::debug;

use crate::{
    error::{ExtractError, ExtractResult},
    xz::decompress_xz,
};

/// Archive formats a release may be published as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    Zip,
}

impl ArchiveFormat {
    /// Detects the format from a file name or URL.
    pub fn detect(name: &str) -> ExtractResult<Self> {
        let lower = name.to_ascii_lowercase();
        let format = if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveFormat::TarGz
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            ArchiveFormat::TarXz
        } else if lower.ends_with(".tar") {
            ArchiveFormat::Tar
        } else if lower.ends_with(".zip") {
            ArchiveFormat::Zip
        } else {
            return Err(ExtractError::UnsupportedFormat {
                extension: extension_of(name),
            });
        };
        Ok(format)
    }

    /// Extracts one member into `dest_dir`, returning its path there.
    ///
    /// `member` is relative to the archive root. Returns `Ok(None)` when the archive has no
    /// such file.
    pub fn extract_member(
        self,
        archive: &Path,
        member: &Path,
        dest_dir: &Path,
    ) -> ExtractResult<Option<PathBuf>> {
        ensure_dir_exists(dest_dir)?;
        let member = normalize(member);
        debug!(
            archive = %archive.display(),
            member = %member.display(),
            format = ?self,
            "extracting archive member"
        );

        match self {
            ArchiveFormat::Tar => {
                let file = BufReader::new(File::open(archive)?);
                unpack_tar_member(file, &member, dest_dir)
            }
            ArchiveFormat::TarGz => {
                let file = BufReader::new(File::open(archive)?);
                unpack_tar_member(GzDecoder::new(file), &member, dest_dir)
            }
            ArchiveFormat::TarXz => {
                let tar_path = dest_dir.join(".decompressed.tar");
                {
                    let reader = BufReader::new(File::open(archive)?);
                    let writer = BufWriter::new(File::create(&tar_path)?);
                    decompress_xz(reader, writer)?;
                }
                let result = unpack_tar_member(
                    BufReader::new(File::open(&tar_path)?),
                    &member,
                    dest_dir,
                );
                safe_remove(&tar_path)?;
                result
            }
            ArchiveFormat::Zip => {
                extract_zip(archive, dest_dir)?;
                let path = dest_dir.join(&member);
                Ok(path.is_file().then_some(path))
            }
        }
    }
}

/// The extension reported for unsupported archives, including a `.tar` prefix when present.
fn extension_of(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    if let Some(pos) = base.to_ascii_lowercase().rfind(".tar.") {
        return base[pos..].to_string();
    }
    match base.rfind('.') {
        Some(pos) if pos > 0 => base[pos..].to_string(),
        _ => String::new(),
    }
}

/// Drops `.` and empty components so `./a/./b` and `a/b` compare equal.
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn unpack_tar_member<R: io::Read>(
    reader: R,
    member: &Path,
    dest_dir: &Path,
) -> ExtractResult<Option<PathBuf>> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = normalize(&entry.path()?);
        if path != member {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }

        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractError::UnsafeEntry {
                path: path.display().to_string(),
            });
        }
        return Ok(Some(dest_dir.join(member)));
    }

    Ok(None)
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> ExtractResult<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        let outpath = match file.enclosed_name() {
            Some(path) => extract_dir.join(path),
            None => {
                return Err(ExtractError::UnsafeEntry {
                    path: file.name().to_string(),
                })
            }
        };

        if file.is_dir() {
            ensure_dir_exists(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                ensure_dir_exists(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            io::copy(&mut file, &mut outfile)?;
        }
    }

    Ok(())
}

/// Removes everything extracted into `dir`.
pub fn remove_extracted(dir: &Path) -> ExtractResult<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}
