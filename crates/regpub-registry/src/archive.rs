//! The release archive a source template points to.

use std::path::{Path, PathBuf};

use regpub_dl::{
    artifact::{Artifact, DownloadOptions},
    error::ExtractError,
    extract::{normalize, remove_extracted, ArchiveFormat},
    utils::filename_from_url,
};
use regpub_utils::fs::create_unique_temp_dir;
use tracing::{debug, info, warn};

use crate::{
    error::{RegistryError, Result},
    module_file::{ModuleFile, MODULE_FILE},
};

/// A downloaded release archive and the directory files are extracted into.
///
/// Both are removed by [`ReleaseArchive::cleanup`], or on drop.
pub struct ReleaseArchive {
    artifact: Artifact,
    format: ArchiveFormat,
    strip_prefix: String,
    extract_dir: Option<PathBuf>,
}

impl ReleaseArchive {
    /// Downloads the archive at `url`. The format is checked before anything is fetched.
    pub fn fetch(url: &str, strip_prefix: &str, options: &DownloadOptions) -> Result<Self> {
        let name = filename_from_url(url).unwrap_or_else(|| url.to_string());
        let format = ArchiveFormat::detect(&name).map_err(|err| {
            match err {
                ExtractError::UnsupportedFormat { extension } => {
                    RegistryError::UnsupportedArchiveFormat {
                        url: url.to_string(),
                        extension,
                    }
                }
                other => RegistryError::Extract(other),
            }
        })?;

        info!(url = %url, "downloading release archive");
        let mut artifact = Artifact::new(url);
        artifact.download(options)?;

        Ok(Self {
            artifact,
            format,
            strip_prefix: strip_prefix.to_string(),
            extract_dir: None,
        })
    }

    pub fn url(&self) -> &str {
        self.artifact.url()
    }

    pub fn disk_path(&self) -> Result<&Path> {
        Ok(self.artifact.disk_path()?)
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn compute_integrity_hash(&self) -> Result<String> {
        Ok(self.artifact.compute_integrity_hash()?)
    }

    /// Extracts `<strip_prefix>/<module_root>/MODULE.bazel`.
    pub fn extract_module_file(&mut self, module_root: &str) -> Result<ModuleFile> {
        let member = normalize(
            &Path::new(&self.strip_prefix)
                .join(module_root)
                .join(MODULE_FILE),
        );

        let extract_dir = match &self.extract_dir {
            Some(dir) => dir.clone(),
            None => {
                let dir = create_unique_temp_dir("release-archive")?;
                self.extract_dir = Some(dir.clone());
                dir
            }
        };

        let archive = self.artifact.disk_path()?;
        debug!(
            archive = %archive.display(),
            member = %member.display(),
            "extracting module file"
        );

        match self.format.extract_member(archive, &member, &extract_dir)? {
            Some(path) => ModuleFile::load(&path),
            None => {
                Err(RegistryError::MissingModuleFile {
                    path: member,
                    strip_prefix: self.strip_prefix.clone(),
                })
            }
        }
    }

    pub fn cleanup(&mut self) {
        self.artifact.cleanup();
        if let Some(dir) = self.extract_dir.take() {
            if let Err(err) = remove_extracted(&dir) {
                warn!(dir = %dir.display(), "failed to remove extracted files: {err}");
            }
        }
    }
}

impl Drop for ReleaseArchive {
    fn drop(&mut self) {
        self.cleanup();
    }
}
