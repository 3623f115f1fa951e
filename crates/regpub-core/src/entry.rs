//! Builds registry entries for a release and pushes them to a fork.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use rand::Rng;
use regpub_config::config::Config;
use regpub_dl::{
    artifact::DownloadOptions,
    retry::{retry, RetryPolicy},
};
use regpub_registry::{
    archive::ReleaseArchive,
    attestations::{AttestationsTemplate, ATTESTATIONS_FILE},
    error::RegistryError,
    metadata::{MetadataFile, METADATA_FILE},
    module_file::{ModuleFile, MODULE_FILE},
    patch::{
        create_module_patch, list_patches, module_file_patches, validate_patch, PATCHES_DIR,
        PATCH_STRIP, VERSION_PATCH_NAME,
    },
    source::{SourceTemplate, SOURCE_FILE},
    substitution::Substitutions,
    version::version_from_tag,
};
use regpub_utils::{
    fs::{copy_file, ensure_dir_exists},
    hash::{integrity_hash, integrity_hash_bytes},
};
use tracing::{debug, info, warn};

use crate::{
    error::{ErrorContext, PublishError, PublishResult},
    git::GitClient,
    github::GithubClient,
    repository::{Checkout, Repository},
    ruleset::{ModuleTemplates, RulesetRepository, PRESUBMIT_FILE},
    user::CommitAuthor,
};

pub const MODULES_DIR: &str = "modules";

/// Remote the entry branch is pushed through.
pub const AUTHED_FORK_REMOTE: &str = "authed-fork";

#[derive(Debug, Clone)]
pub struct EntryOptions {
    pub download: DownloadOptions,
    /// Total push attempts, including the first.
    pub push_attempts: u32,
    pub push_backoff: Duration,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            download: DownloadOptions::default(),
            push_attempts: 5,
            push_backoff: Duration::from_secs(1),
        }
    }
}

impl EntryOptions {
    pub fn from_config(config: &Config) -> PublishResult<Self> {
        Ok(Self {
            download: DownloadOptions::new()
                .backoff_delay_factor(config.backoff_delay_factor()?)
                .retries(config.download_retries()),
            push_attempts: config.push_attempts(),
            push_backoff: config.push_backoff(),
        })
    }
}

/// An entry committed to a branch of a registry checkout.
#[derive(Debug)]
pub struct NewEntry {
    pub branch: String,
    pub version: String,
    /// Names of the modules that received an entry, in module-root order.
    pub modules: Vec<String>,
}

/// A user patch scheduled to be copied next to the entry.
struct PatchCopy {
    name: String,
    source: PathBuf,
}

pub struct CreateEntryService {
    git: Arc<dyn GitClient>,
    github: Arc<dyn GithubClient>,
    options: EntryOptions,
}

impl CreateEntryService {
    pub fn new(
        git: Arc<dyn GitClient>,
        github: Arc<dyn GithubClient>,
        options: EntryOptions,
    ) -> Self {
        Self {
            git,
            github,
            options,
        }
    }

    /// Creates, commits and pushes the entries of every module root to `fork`.
    ///
    /// The registry is cloned fresh for every call so that a failed attempt leaves nothing behind
    /// for the next fork.
    pub fn new_entry(
        &self,
        ruleset: &RulesetRepository,
        registry: &Repository,
        registry_branch: &str,
        fork: &Repository,
        tag: &str,
        author: &CommitAuthor,
    ) -> PublishResult<NewEntry> {
        let mut checkout = registry.checkout(self.git.as_ref(), Some(registry_branch))?;

        let result = self
            .create_entries(ruleset, checkout.disk_path(), tag)
            .and_then(|modules| {
                let branch = self.commit_entry(ruleset.repository(), &checkout, tag, author)?;
                self.push_entry_to_fork(fork, &checkout, &branch)?;
                Ok(NewEntry {
                    branch,
                    version: version_from_tag(tag).to_string(),
                    modules,
                })
            });

        checkout.cleanup();
        result
    }

    /// Writes the entry of every module root of `ruleset` into `registry_dir`.
    pub fn create_entries(
        &self,
        ruleset: &RulesetRepository,
        registry_dir: &Path,
        tag: &str,
    ) -> PublishResult<Vec<String>> {
        let repository = ruleset.repository();
        let version = version_from_tag(tag);
        let vars = Substitutions::full(&repository.owner, &repository.name, tag, version);

        ruleset
            .modules()
            .iter()
            .map(|templates| self.create_entry_files(templates, &vars, registry_dir, version))
            .collect()
    }

    /// Writes one module's entry for `version` into `registry_dir` and returns the module name.
    ///
    /// Nothing is written unless every step before it succeeded. The downloaded archive is
    /// removed whatever the outcome.
    pub fn create_entry_files(
        &self,
        templates: &ModuleTemplates,
        vars: &Substitutions,
        registry_dir: &Path,
        version: &str,
    ) -> PublishResult<String> {
        let mut source = templates.source.clone();
        source.substitute(vars);
        source.validate_fully_substituted()?;

        let mut attestations = templates.attestations.clone();
        if let Some(attestations) = attestations.as_mut() {
            attestations.substitute(vars);
            attestations.validate_fully_substituted()?;
        }

        let mut archive = ReleaseArchive::fetch(
            source.url(),
            source.strip_prefix(),
            &self.options.download,
        )?;
        let result = self.build_entry(
            templates,
            &mut archive,
            source,
            attestations,
            registry_dir,
            version,
        );
        archive.cleanup();
        result
    }

    fn build_entry(
        &self,
        templates: &ModuleTemplates,
        archive: &mut ReleaseArchive,
        mut source: SourceTemplate,
        mut attestations: Option<AttestationsTemplate>,
        registry_dir: &Path,
        version: &str,
    ) -> PublishResult<String> {
        let mut module = archive.extract_module_file(&templates.root)?;
        source.set_integrity_hash(archive.compute_integrity_hash()?);

        let name = module.name()?.to_string();
        let entry_dir = registry_dir.join(MODULES_DIR).join(&name);
        let version_dir = entry_dir.join(version);
        debug!(module = %name, version, dir = %entry_dir.display(), "building entry");

        let metadata = merge_metadata(&templates.metadata, &entry_dir.join(METADATA_FILE), version)?;
        let patches = apply_user_patches(&templates.patches_dir, &mut source, &mut module)?;
        let version_patch = stamp_module_version(&mut source, &mut module, version)?;

        if let Some(attestations) = attestations.as_mut() {
            attestations.compute_integrity_hashes(&self.options.download)?;
        }

        ensure_dir_exists(&version_dir)?;
        metadata.save(&entry_dir.join(METADATA_FILE))?;
        source.save(&version_dir.join(SOURCE_FILE))?;
        module.save(&version_dir.join(MODULE_FILE))?;
        copy_file(&templates.presubmit_path, version_dir.join(PRESUBMIT_FILE))?;

        if !patches.is_empty() || version_patch.is_some() {
            let patches_dir = version_dir.join(PATCHES_DIR);
            ensure_dir_exists(&patches_dir)?;
            for patch in &patches {
                copy_file(&patch.source, patches_dir.join(&patch.name))?;
            }
            if let Some(text) = version_patch {
                let dest = patches_dir.join(VERSION_PATCH_NAME);
                fs::write(&dest, text).with_context(|| format!("writing {}", dest.display()))?;
            }
        }

        if let Some(attestations) = &attestations {
            attestations.save(&version_dir.join(ATTESTATIONS_FILE))?;
        }

        info!(module = %name, version, "created registry entry");
        Ok(name)
    }

    /// Commits the working tree of `registry` to a new branch and returns the branch name.
    pub fn commit_entry(
        &self,
        repository: &Repository,
        registry: &Checkout,
        tag: &str,
        author: &CommitAuthor,
    ) -> PublishResult<String> {
        let path = registry.disk_path();
        let branch = entry_branch_name(repository, tag);

        self.git
            .set_commit_identity(path, &author.name, &author.email)?;
        self.git.checkout_new_branch(path, &branch)?;
        self.git
            .commit_changes(path, &format!("Publish {}@{tag}", repository.canonical_name()))?;

        debug!(branch = %branch, author = %author.name, "committed entry");
        Ok(branch)
    }

    /// Pushes `branch` to `fork`, retrying with exponential backoff.
    pub fn push_entry_to_fork(
        &self,
        fork: &Repository,
        registry: &Checkout,
        branch: &str,
    ) -> PublishResult<()> {
        let path = registry.disk_path();
        if !self.git.has_remote(path, AUTHED_FORK_REMOTE)? {
            let url = self.github.get_authenticated_remote_url(fork)?;
            self.git.add_remote(path, AUTHED_FORK_REMOTE, &url)?;
        }

        let policy = RetryPolicy::new()
            .with_max_attempts(self.options.push_attempts)
            .with_base_delay(self.options.push_backoff)
            .with_jitter(0.2);

        let (result, stats) = retry(
            &policy,
            |_| self.git.push(path, AUTHED_FORK_REMOTE, branch),
            |_| true,
            |event| {
                debug!(fork = %fork, attempt = event.attempt, "push failed, retrying");
            },
        );

        result.map_err(|source| {
            PublishError::Push {
                fork: fork.canonical_name(),
                branch: branch.to_string(),
                attempts: stats.attempts,
                source: Box::new(source),
            }
        })?;

        info!(fork = %fork, branch, "pushed entry branch");
        Ok(())
    }
}

/// `<owner>/<repo>@<tag>-<8 hex chars>`.
pub fn entry_branch_name(repository: &Repository, tag: &str) -> String {
    let suffix: u32 = rand::rng().random();
    format!("{}@{tag}-{suffix:08x}", repository.canonical_name())
}

/// The template metadata with the published and yanked versions of the registry plus `version`.
fn merge_metadata(
    template: &MetadataFile,
    registry_metadata: &Path,
    version: &str,
) -> PublishResult<MetadataFile> {
    let mut metadata = template.clone();
    metadata.clear_versions();
    metadata.clear_yanked_versions();

    if registry_metadata.is_file() {
        let existing = MetadataFile::load(registry_metadata)?;
        if existing.has_version(version) {
            return Err(RegistryError::VersionAlreadyPublished {
                version: version.to_string(),
            }
            .into());
        }
        metadata.add_versions(existing.versions());
        metadata.add_yanked_versions(existing.yanked_versions());
    }

    metadata.add_versions([version]);
    Ok(metadata)
}

/// Records every user patch on the source template and applies the parts editing the root
/// module file to `module`.
fn apply_user_patches(
    patches_dir: &Path,
    source: &mut SourceTemplate,
    module: &mut ModuleFile,
) -> PublishResult<Vec<PatchCopy>> {
    let mut copies = Vec::new();

    for path in list_patches(patches_dir)? {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text =
            fs::read_to_string(&path).with_context(|| format!("reading patch {}", path.display()))?;
        validate_patch(&name, &text)?;

        for part in module_file_patches(&text, PATCH_STRIP) {
            debug!(patch = %name, "applying patch to module file");
            module.patch_content(&name, &part.text)?;
        }

        let integrity = integrity_hash(&path).map_err(RegistryError::from)?;
        source.add_patch(&name, &integrity, PATCH_STRIP);
        copies.push(PatchCopy { name, source: path });
    }

    Ok(copies)
}

/// Stamps `version` into the module file and returns the patch making the same change, if the
/// declared version differs.
fn stamp_module_version(
    source: &mut SourceTemplate,
    module: &mut ModuleFile,
    version: &str,
) -> PublishResult<Option<String>> {
    if module.version() == Some(version) {
        return Ok(None);
    }

    warn!(
        declared = module.version().unwrap_or_default(),
        release = version,
        "module version differs from the release, generating a version patch"
    );
    let before = module.content().to_string();
    module.stamp_version(version)?;
    let patch = create_module_patch(&before, module.content());
    source.add_patch(
        VERSION_PATCH_NAME,
        &integrity_hash_bytes(patch.as_bytes()),
        PATCH_STRIP,
    );
    Ok(Some(patch))
}
