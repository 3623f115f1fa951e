//! The release-source repository and the registry templates it carries.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use regpub_config::ruleset::RulesetConfig;
use regpub_dl::extract::normalize;
use regpub_registry::{
    attestations::{AttestationsTemplate, ATTESTATIONS_TEMPLATE_FILE},
    error::RegistryError,
    metadata::{Maintainer, MetadataFile, METADATA_TEMPLATE_FILE},
    patch::PATCHES_DIR,
    source::{SourceTemplate, SOURCE_TEMPLATE_FILE},
};
use tracing::{debug, info};

use crate::{
    error::{ErrorContext, PublishError, PublishResult},
    git::GitClient,
    repository::{Checkout, Repository},
};

/// Directory holding the registry templates, relative to the repository root.
pub const TEMPLATE_DIR: &str = ".bcr";
pub const PRESUBMIT_FILE: &str = "presubmit.yml";

const REQUIRED_FILES: [&str; 3] = [METADATA_TEMPLATE_FILE, PRESUBMIT_FILE, SOURCE_TEMPLATE_FILE];

/// Template directory of `module_root`, relative to the repository root.
pub fn template_dir(module_root: &str) -> PathBuf {
    normalize(&Path::new(TEMPLATE_DIR).join(module_root))
}

/// The validated templates of one module root.
#[derive(Debug, Clone)]
pub struct ModuleTemplates {
    pub root: String,
    pub template_dir: PathBuf,
    pub source: SourceTemplate,
    pub metadata: MetadataFile,
    pub attestations: Option<AttestationsTemplate>,
    pub presubmit_path: PathBuf,
    pub patches_dir: PathBuf,
}

impl ModuleTemplates {
    fn load(repo_root: &Path, module_root: &str) -> PublishResult<Self> {
        let template_dir = repo_root.join(template_dir(module_root));

        let source = SourceTemplate::load(&template_dir.join(SOURCE_TEMPLATE_FILE)).map_err(
            |err| {
                match err {
                    RegistryError::InvalidSourceTemplate { path, reason } => {
                        PublishError::InvalidSourceTemplate {
                            path,
                            message: reason,
                        }
                    }
                    other => other.into(),
                }
            },
        )?;

        let metadata = MetadataFile::load(&template_dir.join(METADATA_TEMPLATE_FILE)).map_err(
            |err| {
                match err {
                    RegistryError::Metadata { path, message } => {
                        PublishError::InvalidMetadataTemplate { path, message }
                    }
                    other => other.into(),
                }
            },
        )?;

        let attestations =
            AttestationsTemplate::try_load(&template_dir.join(ATTESTATIONS_TEMPLATE_FILE))?;

        let presubmit_path = template_dir.join(PRESUBMIT_FILE);
        validate_presubmit(&presubmit_path)?;

        Ok(Self {
            root: module_root.to_string(),
            patches_dir: template_dir.join(PATCHES_DIR),
            template_dir,
            source,
            metadata,
            attestations,
            presubmit_path,
        })
    }
}

fn validate_presubmit(path: &Path) -> PublishResult<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml_ng::from_str::<serde_yaml_ng::Value>(&content).map_err(|_| {
        PublishError::InvalidPresubmit {
            path: path.to_path_buf(),
            message: "cannot parse file as yaml".into(),
        }
    })?;
    Ok(())
}

/// A release-source repository checked out at the release tag, with validated templates.
#[derive(Debug)]
pub struct RulesetRepository {
    checkout: Checkout,
    config: RulesetConfig,
    modules: Vec<ModuleTemplates>,
}

impl RulesetRepository {
    /// Checks out `repository` at `tag` and validates its template directory.
    pub fn create(repository: &Repository, git: &dyn GitClient, tag: &str) -> PublishResult<Self> {
        let checkout = repository.checkout(git, Some(tag))?;
        Self::from_checkout(checkout)
    }

    pub fn from_checkout(checkout: Checkout) -> PublishResult<Self> {
        let root = checkout.disk_path().to_path_buf();
        let config = RulesetConfig::load(&root.join(TEMPLATE_DIR))?;
        debug!(
            repository = %checkout.repository(),
            module_roots = ?config.module_roots,
            "validating ruleset repository"
        );

        let missing: Vec<String> = config
            .module_roots
            .iter()
            .flat_map(|module_root| {
                let dir = template_dir(module_root);
                REQUIRED_FILES.iter().map(move |file| dir.join(file))
            })
            .filter(|relative| !root.join(relative).is_file())
            .map(|relative| relative.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PublishError::MissingFiles {
                repository: checkout.repository().canonical_name(),
                files: missing,
            });
        }

        let modules = config
            .module_roots
            .iter()
            .map(|module_root| ModuleTemplates::load(&root, module_root))
            .collect::<PublishResult<Vec<_>>>()?;

        info!(
            repository = %checkout.repository(),
            modules = modules.len(),
            "ruleset repository is valid"
        );
        Ok(Self {
            checkout,
            config,
            modules,
        })
    }

    pub fn repository(&self) -> &Repository {
        self.checkout.repository()
    }

    pub fn disk_path(&self) -> &Path {
        self.checkout.disk_path()
    }

    pub fn config(&self) -> &RulesetConfig {
        &self.config
    }

    pub fn modules(&self) -> &[ModuleTemplates] {
        &self.modules
    }

    /// Maintainers of every module root, without duplicates.
    pub fn maintainers(&self) -> Vec<Maintainer> {
        dedupe_maintainers(self.modules.iter().flat_map(|m| m.metadata.maintainers()))
    }

    pub fn cleanup(&mut self) {
        self.checkout.cleanup();
    }
}

/// Keeps the first maintainer per email, or per github handle for maintainers without an email.
pub fn dedupe_maintainers<I>(maintainers: I) -> Vec<Maintainer>
where
    I: IntoIterator<Item = Maintainer>,
{
    let mut seen = HashSet::new();
    maintainers
        .into_iter()
        .filter(|m| {
            let key = match (&m.email, &m.github) {
                (Some(email), _) => format!("email:{email}"),
                (None, Some(github)) => format!("github:{github}"),
                (None, None) => format!("name:{}", m.name),
            };
            seen.insert(key)
        })
        .collect()
}

/// Maintainers readable from a checkout whose templates may be invalid.
pub fn emergency_maintainers(repo_root: &Path) -> Vec<Maintainer> {
    let roots = RulesetConfig::load(&repo_root.join(TEMPLATE_DIR))
        .map(|config| config.module_roots)
        .unwrap_or_else(|_| RulesetConfig::default().module_roots);

    dedupe_maintainers(roots.iter().flat_map(|root| {
        MetadataFile::emergency_parse_maintainers(
            &repo_root.join(template_dir(root)).join(METADATA_TEMPLATE_FILE),
        )
    }))
}
