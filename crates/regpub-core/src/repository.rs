use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use regpub_utils::fs::{create_unique_temp_dir, safe_remove};
use tracing::{debug, warn};

use crate::{
    error::{PublishError, PublishResult},
    git::GitClient,
};

/// A GitHub repository, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn from_canonical_name(canonical_name: &str) -> PublishResult<Self> {
        match canonical_name.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(PublishError::InvalidRepositoryName(canonical_name.to_string())),
        }
    }

    /// `owner/name`.
    pub fn canonical_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }

    /// Clones the repository into a fresh temporary directory and checks out `reference`.
    pub fn checkout(&self, git: &dyn GitClient, reference: Option<&str>) -> PublishResult<Checkout> {
        let root = create_unique_temp_dir("repo")?;
        let path = root.join(&self.name);
        debug!(repository = %self, path = %path.display(), reference, "cloning repository");

        let result = git.shallow_clone(&self.url(), &path, reference).and_then(|()| {
            match reference {
                Some(reference) => git.checkout(&path, reference),
                None => Ok(()),
            }
        });
        if let Err(err) = result {
            let _ = safe_remove(&root);
            return Err(err);
        }

        Ok(Checkout {
            repository: self.clone(),
            root: Some(root),
            path,
        })
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for Repository {
    type Err = PublishError;

    fn from_str(s: &str) -> PublishResult<Self> {
        Self::from_canonical_name(s)
    }
}

/// A local clone of a [`Repository`], removed on [`Checkout::cleanup`] or drop.
#[derive(Debug)]
pub struct Checkout {
    repository: Repository,
    root: Option<PathBuf>,
    path: PathBuf,
}

impl Checkout {
    /// Wraps an existing working directory. It is left in place on cleanup.
    pub fn existing(repository: Repository, path: impl Into<PathBuf>) -> Self {
        Self {
            repository,
            root: None,
            path: path.into(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn disk_path(&self) -> &Path {
        &self.path
    }

    pub fn cleanup(&mut self) {
        if let Some(root) = self.root.take() {
            if let Err(err) = safe_remove(&root) {
                warn!(repository = %self.repository, "failed to remove checkout: {err}");
            }
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        self.cleanup();
    }
}
