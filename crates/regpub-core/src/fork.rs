//! Discovery of registry forks a release can be published through.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, info};

use crate::{
    error::{PublishError, PublishResult},
    github::GithubClient,
    repository::Repository,
};

pub struct FindRegistryForkService {
    github: Arc<dyn GithubClient>,
}

impl FindRegistryForkService {
    pub fn new(github: Arc<dyn GithubClient>) -> Self {
        Self { github }
    }

    /// Forks of `registry` that can take the entry for `repository@tag`, best candidate first.
    ///
    /// Forks owned by the repository owner come before those owned by the releaser. Within an
    /// owner, the listing order is kept. A fork qualifies when its network resolves to
    /// `registry` and the app is installed on it.
    pub fn find_candidate_forks(
        &self,
        repository: &Repository,
        releaser: &str,
        registry: &Repository,
        tag: &str,
    ) -> PublishResult<Vec<Repository>> {
        let owners = candidate_owners(&repository.owner, releaser);

        let mut candidates = Vec::new();
        for owner in &owners {
            for fork in self.github.list_forks_owned_by(owner)? {
                if fork.name != registry.name {
                    continue;
                }
                if !self.is_fork_of(&fork, registry)? {
                    debug!(fork = %fork, "ignoring same-named fork of another repository");
                    continue;
                }
                if !self.github.has_app_installed(&fork)? {
                    debug!(fork = %fork, "app is not installed on fork");
                    continue;
                }
                candidates.push(fork);
            }
        }

        if candidates.is_empty() {
            return Err(PublishError::NoCandidateForks {
                repository: repository.canonical_name(),
                tag: tag.to_string(),
                registry: registry.canonical_name(),
                owners,
            });
        }

        info!(
            candidates = ?candidates.iter().map(Repository::canonical_name).collect::<Vec<_>>(),
            "found candidate forks"
        );
        Ok(candidates)
    }

    fn is_fork_of(&self, fork: &Repository, registry: &Repository) -> PublishResult<bool> {
        let info = self.github.get_repository(fork)?;
        Ok(info.source.as_ref().or(info.parent.as_ref()) == Some(registry))
    }
}

/// The repository owner, then the releaser, without repeats.
fn candidate_owners(repository_owner: &str, releaser: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    [repository_owner, releaser]
        .into_iter()
        .filter(|owner| seen.insert(owner.to_ascii_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::FakeGithub;

    fn bcr() -> Repository {
        Repository::new("bazelbuild", "bazel-central-registry")
    }

    #[test]
    fn test_repository_owner_first() {
        let github = Arc::new(FakeGithub::default());
        let releaser_fork = Repository::new("jane", "bazel-central-registry");
        let owner_fork = Repository::new("acme", "bazel-central-registry");
        github.add_fork(&releaser_fork, &bcr(), true);
        github.add_fork(&owner_fork, &bcr(), true);

        let forks = FindRegistryForkService::new(github)
            .find_candidate_forks(&Repository::new("acme", "rules_foo"), "jane", &bcr(), "v1")
            .unwrap();
        assert_eq!(forks, vec![owner_fork, releaser_fork]);
    }

    #[test]
    fn test_filters_unrelated_and_uninstalled_forks() {
        let github = Arc::new(FakeGithub::default());
        github.add_fork(
            &Repository::new("acme", "bazel-central-registry"),
            &Repository::new("someone", "bazel-central-registry"),
            true,
        );
        github.add_fork(&Repository::new("acme", "rules_bar"), &bcr(), true);
        github.add_fork(&Repository::new("jane", "bazel-central-registry"), &bcr(), false);

        let err = FindRegistryForkService::new(github)
            .find_candidate_forks(&Repository::new("acme", "rules_foo"), "jane", &bcr(), "v1")
            .unwrap_err();
        assert!(err.is_user_facing());
        match err {
            PublishError::NoCandidateForks { owners, .. } => {
                assert_eq!(owners, vec!["acme", "jane"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_releaser_owning_the_repository_is_listed_once() {
        let github = Arc::new(FakeGithub::default());
        let fork = Repository::new("jane", "bazel-central-registry");
        github.add_fork(&fork, &bcr(), true);

        let forks = FindRegistryForkService::new(github)
            .find_candidate_forks(&Repository::new("jane", "rules_foo"), "jane", &bcr(), "v1")
            .unwrap();
        assert_eq!(forks, vec![fork]);
    }

    #[test]
    fn test_candidate_owners() {
        assert_eq!(candidate_owners("acme", "jane"), vec!["acme", "jane"]);
        assert_eq!(candidate_owners("Acme", "acme"), vec!["Acme"]);
    }
}
