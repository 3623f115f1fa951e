//! Opening the pull request that proposes an entry to the registry.

use std::sync::Arc;

use regpub_registry::metadata::Maintainer;
use tracing::{info, warn};

use crate::{
    error::PublishResult,
    github::{GithubClient, PullRequest},
    repository::Repository,
};

pub const AUTOMATION_FOOTER: &str =
    "_Automated by [Publish to BCR](https://github.com/apps/publish-to-bcr)_";

/// What the pull request is about.
#[derive(Debug, Clone)]
pub struct EntryRequest<'a> {
    pub repository: &'a Repository,
    pub tag: &'a str,
    pub version: &'a str,
    pub modules: &'a [String],
    pub releaser: &'a str,
    pub maintainers: &'a [Maintainer],
}

pub struct PublishEntryService {
    github: Arc<dyn GithubClient>,
}

impl PublishEntryService {
    pub fn new(github: Arc<dyn GithubClient>) -> Self {
        Self { github }
    }

    /// Opens a pull request from `fork:branch` against `registry:base_branch` and returns its
    /// number. Auto-merge is enabled when the registry allows it.
    pub fn send_request(
        &self,
        request: &EntryRequest<'_>,
        fork: &Repository,
        branch: &str,
        registry: &Repository,
        base_branch: &str,
    ) -> PublishResult<u64> {
        let number = self.github.create_pull_request(&PullRequest {
            head: fork.clone(),
            head_branch: branch.to_string(),
            base: registry.clone(),
            base_branch: base_branch.to_string(),
            title: pull_request_title(request.modules, request.version),
            body: pull_request_body(request),
        })?;
        info!(registry = %registry, number, "opened pull request");

        if let Err(err) = self.github.enable_auto_merge(registry, number) {
            warn!(registry = %registry, number, "could not enable auto-merge: {err}");
        }
        Ok(number)
    }
}

/// `<module>@<version>`, comma-joined when the release carries several modules.
pub fn pull_request_title(modules: &[String], version: &str) -> String {
    modules
        .iter()
        .map(|module| format!("{module}@{version}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn pull_request_body(request: &EntryRequest<'_>) -> String {
    let release_url = format!(
        "https://github.com/{}/releases/tag/{}",
        request.repository.canonical_name(),
        request.tag
    );

    // Only maintainers with a github handle can be mentioned.
    let mentions: Vec<String> = request
        .maintainers
        .iter()
        .filter_map(|m| m.github.as_deref())
        .filter(|handle| !handle.eq_ignore_ascii_case(request.releaser))
        .map(|handle| format!("@{handle}"))
        .collect();
    let fyi = if mentions.is_empty() {
        String::new()
    } else {
        format!("fyi: {}", mentions.join(", "))
    };

    format!(
        "Release: [{tag}]({release_url})\n\nAuthor: @{releaser}\n\n{fyi}\n\n{AUTOMATION_FOOTER}",
        tag = request.tag,
        releaser = request.releaser,
    )
}
