//! The registry host's API, as far as publishing needs it.

use crate::{error::PublishResult, repository::Repository, secrets::AppCredentials, user::User};

/// A repository together with its place in a fork network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub repository: Repository,
    /// Direct upstream of a fork.
    pub parent: Option<Repository>,
    /// Root of the fork network.
    pub source: Option<Repository>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub head: Repository,
    pub head_branch: String,
    pub base: Repository,
    pub base_branch: String,
    pub title: String,
    pub body: String,
}

pub trait GithubClient: Send + Sync {
    /// Hands over the app credentials fetched for the current event. Clients that authenticate
    /// some other way ignore them.
    fn set_app_credentials(&self, _webhook_app: &AppCredentials, _bot_app: &AppCredentials) {}

    fn get_user(&self, username: &str) -> PublishResult<User>;

    /// Forks owned by `owner`, in the order the API lists them.
    fn list_forks_owned_by(&self, owner: &str) -> PublishResult<Vec<Repository>>;

    fn get_repository(&self, repository: &Repository) -> PublishResult<RepositoryInfo>;

    fn has_app_installed(&self, repository: &Repository) -> PublishResult<bool>;

    /// Opens the pull request and returns its number.
    fn create_pull_request(&self, request: &PullRequest) -> PublishResult<u64>;

    fn enable_auto_merge(&self, repository: &Repository, number: u64) -> PublishResult<()>;

    /// A push URL carrying the app's installation token for `repository`.
    fn get_authenticated_remote_url(&self, repository: &Repository) -> PublishResult<String>;

    /// The bot account of the app installed on `repository`.
    fn get_installation_bot_user(&self, repository: &Repository) -> PublishResult<User>;
}
