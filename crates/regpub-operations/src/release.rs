//! Handling of a published release, from validation to the pull request.

use std::sync::Arc;

use regpub_config::config::Config;
use regpub_core::{
    entry::{CreateEntryService, EntryOptions},
    error::{PublishError, PublishResult},
    fork::FindRegistryForkService,
    git::GitClient,
    github::GithubClient,
    publish::{EntryRequest, PublishEntryService},
    repository::Repository,
    ruleset::{emergency_maintainers, RulesetRepository},
    secrets::{fetch_app_credentials, SecretsClient},
    user::{CommitAuthor, User},
};
use regpub_registry::metadata::Maintainer;
use tracing::{debug, error, info, warn};

use crate::notifications::NotificationsService;

/// A release that was just published.
#[derive(Debug, Clone)]
pub struct ReleaseEvent {
    pub repository: Repository,
    pub tag: String,
    /// Login of the account that published the release.
    pub releaser: String,
    /// Email from the event payload, used when the profile has none.
    pub releaser_email: Option<String>,
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    Published { fork: Repository, pull_request: u64 },
    Failed { errors: Vec<PublishError> },
}

impl ReleaseOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

pub struct ReleaseEventHandler {
    config: Config,
    git: Arc<dyn GitClient>,
    github: Arc<dyn GithubClient>,
    secrets: Arc<dyn SecretsClient>,
    notifications: NotificationsService,
    entry_options: EntryOptions,
}

impl ReleaseEventHandler {
    pub fn new(
        config: Config,
        git: Arc<dyn GitClient>,
        github: Arc<dyn GithubClient>,
        secrets: Arc<dyn SecretsClient>,
        notifications: NotificationsService,
    ) -> PublishResult<Self> {
        let entry_options = EntryOptions::from_config(&config)?;
        Ok(Self {
            config,
            git,
            github,
            secrets,
            notifications,
            entry_options,
        })
    }

    /// Overrides the download and push settings derived from the configuration.
    pub fn with_entry_options(mut self, options: EntryOptions) -> Self {
        self.entry_options = options;
        self
    }

    /// Publishes the release through the first fork that works.
    ///
    /// Failures are reported through the notifications service and returned in the outcome.
    pub fn handle(&self, event: &ReleaseEvent) -> ReleaseOutcome {
        info!(
            repository = %event.repository,
            tag = %event.tag,
            releaser = %event.releaser,
            "release published"
        );

        let releaser = self.resolve_releaser(event);

        if let Err(err) = self.authenticate() {
            return self.fail(event, &releaser, &[], vec![err]);
        }

        let checkout = match event.repository.checkout(self.git.as_ref(), Some(event.tag.as_str())) {
            Ok(checkout) => checkout,
            Err(err) => return self.fail(event, &releaser, &[], vec![err]),
        };
        let fallback_maintainers = emergency_maintainers(checkout.disk_path());
        let mut ruleset = match RulesetRepository::from_checkout(checkout) {
            Ok(ruleset) => ruleset,
            Err(err) => return self.fail(event, &releaser, &fallback_maintainers, vec![err]),
        };
        let maintainers = ruleset.maintainers();

        let outcome = self.publish(event, &ruleset, &releaser, &maintainers);
        ruleset.cleanup();

        match outcome {
            Ok(outcome) => outcome,
            Err(errors) => self.fail(event, &releaser, &maintainers, errors),
        }
    }

    fn authenticate(&self) -> PublishResult<()> {
        let (webhook_app, bot_app) =
            fetch_app_credentials(self.secrets.as_ref(), &self.config.secrets())?;
        self.github.set_app_credentials(&webhook_app, &bot_app);
        Ok(())
    }

    /// The releaser's profile, or a bare account built from the event when the lookup fails.
    fn resolve_releaser(&self, event: &ReleaseEvent) -> User {
        let mut user = self.github.get_user(&event.releaser).unwrap_or_else(|err| {
            debug!(releaser = %event.releaser, "could not look up releaser: {err}");
            User::new(&event.releaser)
        });
        if user.email.as_deref().map_or(true, str::is_empty) {
            user.email = event.releaser_email.clone();
        }
        user
    }

    fn publish(
        &self,
        event: &ReleaseEvent,
        ruleset: &RulesetRepository,
        releaser: &User,
        maintainers: &[Maintainer],
    ) -> Result<ReleaseOutcome, Vec<PublishError>> {
        let registry = Repository::from_canonical_name(self.config.registry()).map_err(|e| vec![e])?;

        let forks = FindRegistryForkService::new(self.github.clone())
            .find_candidate_forks(&event.repository, &releaser.username, &registry, &event.tag)
            .map_err(|e| vec![e])?;

        let entries = CreateEntryService::new(
            self.git.clone(),
            self.github.clone(),
            self.entry_options.clone(),
        );
        let publisher = PublishEntryService::new(self.github.clone());

        let mut errors = Vec::new();
        for fork in forks {
            info!(candidate = %fork, "selecting fork");
            let attempt = self
                .commit_author(ruleset, releaser, &fork)
                .and_then(|author| {
                    entries.new_entry(
                        ruleset,
                        &registry,
                        self.config.registry_branch(),
                        &fork,
                        &event.tag,
                        &author,
                    )
                })
                .and_then(|entry| {
                    let request = EntryRequest {
                        repository: &event.repository,
                        tag: &event.tag,
                        version: &entry.version,
                        modules: &entry.modules,
                        releaser: &releaser.username,
                        maintainers,
                    };
                    publisher.send_request(
                        &request,
                        &fork,
                        &entry.branch,
                        &registry,
                        self.config.registry_branch(),
                    )
                });

            match attempt {
                Ok(pull_request) => {
                    info!(candidate = %fork, pull_request, "published release");
                    return Ok(ReleaseOutcome::Published { fork, pull_request });
                }
                Err(err) => {
                    error!(candidate = %fork, "failed to publish through fork: {err}");
                    errors.push(err);
                }
            }
        }

        Err(errors)
    }

    /// Who the entry commit is attributed to.
    fn commit_author(
        &self,
        ruleset: &RulesetRepository,
        releaser: &User,
        fork: &Repository,
    ) -> PublishResult<CommitAuthor> {
        if let Some(fixed) = &ruleset.config().fixed_releaser {
            return Ok(CommitAuthor::from(fixed));
        }
        if self.config.is_automation_login(&releaser.username) {
            let bot = self.github.get_installation_bot_user(fork)?;
            debug!(bot = %bot.username, "attributing commit to the app bot");
            return Ok(CommitAuthor::from(&bot));
        }
        Ok(CommitAuthor::from(releaser))
    }

    fn fail(
        &self,
        event: &ReleaseEvent,
        releaser: &User,
        maintainers: &[Maintainer],
        errors: Vec<PublishError>,
    ) -> ReleaseOutcome {
        warn!(
            repository = %event.repository,
            tag = %event.tag,
            errors = errors.len(),
            "failed to publish release"
        );
        self.notifications
            .notify_error(releaser, maintainers, &event.repository, &event.tag, &errors);
        ReleaseOutcome::Failed { errors }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use regpub_config::config::SecretNames;
    use regpub_core::test_utils::{file_url, tar_gz, FakeGit, FakeGithub, FakeSecrets};
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::{notifications::UNKNOWN_ERROR_MESSAGE, test_utils::RecordingNotifier};

    const MODULE: &str = "module(\n    name = \"rules_foo\",\n    version = \"0.0.0\",\n)\n";

    struct Harness {
        _dir: TempDir,
        git: Arc<FakeGit>,
        github: Arc<FakeGithub>,
        secrets: Arc<FakeSecrets>,
        notifier: Arc<RecordingNotifier>,
    }

    impl Harness {
        fn new(config_yml: Option<&str>) -> Self {
            let dir = tempdir().unwrap();
            let archive = dir.path().join("rules_foo-1.0.0.tar.gz");
            tar_gz(&archive, &[("rules_foo-1.0.0/MODULE.bazel", MODULE)]);
            let source = format!(
                r#"{{"url": "{}", "strip_prefix": "{{REPO}}-{{VERSION}}"}}"#,
                file_url(&archive)
            );

            let git = Arc::new(FakeGit::new());
            let mut files = vec![
                (
                    ".bcr/metadata.template.json",
                    r#"{"maintainers": [{"name": "Joe", "email": "joe@example.com", "github": "joe"}], "versions": [], "yanked_versions": {}}"#,
                ),
                (".bcr/presubmit.yml", "bcr_test_module: {}\n"),
                (".bcr/source.template.json", source.as_str()),
            ];
            if let Some(config) = config_yml {
                files.push((".bcr/config.yml", config));
            }
            git.add_fixture("acme/rules_foo", &files);
            git.add_fixture("bazelbuild/bazel-central-registry", &[("README.md", "bcr")]);

            let secrets = Arc::new(FakeSecrets::default());
            let names = SecretNames::default();
            for name in [
                &names.webhook_app_private_key,
                &names.webhook_app_client_id,
                &names.webhook_app_client_secret,
                &names.bot_app_private_key,
                &names.bot_app_client_id,
                &names.bot_app_client_secret,
            ] {
                secrets.set(name, name);
            }

            let github = Arc::new(FakeGithub::default());
            github.add_user(User::new("jane").with_email("jane@example.com"));

            Self {
                _dir: dir,
                git,
                github,
                secrets,
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        fn add_fork(&self, owner: &str) -> Repository {
            let fork = Repository::new(owner, "bazel-central-registry");
            self.github.add_fork(
                &fork,
                &Repository::new("bazelbuild", "bazel-central-registry"),
                true,
            );
            fork
        }

        fn handler(&self) -> ReleaseEventHandler {
            let notifications = NotificationsService::new(
                self.notifier.clone(),
                self.github.clone(),
                None,
                None,
            );
            ReleaseEventHandler::new(
                Config::default_config(),
                self.git.clone(),
                self.github.clone(),
                self.secrets.clone(),
                notifications,
            )
            .unwrap()
            .with_entry_options(EntryOptions {
                push_attempts: 2,
                push_backoff: Duration::ZERO,
                ..EntryOptions::default()
            })
        }
    }

    fn event(releaser: &str) -> ReleaseEvent {
        ReleaseEvent {
            repository: Repository::new("acme", "rules_foo"),
            tag: "v1.0.0".into(),
            releaser: releaser.into(),
            releaser_email: None,
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_handler_leaves_shared_http_client_alone() {
        regpub_dl::http_client::configure_http_client(|client| {
            client.timeout = Some(Duration::from_secs(3))
        });

        let _handler = Harness::new(None).handler();
        assert_eq!(
            regpub_dl::http_client::client_config().timeout,
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_owner_fork_is_used_and_one_pull_request_opened() {
        let harness = Harness::new(None);
        let owner_fork = harness.add_fork("acme");
        harness.add_fork("jane");

        let outcome = harness.handler().handle(&event("jane"));

        match outcome {
            ReleaseOutcome::Published { fork, pull_request } => {
                assert_eq!(fork, owner_fork);
                assert_eq!(pull_request, 1);
            }
            ReleaseOutcome::Failed { errors } => panic!("unexpected failure: {errors:?}"),
        }
        let prs = harness.github.pull_requests();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].head, owner_fork);
        assert_eq!(prs[0].title, "rules_foo@1.0.0");
        assert!(prs[0].body.contains("Author: @jane"));
        assert!(prs[0].body.contains("fyi: @joe"));
        assert_eq!(
            harness.git.identities(),
            vec![("jane".to_string(), "jane@example.com".to_string())]
        );
        assert_eq!(
            harness.github.credentials_client_id().as_deref(),
            Some("github-app-client-id")
        );
        assert!(harness.notifier.sent().is_empty());
    }

    #[test]
    fn test_falls_back_to_next_fork() {
        let harness = Harness::new(None);
        harness.add_fork("acme");
        let releaser_fork = harness.add_fork("jane");
        harness.git.fail_pushes(2);

        let outcome = harness.handler().handle(&event("jane"));

        match outcome {
            ReleaseOutcome::Published { fork, .. } => assert_eq!(fork, releaser_fork),
            ReleaseOutcome::Failed { errors } => panic!("unexpected failure: {errors:?}"),
        }
        assert_eq!(harness.github.pull_requests().len(), 1);
        assert_eq!(harness.git.pushes().len(), 1);
        assert!(harness.notifier.sent().is_empty());
    }

    #[test]
    fn test_all_forks_failing_notifies_once() {
        let harness = Harness::new(None);
        harness.add_fork("acme");
        harness.add_fork("jane");
        harness.github.fail_pull_requests();

        let outcome = harness.handler().handle(&event("jane"));

        match outcome {
            ReleaseOutcome::Failed { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let sent = harness.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["jane@example.com", "joe@example.com"]);
        assert_eq!(sent[0].messages, vec![UNKNOWN_ERROR_MESSAGE.to_string()]);
    }

    #[test]
    fn test_no_candidate_forks() {
        let harness = Harness::new(None);

        let outcome = harness.handler().handle(&event("jane"));

        assert!(!outcome.is_published());
        let sent = harness.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].messages[0].contains("no usable fork"));
        assert!(harness.git.branches().is_empty());
    }

    #[test]
    fn test_invalid_repository_still_notifies_readable_maintainers() {
        let harness = Harness::new(Some("moduleRoots: [\".\", missing]\n"));
        harness.add_fork("acme");

        let outcome = harness.handler().handle(&event("jane"));

        match outcome {
            ReleaseOutcome::Failed { errors } => {
                assert!(matches!(errors[0], PublishError::MissingFiles { .. }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(harness.github.pull_requests().is_empty());
        assert_eq!(
            harness.notifier.sent()[0].recipients,
            vec!["jane@example.com", "joe@example.com"]
        );
    }

    #[test]
    fn test_fixed_releaser_and_automation_authors() {
        let harness = Harness::new(Some(
            "fixedReleaser:\n  login: release-team\n  email: release@example.com\n",
        ));
        harness.add_fork("acme");
        assert!(harness.handler().handle(&event("jane")).is_published());
        assert_eq!(
            harness.git.identities(),
            vec![("release-team".to_string(), "release@example.com".to_string())]
        );

        let harness = Harness::new(None);
        harness.add_fork("acme");
        harness
            .github
            .set_bot_user(User::new("publish-to-bcr[bot]").with_id(7));
        assert!(harness
            .handler()
            .handle(&event("github-actions[bot]"))
            .is_published());
        assert_eq!(
            harness.git.identities(),
            vec![(
                "publish-to-bcr[bot]".to_string(),
                "7+publish-to-bcr[bot]@users.noreply.github.com".to_string()
            )]
        );
    }

    #[test]
    fn test_missing_secrets_fail_without_cloning() {
        let harness = Harness {
            secrets: Arc::new(FakeSecrets::default()),
            ..Harness::new(None)
        };
        harness.add_fork("acme");

        let outcome = harness.handler().handle(&event("jane"));

        match outcome {
            ReleaseOutcome::Failed { errors } => {
                assert!(matches!(errors[0], PublishError::Secret { .. }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(harness.git.checkouts().is_empty());
    }
}
