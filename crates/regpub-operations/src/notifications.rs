//! Routing publish failures to the releaser, the maintainers and the developers.

use std::sync::Arc;

use regpub_core::{
    error::{PublishError, PublishResult},
    github::GithubClient,
    repository::Repository,
    user::User,
};
use regpub_registry::metadata::Maintainer;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred. Please report an issue here: \
                                         https://github.com/bazel-contrib/publish-to-bcr/issues.";

/// One failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub sender: Option<String>,
    pub subject: String,
    pub repository: String,
    pub tag: String,
    pub messages: Vec<String>,
}

/// Delivers notifications. Formatting and transport are up to the implementation.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, notification: &Notification) -> PublishResult<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, notification: &Notification) -> PublishResult<()> {
        info!(
            recipients = %notification.recipients.join(", "),
            subject = %notification.subject,
            "{}",
            notification.messages.join("\n\n")
        );
        Ok(())
    }
}

pub struct NotificationsService {
    notifier: Arc<dyn Notifier>,
    github: Arc<dyn GithubClient>,
    sender: Option<String>,
    debug_email: Option<String>,
}

impl NotificationsService {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        github: Arc<dyn GithubClient>,
        sender: Option<String>,
        debug_email: Option<String>,
    ) -> Self {
        Self {
            notifier,
            github,
            sender,
            debug_email: debug_email.filter(|email| !email.is_empty()),
        }
    }

    /// Reports `errors` for `repository@tag`.
    ///
    /// Failures to deliver are logged and otherwise ignored.
    pub fn notify_error(
        &self,
        releaser: &User,
        maintainers: &[Maintainer],
        repository: &Repository,
        tag: &str,
        errors: &[PublishError],
    ) {
        let recipients = self.recipients(releaser, maintainers);
        if recipients.is_empty() {
            warn!(repository = %repository, tag, "no one to notify about the failure");
        } else {
            let notification = Notification {
                recipients,
                sender: self.sender.clone(),
                subject: "Publish to BCR".to_string(),
                repository: repository.canonical_name(),
                tag: tag.to_string(),
                messages: user_messages(errors),
            };
            self.send(&notification);
        }

        if let Some(debug_email) = &self.debug_email {
            if !errors.is_empty() {
                let notification = Notification {
                    recipients: vec![debug_email.clone()],
                    sender: self.sender.clone(),
                    subject: format!("Publish to BCR Error: {}", repository.canonical_name()),
                    repository: repository.canonical_name(),
                    tag: tag.to_string(),
                    messages: debug_messages(releaser, errors),
                };
                self.send(&notification);
            }
        }
    }

    fn send(&self, notification: &Notification) {
        debug!(recipients = ?notification.recipients, "sending notification");
        if let Err(err) = self.notifier.notify_error(notification) {
            warn!(
                recipients = ?notification.recipients,
                "failed to send notification: {err}"
            );
        }
    }

    /// The releaser's email, then maintainer emails, without repeats. Maintainers listing only a
    /// github handle are looked up; those without a public email are skipped.
    fn recipients(&self, releaser: &User, maintainers: &[Maintainer]) -> Vec<String> {
        let mut recipients: Vec<String> = Vec::new();
        let mut add = |email: &str| {
            if !email.is_empty() && !recipients.iter().any(|r| r.eq_ignore_ascii_case(email)) {
                recipients.push(email.to_string());
            }
        };

        if let Some(email) = &releaser.email {
            add(email);
        }
        for maintainer in maintainers {
            match (&maintainer.email, &maintainer.github) {
                (Some(email), _) => add(email),
                (None, Some(github)) => {
                    match self.github.get_user(github) {
                        Ok(user) => {
                            if let Some(email) = &user.email {
                                add(email);
                            }
                        }
                        Err(err) => {
                            debug!(github = %github, "could not look up maintainer: {err}");
                        }
                    }
                }
                (None, None) => {}
            }
        }
        recipients
    }
}

fn user_messages(errors: &[PublishError]) -> Vec<String> {
    let messages: Vec<String> = errors
        .iter()
        .filter(|err| err.is_user_facing())
        .map(ToString::to_string)
        .collect();
    if messages.is_empty() {
        vec![UNKNOWN_ERROR_MESSAGE.to_string()]
    } else {
        messages
    }
}

fn debug_messages(releaser: &User, errors: &[PublishError]) -> Vec<String> {
    let mut messages = vec![format!(
        "User {} <{}> encountered {} error(s).",
        releaser.username,
        releaser.email.as_deref().unwrap_or("unknown email"),
        errors.len()
    )];
    messages.extend(errors.iter().map(|err| format!("{err}\n{err:?}")));
    messages
}
