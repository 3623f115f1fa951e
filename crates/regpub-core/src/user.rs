use regpub_config::ruleset::FixedReleaser;
use serde::{Deserialize, Serialize};

/// A GitHub account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub username: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            username: username.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// GitHub's no-reply address for the account.
    pub fn noreply_email(&self) -> String {
        match self.id {
            Some(id) => format!("{id}+{}@users.noreply.github.com", self.username),
            None => format!("{}@users.noreply.github.com", self.username),
        }
    }
}

/// Name and email a commit is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl From<&User> for CommitAuthor {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone().unwrap_or_else(|| user.username.clone()),
            email: user
                .email
                .clone()
                .filter(|email| !email.is_empty())
                .unwrap_or_else(|| user.noreply_email()),
        }
    }
}

impl From<&FixedReleaser> for CommitAuthor {
    fn from(releaser: &FixedReleaser) -> Self {
        Self {
            name: releaser.login.clone(),
            email: releaser.email.clone(),
        }
    }
}
