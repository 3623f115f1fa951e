//! Git operations the publisher relies on.

use std::{path::Path, process::Command};

use tracing::debug;

use crate::error::{PublishError, PublishResult};

pub trait GitClient: Send + Sync {
    /// Clones `url` into `dest` with a depth of one, optionally at `reference`.
    fn shallow_clone(&self, url: &str, dest: &Path, reference: Option<&str>) -> PublishResult<()>;

    fn checkout(&self, repo: &Path, reference: &str) -> PublishResult<()>;

    fn set_commit_identity(&self, repo: &Path, name: &str, email: &str) -> PublishResult<()>;

    fn checkout_new_branch(&self, repo: &Path, branch: &str) -> PublishResult<()>;

    /// Stages everything and commits it.
    fn commit_changes(&self, repo: &Path, message: &str) -> PublishResult<()>;

    fn has_remote(&self, repo: &Path, remote: &str) -> PublishResult<bool>;

    fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> PublishResult<()>;

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> PublishResult<()>;
}

/// Runs the `git` executable.
#[derive(Debug, Clone)]
pub struct ProcessGitClient {
    program: String,
}

impl Default for ProcessGitClient {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl ProcessGitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, operation: &'static str, dir: Option<&Path>, args: &[&str]) -> PublishResult<String> {
        let mut command = Command::new(&self.program);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command.args(args);
        debug!(operation, ?args, "running git");

        let output = command.output().map_err(|err| {
            PublishError::Git {
                operation,
                message: err.to_string(),
            }
        })?;

        if !output.status.success() {
            return Err(PublishError::Git {
                operation,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl GitClient for ProcessGitClient {
    fn shallow_clone(&self, url: &str, dest: &Path, reference: Option<&str>) -> PublishResult<()> {
        let dest = dest.to_string_lossy();
        let mut args = vec!["clone", "--depth", "1"];
        if let Some(reference) = reference {
            args.extend(["--branch", reference]);
        }
        args.extend([url, &*dest]);
        self.run("clone", None, &args).map(drop)
    }

    fn checkout(&self, repo: &Path, reference: &str) -> PublishResult<()> {
        self.run("checkout", Some(repo), &["checkout", reference])
            .map(drop)
    }

    fn set_commit_identity(&self, repo: &Path, name: &str, email: &str) -> PublishResult<()> {
        self.run("config", Some(repo), &["config", "user.name", name])?;
        self.run("config", Some(repo), &["config", "user.email", email])
            .map(drop)
    }

    fn checkout_new_branch(&self, repo: &Path, branch: &str) -> PublishResult<()> {
        self.run("checkout", Some(repo), &["checkout", "-b", branch])
            .map(drop)
    }

    fn commit_changes(&self, repo: &Path, message: &str) -> PublishResult<()> {
        self.run("add", Some(repo), &["add", "--all"])?;
        self.run("commit", Some(repo), &["commit", "-m", message])
            .map(drop)
    }

    fn has_remote(&self, repo: &Path, remote: &str) -> PublishResult<bool> {
        let remotes = self.run("remote", Some(repo), &["remote"])?;
        Ok(remotes.lines().any(|line| line.trim() == remote))
    }

    fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> PublishResult<()> {
        self.run("remote", Some(repo), &["remote", "add", remote, url])
            .map(drop)
    }

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> PublishResult<()> {
        self.run("push", Some(repo), &["push", remote, branch])
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[test]
    fn test_commit_and_remotes() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let repo = dir.path();
        let git = ProcessGitClient::new();
        git.run("init", Some(repo), &["init", "--quiet"]).unwrap();
        git.set_commit_identity(repo, "Test", "test@example.com")
            .unwrap();
        git.checkout_new_branch(repo, "acme/rules_foo@v1.0.0-0badf00d")
            .unwrap();

        fs::write(repo.join("file.txt"), "content").unwrap();
        git.commit_changes(repo, "Publish acme/rules_foo@v1.0.0")
            .unwrap();
        let log = git
            .run("log", Some(repo), &["log", "--format=%an <%ae> %s"])
            .unwrap();
        assert_eq!(log.trim(), "Test <test@example.com> Publish acme/rules_foo@v1.0.0");

        assert!(!git.has_remote(repo, "authed-fork").unwrap());
        git.add_remote(repo, "authed-fork", "https://example.invalid/fork.git")
            .unwrap();
        assert!(git.has_remote(repo, "authed-fork").unwrap());
    }

    #[test]
    fn test_failures_carry_stderr() {
        let git = ProcessGitClient::with_program("definitely-not-a-git-binary");
        let err = git.checkout(Path::new("."), "main").unwrap_err();
        assert!(matches!(err, PublishError::Git { operation: "checkout", .. }));
    }
}
