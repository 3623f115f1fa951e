use std::{collections::BTreeSet, fmt};

/// Placeholders that templates may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubstitutableVar {
    Owner,
    Repo,
    Tag,
    Version,
}

impl SubstitutableVar {
    pub const ALL: [SubstitutableVar; 4] = [
        SubstitutableVar::Owner,
        SubstitutableVar::Repo,
        SubstitutableVar::Tag,
        SubstitutableVar::Version,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubstitutableVar::Owner => "OWNER",
            SubstitutableVar::Repo => "REPO",
            SubstitutableVar::Tag => "TAG",
            SubstitutableVar::Version => "VERSION",
        }
    }

    /// The literal `{NAME}` token.
    pub fn token(self) -> String {
        format!("{{{}}}", self.name())
    }
}

impl fmt::Display for SubstitutableVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values for a subset of [`SubstitutableVar`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitutions {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub tag: Option<String>,
    pub version: Option<String>,
}

impl Substitutions {
    /// Values for every variable.
    pub fn full(owner: &str, repo: &str, tag: &str, version: &str) -> Self {
        Self {
            owner: Some(owner.to_string()),
            repo: Some(repo.to_string()),
            tag: Some(tag.to_string()),
            version: Some(version.to_string()),
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn get(&self, var: SubstitutableVar) -> Option<&str> {
        match var {
            SubstitutableVar::Owner => self.owner.as_deref(),
            SubstitutableVar::Repo => self.repo.as_deref(),
            SubstitutableVar::Tag => self.tag.as_deref(),
            SubstitutableVar::Version => self.version.as_deref(),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        substitute_vars(text, self)
    }
}

/// Replaces every `{KEY}` for the keys that have a value. Other tokens are left as they are.
pub fn substitute_vars(text: &str, vars: &Substitutions) -> String {
    SubstitutableVar::ALL
        .iter()
        .fold(text.to_string(), |acc, &var| {
            match vars.get(var) {
                Some(value) => acc.replace(&var.token(), value),
                None => acc,
            }
        })
}

/// Names of the reserved tokens still present in `text`.
pub fn unsubstituted_vars(text: &str) -> BTreeSet<String> {
    SubstitutableVar::ALL
        .iter()
        .filter(|var| text.contains(&var.token()))
        .map(|var| var.name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "https://github.com/{OWNER}/{REPO}/releases/download/{TAG}/{REPO}-{VERSION}.tar.gz";

    #[test]
    fn test_full_substitution_leaves_nothing() {
        let vars = Substitutions::full("bazel-contrib", "rules_foo", "v1.2.3", "1.2.3");
        let out = substitute_vars(TEMPLATE, &vars);
        assert_eq!(
            out,
            "https://github.com/bazel-contrib/rules_foo/releases/download/v1.2.3/rules_foo-1.2.3.tar.gz"
        );
        assert!(unsubstituted_vars(&out).is_empty());
    }

    #[test]
    fn test_partial_substitution_reports_the_rest() {
        let vars = Substitutions::default().owner("bazel-contrib").version("1.2.3");
        let out = substitute_vars(TEMPLATE, &vars);
        assert_eq!(
            unsubstituted_vars(&out),
            BTreeSet::from(["REPO".to_string(), "TAG".to_string()])
        );

        let rest = Substitutions::default().repo("rules_foo").tag("v1.2.3");
        let done = rest.apply(&out);
        assert!(unsubstituted_vars(&done).is_empty());
        assert_eq!(
            done,
            substitute_vars(
                TEMPLATE,
                &Substitutions::full("bazel-contrib", "rules_foo", "v1.2.3", "1.2.3")
            )
        );
    }

    #[test]
    fn test_unknown_tokens_are_ignored() {
        let out = substitute_vars("{NAME}-{VERSION}", &Substitutions::default().version("1"));
        assert_eq!(out, "{NAME}-1");
        assert!(unsubstituted_vars(&out).is_empty());
    }
}
