//! Per-repository settings read from the template directory's `config.yaml` or `config.yml`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

pub const CONFIG_FILE_NAMES: [&str; 2] = ["config.yaml", "config.yml"];

/// Identity every commit is attributed to, regardless of who cut the release.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FixedReleaser {
    pub login: String,
    pub email: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RulesetConfig {
    #[serde(default = "default_module_roots")]
    pub module_roots: Vec<String>,

    #[serde(default)]
    pub fixed_releaser: Option<FixedReleaser>,
}

fn default_module_roots() -> Vec<String> {
    vec![".".to_string()]
}

impl Default for RulesetConfig {
    fn default() -> Self {
        Self {
            module_roots: default_module_roots(),
            fixed_releaser: None,
        }
    }
}

impl RulesetConfig {
    /// The config file inside `template_dir`, if one exists.
    pub fn find(template_dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| template_dir.join(name))
            .find(|path| path.is_file())
    }

    /// Reads the configuration from `template_dir`. A missing file yields the defaults.
    pub fn load(template_dir: &Path) -> Result<Self> {
        let Some(path) = Self::find(template_dir) else {
            debug!(dir = %template_dir.display(), "no ruleset config, using defaults");
            return Ok(Self::default());
        };

        let content = fs::read_to_string(&path)?;
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let invalid = |message: String| {
            ConfigError::InvalidRulesetConfig {
                path: path.to_path_buf(),
                message,
            }
        };

        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(content)
            .map_err(|_| invalid("cannot parse file as yaml".into()))?;

        // An empty document parses as null.
        if value.is_null() {
            return Ok(Self::default());
        }

        let raw: RawRulesetConfig = serde_yaml_ng::from_value(value)
            .map_err(|_| invalid("expected a mapping at the top level".into()))?;

        let module_roots = match raw.module_roots {
            None => default_module_roots(),
            Some(roots) => {
                serde_yaml_ng::from_value::<Vec<String>>(roots)
                    .ok()
                    .filter(|roots| !roots.is_empty())
                    .ok_or_else(|| invalid("Invalid moduleRoots in config file".into()))?
            }
        };

        let fixed_releaser = match raw.fixed_releaser {
            None => None,
            Some(releaser) => {
                let releaser = serde_yaml_ng::from_value::<FixedReleaser>(releaser)
                    .ok()
                    .filter(|r| !r.login.trim().is_empty() && !r.email.trim().is_empty())
                    .ok_or_else(|| invalid("Invalid fixedReleaser in config file".into()))?;
                Some(releaser)
            }
        };

        Ok(Self {
            module_roots,
            fixed_releaser,
        })
    }
}

/// Loosely typed view so each key can be validated with its own message.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRulesetConfig {
    module_roots: Option<serde_yaml_ng::Value>,
    fixed_releaser: Option<serde_yaml_ng::Value>,
}
