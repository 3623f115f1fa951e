//! `source.template.json`: where the release archive lives and how to unpack it.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{
    document::{self, Document},
    error::{RegistryError, Result},
    substitution::{unsubstituted_vars, Substitutions},
};

pub const SOURCE_TEMPLATE_FILE: &str = "source.template.json";
pub const SOURCE_FILE: &str = "source.json";

/// Fields that may reference substitution variables.
const SUBSTITUTED_FIELDS: [&str; 2] = ["url", "strip_prefix"];

#[derive(Debug, Clone)]
pub struct SourceTemplate {
    path: PathBuf,
    doc: Document,
}

impl SourceTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |reason: &str| {
            RegistryError::InvalidSourceTemplate {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            }
        };

        let content = document::read_text(path)?;
        let doc = document::parse_object(&content).ok_or_else(|| invalid("cannot parse file as json"))?;

        if doc.get("strip_prefix").is_some_and(|v| !v.is_string()) {
            return Err(invalid("invalid strip_prefix field"));
        }
        match doc.get("url") {
            None | Some(Value::Null) => return Err(invalid("missing url field")),
            Some(Value::String(url)) if url.is_empty() => return Err(invalid("missing url field")),
            Some(Value::String(_)) => {}
            Some(_) => return Err(invalid("invalid url field")),
        }

        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> &str {
        self.doc.get("url").and_then(Value::as_str).unwrap_or_default()
    }

    /// The archive prefix stripped on extraction, empty when unset.
    pub fn strip_prefix(&self) -> &str {
        self.doc
            .get("strip_prefix")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn integrity(&self) -> Option<&str> {
        self.doc.get("integrity").and_then(Value::as_str)
    }

    pub fn substitute(&mut self, vars: &Substitutions) {
        for field in SUBSTITUTED_FIELDS {
            if let Some(Value::String(value)) = self.doc.get_mut(field) {
                *value = vars.apply(value);
            }
        }
    }

    pub fn unsubstituted_vars(&self) -> BTreeSet<String> {
        SUBSTITUTED_FIELDS
            .iter()
            .filter_map(|field| self.doc.get(*field).and_then(Value::as_str))
            .flat_map(unsubstituted_vars)
            .collect()
    }

    pub fn validate_fully_substituted(&self) -> Result<()> {
        let vars = self.unsubstituted_vars();
        if vars.is_empty() {
            return Ok(());
        }
        Err(RegistryError::UnsubstitutedVariables {
            path: self.path.clone(),
            vars,
        })
    }

    pub fn set_integrity_hash(&mut self, integrity: impl Into<String>) {
        self.doc
            .insert("integrity".into(), Value::String(integrity.into()));
    }

    /// Records a patch and the strip depth it applies with.
    pub fn add_patch(&mut self, name: &str, integrity: &str, strip: u32) {
        let patches = self
            .doc
            .entry("patches")
            .or_insert_with(|| Value::Object(Default::default()));
        if !patches.is_object() {
            *patches = Value::Object(Default::default());
        }
        if let Value::Object(patches) = patches {
            patches.insert(name.to_string(), Value::String(integrity.to_string()));
        }
        self.doc.insert("patch_strip".into(), Value::from(strip));
    }

    pub fn patches(&self) -> Vec<(&str, &str)> {
        self.doc
            .get("patches")
            .and_then(Value::as_object)
            .map(|patches| {
                patches
                    .iter()
                    .filter_map(|(name, hash)| Some((name.as_str(), hash.as_str()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn patch_strip(&self) -> Option<u64> {
        self.doc.get("patch_strip").and_then(Value::as_u64)
    }

    pub fn save(&self, dest: &Path) -> Result<()> {
        document::write_document(dest, &self.doc)
    }
}
