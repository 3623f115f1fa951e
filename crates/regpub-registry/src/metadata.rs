//! `metadata.json`: the published and yanked versions of a module.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    document::{self, Document},
    error::{RegistryError, Result},
    version::Version,
};

pub const METADATA_TEMPLATE_FILE: &str = "metadata.template.json";
pub const METADATA_FILE: &str = "metadata.json";

/// A module maintainer. Only the name is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataFile {
    path: PathBuf,
    doc: Document,
}

impl MetadataFile {
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |message: &str| {
            RegistryError::Metadata {
                path: path.to_path_buf(),
                message: message.to_string(),
            }
        };

        let content = document::read_text(path)?;
        let doc: Value = serde_json::from_str(&content).map_err(|err| {
            RegistryError::Metadata {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;
        let Value::Object(doc) = doc else {
            return Err(invalid("could not parse 'versions'"));
        };

        let versions_ok = doc
            .get("versions")
            .and_then(Value::as_array)
            .is_some_and(|versions| versions.iter().all(Value::is_string));
        if !versions_ok {
            return Err(invalid("could not parse 'versions'"));
        }

        let yanked_ok = doc
            .get("yanked_versions")
            .and_then(Value::as_object)
            .is_some_and(|yanked| yanked.values().all(Value::is_string));
        if !yanked_ok {
            return Err(invalid("could not parse 'yanked_versions'"));
        }

        if let Some(maintainers) = doc.get("maintainers") {
            let maintainers_ok = maintainers
                .as_array()
                .is_some_and(|list| list.iter().all(Value::is_object));
            if !maintainers_ok {
                return Err(invalid("could not parse 'maintainers'"));
            }
        }

        let mut metadata = Self {
            path: path.to_path_buf(),
            doc,
        };
        metadata.sort_versions();
        Ok(metadata)
    }

    /// Best-effort read of the maintainers of a file that may otherwise be invalid.
    ///
    /// Entries without a string `name` are skipped. Any failure yields an empty list.
    pub fn emergency_parse_maintainers(path: &Path) -> Vec<Maintainer> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(&content) else {
            return Vec::new();
        };
        parse_maintainers(doc.get("maintainers"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn versions(&self) -> Vec<&str> {
        self.doc
            .get("versions")
            .and_then(Value::as_array)
            .map(|versions| versions.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn yanked_versions(&self) -> Vec<(&str, &str)> {
        self.doc
            .get("yanked_versions")
            .and_then(Value::as_object)
            .map(|yanked| {
                yanked
                    .iter()
                    .filter_map(|(version, reason)| Some((version.as_str(), reason.as_str()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn maintainers(&self) -> Vec<Maintainer> {
        parse_maintainers(self.doc.get("maintainers"))
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions().contains(&version)
    }

    pub fn clear_versions(&mut self) {
        self.doc.insert("versions".into(), Value::Array(Vec::new()));
    }

    pub fn clear_yanked_versions(&mut self) {
        self.doc
            .insert("yanked_versions".into(), Value::Object(Map::new()));
    }

    pub fn add_versions<I, S>(&mut self, versions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self
            .doc
            .entry("versions")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = list {
            list.extend(versions.into_iter().map(|v| Value::String(v.into())));
        }
        self.sort_versions();
    }

    /// Merges yanked versions. Existing reasons are overwritten.
    pub fn add_yanked_versions<I, K, V>(&mut self, yanked: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = self
            .doc
            .entry("yanked_versions")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = map {
            for (version, reason) in yanked {
                map.insert(version.into(), Value::String(reason.into()));
            }
        }
    }

    pub fn save(&self, dest: &Path) -> Result<()> {
        document::write_document(dest, &self.doc)
    }

    /// Orders `versions` with the version comparator. Strings that are not valid versions go
    /// first, in lexical order.
    fn sort_versions(&mut self) {
        let Some(Value::Array(list)) = self.doc.get_mut("versions") else {
            return;
        };

        list.retain(Value::is_string);
        list.sort_by(|a, b| {
            compare_listed(a.as_str().unwrap_or_default(), b.as_str().unwrap_or_default())
        });
    }
}

fn parse_maintainers(value: Option<&Value>) -> Vec<Maintainer> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect()
}

/// Orders two version strings the way `metadata.json` lists them.
pub fn compare_listed(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Err(_), Ok(_)) => Ordering::Less,
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
