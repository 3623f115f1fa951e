//! `attestations.template.json`: provenance documents published next to the source archive.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use regpub_dl::{
    artifact::{Artifact, DownloadOptions},
    error::DownloadError,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    document::{self, Document},
    error::{RegistryError, Result},
    substitution::{unsubstituted_vars, Substitutions},
};

pub const ATTESTATIONS_TEMPLATE_FILE: &str = "attestations.template.json";
pub const ATTESTATIONS_FILE: &str = "attestations.json";

#[derive(Debug, Clone)]
pub struct AttestationsTemplate {
    path: PathBuf,
    doc: Document,
}

impl AttestationsTemplate {
    /// Loads the template if the file exists.
    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |message: String| {
            RegistryError::InvalidAttestationsTemplate {
                path: path.to_path_buf(),
                message,
            }
        };

        let content = document::read_text(path)?;
        let doc: Value = serde_json::from_str(&content).map_err(|err| invalid(err.to_string()))?;
        let Value::Object(doc) = doc else {
            return Err(invalid("missing attestations field".into()));
        };

        let attestations = match doc.get("attestations") {
            None | Some(Value::Null) => return Err(invalid("missing attestations field".into())),
            Some(Value::Object(attestations)) => attestations,
            Some(_) => return Err(invalid("invalid attestations field".into())),
        };

        for (key, attestation) in attestations {
            let Value::Object(attestation) = attestation else {
                return Err(invalid(format!("invalid attestation with key {key}")));
            };
            match attestation.get("url") {
                None | Some(Value::Null) => {
                    return Err(invalid(format!("attestation with key {key} is missing url")))
                }
                Some(Value::String(url)) if url.is_empty() => {
                    return Err(invalid(format!("attestation with key {key} is missing url")))
                }
                Some(Value::String(_)) => {}
                Some(_) => {
                    return Err(invalid(format!("attestation with key {key} has invalid url")))
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn attestations(&self) -> impl Iterator<Item = (&String, &Map<String, Value>)> {
        self.doc
            .get("attestations")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| Some((key, value.as_object()?)))
    }

    /// `(key, url)` of every attestation, in document order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.attestations()
            .map(|(key, attestation)| {
                let url = attestation
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                (key.clone(), url.to_string())
            })
            .collect()
    }

    /// Substitutes both the urls and the keys. Renamed keys keep their position.
    pub fn substitute(&mut self, vars: &Substitutions) {
        let Some(Value::Object(attestations)) = self.doc.get_mut("attestations") else {
            return;
        };

        let renamed: Map<String, Value> = std::mem::take(attestations)
            .into_iter()
            .map(|(key, mut attestation)| {
                if let Some(Value::String(url)) = attestation.get_mut("url") {
                    *url = vars.apply(url);
                }
                (vars.apply(&key), attestation)
            })
            .collect();
        *attestations = renamed;
    }

    pub fn validate_fully_substituted(&self) -> Result<()> {
        let vars: BTreeSet<String> = self
            .entries()
            .iter()
            .flat_map(|(key, url)| {
                unsubstituted_vars(key)
                    .into_iter()
                    .chain(unsubstituted_vars(url))
            })
            .collect();

        if vars.is_empty() {
            return Ok(());
        }
        Err(RegistryError::UnsubstitutedVariables {
            path: self.path.clone(),
            vars,
        })
    }

    /// Downloads every attestation concurrently and records its integrity hash.
    pub fn compute_integrity_hashes(&mut self, options: &DownloadOptions) -> Result<()> {
        let hashes: Vec<(String, String)> = self
            .entries()
            .into_par_iter()
            .map(|(key, url)| {
                debug!(url = %url, key = %key, "downloading attestation");
                let mut artifact = Artifact::new(&url);
                artifact.download(options).map_err(|err| {
                    match err {
                        DownloadError::ArtifactDownload { url, status } => {
                            RegistryError::AttestationDownload { url, status }
                        }
                        other => RegistryError::Download(other),
                    }
                })?;
                let integrity = artifact.compute_integrity_hash()?;
                artifact.cleanup();
                Ok((key, integrity))
            })
            .collect::<Result<_>>()?;

        if let Some(Value::Object(attestations)) = self.doc.get_mut("attestations") {
            for (key, integrity) in hashes {
                if let Some(Value::Object(attestation)) = attestations.get_mut(&key) {
                    attestation.insert("integrity".into(), Value::String(integrity));
                }
            }
        }
        Ok(())
    }

    pub fn save(&self, dest: &Path) -> Result<()> {
        document::write_document(dest, &self.doc)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use regpub_utils::hash::integrity_hash_bytes;
    use tempfile::tempdir;

    use super::*;

    fn write(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join(ATTESTATIONS_TEMPLATE_FILE);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(AttestationsTemplate::try_load(&dir.path().join(ATTESTATIONS_TEMPLATE_FILE))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_validation_errors() {
        let dir = tempdir().unwrap();
        let cases = [
            (r#"{}"#, "missing attestations field"),
            (r#"{"attestations": []}"#, "invalid attestations field"),
            (r#"{"attestations": {"a": 1}}"#, "invalid attestation with key a"),
            (r#"{"attestations": {"a": {}}}"#, "attestation with key a is missing url"),
            (r#"{"attestations": {"a": {"url": 2}}}"#, "attestation with key a has invalid url"),
        ];
        for (content, message) in cases {
            let path = write(dir.path(), content);
            let err = AttestationsTemplate::load(&path).unwrap_err();
            assert!(
                err.to_string().ends_with(message),
                "{content}: {err}"
            );
        }
    }

    #[test]
    fn test_substitute_renames_keys_in_place() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"{
    "mediaType": "application/vnd.build.bazel.registry.attestation+json;version=1.0.0",
    "attestations": {
        "source.json": {"url": "https://x/{TAG}/source.json.intoto.jsonl"},
        "{REPO}-{TAG}.tar.gz": {"url": "https://x/{TAG}/{REPO}-{TAG}.tar.gz.intoto.jsonl"},
        "MODULE.bazel": {"url": "https://x/{TAG}/MODULE.bazel.intoto.jsonl"}
    }
}"#,
        );

        let mut template = AttestationsTemplate::load(&path).unwrap();
        template.substitute(&Substitutions::default().repo("rules_foo").tag("v1.0.0"));
        template.validate_fully_substituted().unwrap();

        let keys: Vec<String> = template.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["source.json", "rules_foo-v1.0.0.tar.gz", "MODULE.bazel"]);
        assert_eq!(
            template.entries()[1].1,
            "https://x/v1.0.0/rules_foo-v1.0.0.tar.gz.intoto.jsonl"
        );
    }

    #[test]
    fn test_unsubstituted_keys_and_urls_are_reported() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"{"attestations": {"{REPO}.tar.gz": {"url": "https://x/{OWNER}/a"}}}"#,
        );
        let template = AttestationsTemplate::load(&path).unwrap();
        match template.validate_fully_substituted().unwrap_err() {
            RegistryError::UnsubstitutedVariables { vars, .. } => {
                assert_eq!(vars, BTreeSet::from(["OWNER".into(), "REPO".into()]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_compute_integrity_hashes_from_local_files() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.intoto.jsonl");
        let second = dir.path().join("b.intoto.jsonl");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let path = write(
            dir.path(),
            &format!(
                r#"{{"attestations": {{"a": {{"url": "{}"}}, "b": {{"url": "{}"}}}}}}"#,
                url::Url::from_file_path(&first).unwrap(),
                url::Url::from_file_path(&second).unwrap(),
            ),
        );

        let mut template = AttestationsTemplate::load(&path).unwrap();
        template
            .compute_integrity_hashes(&DownloadOptions::new())
            .unwrap();

        let dest = dir.path().join(ATTESTATIONS_FILE);
        template.save(&dest).unwrap();
        let saved: Value = serde_json::from_str(&fs::read_to_string(dest).unwrap()).unwrap();
        assert_eq!(
            saved["attestations"]["a"]["integrity"],
            integrity_hash_bytes(b"first")
        );
        assert_eq!(
            saved["attestations"]["b"]["integrity"],
            integrity_hash_bytes(b"second")
        );
    }
}
