//! The `MODULE.bazel` manifest of a release.

use std::{
    ops::Range,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    document,
    error::{RegistryError, Result},
};

pub const MODULE_FILE: &str = "MODULE.bazel";

static MODULE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)module\([^)]*?\bname\s*=\s*"([a-z]([a-z0-9._-]*[a-z0-9])?)""#)
        .expect("module name pattern is valid")
});

static MODULE_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)module\([^)]*?\bversion\s*=\s*"([^"]*)""#)
        .expect("module version pattern is valid")
});

static MODULE_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"module\(([^)]*)\)").expect("module call pattern is valid"));

#[derive(Debug, Clone)]
pub struct ModuleFile {
    path: PathBuf,
    content: String,
}

impl ModuleFile {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            content: document::read_text(path)?,
        })
    }

    pub fn from_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn name(&self) -> Result<&str> {
        MODULE_NAME_RE
            .captures(&self.content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                RegistryError::ModuleName {
                    path: self.path.clone(),
                }
            })
    }

    pub fn version(&self) -> Option<&str> {
        self.version_range().map(|range| &self.content[range])
    }

    fn version_range(&self) -> Option<Range<usize>> {
        MODULE_VERSION_RE
            .captures(&self.content)
            .and_then(|c| c.get(1))
            .map(|m| m.range())
    }

    /// Sets the module version, inserting the attribute when the call has none.
    ///
    /// Only the version string (or the inserted line) changes; everything else is kept
    /// byte-for-byte. A file without a `module()` call is an error.
    pub fn stamp_version(&mut self, version: &str) -> Result<()> {
        if let Some(range) = self.version_range() {
            self.content.replace_range(range, version);
            return Ok(());
        }

        let args = MODULE_CALL_RE
            .captures(&self.content)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                RegistryError::NoModuleCall {
                    path: self.path.clone(),
                    version: version.to_string(),
                }
            })?;

        let args_start = args.start();
        let (body_len, needs_comma) = last_argument_end(args.as_str());
        let body_end = args_start + body_len;

        let mut insertion = String::new();
        if needs_comma {
            let code_end = args_start + code_end_of_last_argument(args.as_str());
            self.content.insert(code_end, ',');
        }
        let body_end = if needs_comma { body_end + 1 } else { body_end };
        insertion.push_str(&format!("\n    version = \"{version}\","));
        if !self.content[body_end..].starts_with('\n') {
            insertion.push('\n');
        }
        self.content.insert_str(body_end, &insertion);
        Ok(())
    }

    /// Applies a unified diff to the content. A mismatching pre-image is an error.
    pub fn patch_content(&mut self, patch_name: &str, patch: &str) -> Result<()> {
        let parsed = diffy::Patch::from_str(patch).map_err(|err| {
            RegistryError::InvalidPatch {
                patch: patch_name.to_string(),
                message: err.to_string(),
            }
        })?;
        self.content = diffy::apply(&self.content, &parsed).map_err(|err| {
            RegistryError::PatchModule {
                patch: patch_name.to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(())
    }

    pub fn save(&self, dest: &Path) -> Result<()> {
        std::fs::write(dest, &self.content)
            .map_err(|err| RegistryError::io(format!("writing {}", dest.display()), err))
    }
}

/// Byte offset where the code of a line ends, ignoring a trailing `#` comment.
fn code_len(line: &str) -> usize {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return line[..i].trim_end().len(),
            _ => {}
        }
    }
    line.trim_end().len()
}

/// The last line of `args` holding code: its start offset and code length.
fn last_code_line(args: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    let mut last = None;
    for line in args.split_inclusive('\n') {
        let len = code_len(line.trim_end_matches('\n'));
        if len > 0 {
            last = Some((offset, len));
        }
        offset += line.len();
    }
    last
}

/// Where new text goes (end of the last code line, including its comment) and whether that
/// argument still needs a trailing comma.
fn last_argument_end(args: &str) -> (usize, bool) {
    match last_code_line(args) {
        None => (0, false),
        Some((start, len)) => {
            let line = &args[start..];
            let line_end = line.find('\n').unwrap_or(line.len());
            let line_end = start + line[..line_end].trim_end().len();
            let needs_comma = !args[start..start + len].ends_with([',', '(']);
            (line_end, needs_comma)
        }
    }
}

fn code_end_of_last_argument(args: &str) -> usize {
    last_code_line(args)
        .map(|(start, len)| start + len)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    fn module(content: &str) -> ModuleFile {
        ModuleFile::from_content(MODULE_FILE, content)
    }

    #[test]
    fn test_name_and_version() {
        let file = module(
            "module(\n    name = \"rules_foo\",\n    compatibility_level = 1,\n    version = \"1.2.3\",\n)\n",
        );
        assert_eq!(file.name().unwrap(), "rules_foo");
        assert_eq!(file.version(), Some("1.2.3"));
    }

    #[test]
    fn test_repo_name_is_not_the_module_name() {
        let file = module("module(repo_name = \"foo\", name = \"bar\")\n");
        assert_eq!(file.name().unwrap(), "bar");
    }

    #[test]
    fn test_invalid_name_is_an_error() {
        for content in ["module(name = \"Rules\")", "module(version = \"1.0\")", "bazel_dep(name = \"x\")"] {
            let err = module(content).name().unwrap_err();
            assert!(matches!(err, RegistryError::ModuleName { .. }), "{content}");
        }
    }

    #[test]
    fn test_stamp_existing_version() {
        let mut file = module(
            "# header\nmodule(\n    name = \"rules_foo\",\n    version = \"0.0.0\",\n)\n\nbazel_dep(name = \"x\", version = \"9.9\")\n",
        );
        file.stamp_version("4.5.6").unwrap();
        assert_eq!(
            file.content(),
            "# header\nmodule(\n    name = \"rules_foo\",\n    version = \"4.5.6\",\n)\n\nbazel_dep(name = \"x\", version = \"9.9\")\n"
        );
    }

    #[test]
    fn test_stamp_empty_version() {
        let mut file = module("module(name = \"foo\", version = \"\")\n");
        file.stamp_version("1.0.0").unwrap();
        assert_eq!(file.version(), Some("1.0.0"));
    }

    #[test]
    fn test_stamp_inserts_missing_version() {
        let cases = [
            (
                "module(\n    name = \"foo\",\n    compatibility_level = 1,\n)\n",
                "module(\n    name = \"foo\",\n    compatibility_level = 1,\n    version = \"1.0.0\",\n)\n",
            ),
            (
                "module(name = \"foo\")\n",
                "module(name = \"foo\",\n    version = \"1.0.0\",\n)\n",
            ),
            (
                "module(\n    name = \"foo\"  # the name\n)\n",
                "module(\n    name = \"foo\",  # the name\n    version = \"1.0.0\",\n)\n",
            ),
            (
                "module(\n    name = \"foo\",  # the name\n)\n",
                "module(\n    name = \"foo\",  # the name\n    version = \"1.0.0\",\n)\n",
            ),
            ("module()\n", "module(\n    version = \"1.0.0\",\n)\n"),
        ];

        for (input, expected) in cases {
            let mut file = module(input);
            file.stamp_version("1.0.0").unwrap();
            assert_eq!(file.content(), expected);
            assert_eq!(file.version(), Some("1.0.0"));
        }
    }

    #[test]
    fn test_stamp_without_module_call_fails() {
        let mut file = module("bazel_dep(name = \"x\", version = \"1.0\")\n");
        let err = file.stamp_version("1.0.0").unwrap_err();
        assert!(
            matches!(err, RegistryError::NoModuleCall { ref version, .. } if version == "1.0.0")
        );
        assert!(err.is_user_facing());
        assert_eq!(file.content(), "bazel_dep(name = \"x\", version = \"1.0\")\n");
    }

    #[test]
    fn test_patch_content() {
        let mut file = module("module(\n    name = \"foo\",\n    version = \"1.0.0\",\n)\n");
        let patch = "--- a/MODULE.bazel\n+++ b/MODULE.bazel\n@@ -1,4 +1,5 @@\n module(\n     name = \"foo\",\n     version = \"1.0.0\",\n+    compatibility_level = 2,\n )\n";
        file.patch_content("compat.patch", patch).unwrap();
        assert_eq!(
            file.content(),
            "module(\n    name = \"foo\",\n    version = \"1.0.0\",\n    compatibility_level = 2,\n)\n"
        );
    }

    #[test]
    fn test_patch_with_wrong_preimage_fails() {
        let mut file = module("module(\n    name = \"bar\",\n)\n");
        let patch = "--- a/MODULE.bazel\n+++ b/MODULE.bazel\n@@ -1,3 +1,3 @@\n module(\n-    name = \"foo\",\n+    name = \"baz\",\n )\n";
        let err = file.patch_content("rename.patch", patch).unwrap_err();
        assert!(matches!(err, RegistryError::PatchModule { ref patch, .. } if patch == "rename.patch"));
        assert_eq!(file.content(), "module(\n    name = \"bar\",\n)\n");
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MODULE_FILE);
        std::fs::write(&path, "module(name = \"foo\")\n").unwrap();

        let mut file = ModuleFile::load(&path).unwrap();
        file.stamp_version("2.0.0").unwrap();
        let dest = dir.path().join("out.bazel");
        file.save(&dest).unwrap();
        assert_eq!(
            ModuleFile::load(&dest).unwrap().version(),
            Some("2.0.0")
        );
    }
}
