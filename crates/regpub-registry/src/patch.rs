//! Helpers for the patch files published alongside an entry.

use std::path::{Path, PathBuf};

use regpub_utils::fs::list_files_with_suffix;

use crate::{
    error::{RegistryError, Result},
    module_file::MODULE_FILE,
};

pub const PATCHES_DIR: &str = "patches";

/// Strip depth of patches generated with `a/` and `b/` prefixes.
pub const PATCH_STRIP: u32 = 1;

/// Name of the patch that rewrites the module version.
pub const VERSION_PATCH_NAME: &str = "module_dot_bazel_version.patch";

/// The part of a (possibly multi-file) unified diff that touches one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Target path from the `+++` header, without timestamps.
    pub target: String,
    pub text: String,
}

impl FilePatch {
    /// Whether the patch, applied with `strip` leading components removed, edits
    /// `MODULE.bazel` at the archive root.
    pub fn targets_module_file(&self, strip: u32) -> bool {
        let mut components = self
            .target
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".");
        for _ in 0..strip {
            if components.next().is_none() {
                return false;
            }
        }
        components.eq([MODULE_FILE])
    }
}

fn header_path(line: &str, prefix: &str) -> Option<String> {
    let rest = line.strip_prefix(prefix)?;
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    Some(path.to_string())
}

/// Splits a unified diff into its per-file parts.
///
/// Lines outside `---`/`+++` headers and hunks (such as `diff --git` or `index` lines) are
/// dropped.
pub fn split_file_patches(patch: &str) -> Vec<FilePatch> {
    let lines: Vec<&str> = patch.split_inclusive('\n').collect();
    let mut patches = Vec::new();
    let mut current: Option<FilePatch> = None;
    let mut in_hunk = false;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let next = lines.get(i + 1).copied().unwrap_or_default();

        if line.starts_with("--- ") && next.starts_with("+++ ") {
            patches.extend(current.take());
            let target = header_path(next.trim_end_matches('\n'), "+++ ").unwrap_or_default();
            current = Some(FilePatch {
                target,
                text: format!("{line}{next}"),
            });
            in_hunk = false;
            i += 2;
            continue;
        }

        if let Some(patch) = current.as_mut() {
            if line.starts_with("@@") {
                in_hunk = true;
                patch.text.push_str(line);
            } else if in_hunk && line.starts_with([' ', '+', '-', '\\']) {
                patch.text.push_str(line);
            } else {
                in_hunk = false;
            }
        }
        i += 1;
    }

    patches.extend(current);
    patches
}

/// The portions of `patch` that edit the root `MODULE.bazel`.
pub fn module_file_patches(patch: &str, strip: u32) -> Vec<FilePatch> {
    split_file_patches(patch)
        .into_iter()
        .filter(|p| p.targets_module_file(strip))
        .collect()
}

/// A unified diff turning `before` into `after`, applicable with strip depth [`PATCH_STRIP`].
pub fn create_module_patch(before: &str, after: &str) -> String {
    let rendered = diffy::create_patch(before, after).to_string();
    let hunks = rendered
        .splitn(3, '\n')
        .nth(2)
        .unwrap_or_default();
    format!("--- a/{MODULE_FILE}\n+++ b/{MODULE_FILE}\n{hunks}")
}

/// User patches in `dir`, sorted by file name.
pub fn list_patches(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files_with_suffix(dir, ".patch")?)
}

/// Checks that every per-file part of a patch parses.
pub fn validate_patch(name: &str, patch: &str) -> Result<()> {
    for part in split_file_patches(patch) {
        diffy::Patch::from_str(&part.text).map_err(|err| {
            RegistryError::InvalidPatch {
                patch: name.to_string(),
                message: err.to_string(),
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::module_file::ModuleFile;

    const MULTI: &str = "\
diff --git a/BUILD.bazel b/BUILD.bazel
index 1111111..2222222 100644
--- a/BUILD.bazel
+++ b/BUILD.bazel
@@ -1 +1 @@
-old
+new
diff --git a/MODULE.bazel b/MODULE.bazel
index 3333333..4444444 100644
--- a/MODULE.bazel\t2024-01-01 00:00:00
+++ b/MODULE.bazel\t2024-01-01 00:00:00
@@ -1,3 +1,3 @@
 module(
-    name = \"foo\",
+    name = \"bar\",
 )
";

    #[test]
    fn test_split_multi_file_patch() {
        let parts = split_file_patches(MULTI);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].target, "b/BUILD.bazel");
        assert_eq!(
            parts[0].text,
            "--- a/BUILD.bazel\n+++ b/BUILD.bazel\n@@ -1 +1 @@\n-old\n+new\n"
        );
        assert_eq!(parts[1].target, "b/MODULE.bazel");
        assert!(!parts[1].text.contains("index"));
    }

    #[test]
    fn test_module_file_patches() {
        let parts = module_file_patches(MULTI, 1);
        assert_eq!(parts.len(), 1);

        let mut module = ModuleFile::from_content(MODULE_FILE, "module(\n    name = \"foo\",\n)\n");
        module.patch_content("rename.patch", &parts[0].text).unwrap();
        assert_eq!(module.name().unwrap(), "bar");

        assert!(module_file_patches(MULTI, 0).is_empty());
    }

    #[test]
    fn test_nested_module_file_is_not_the_root_one() {
        let patch = FilePatch {
            target: "b/sub/MODULE.bazel".into(),
            text: String::new(),
        };
        assert!(!patch.targets_module_file(1));
        assert!(patch.targets_module_file(2));
    }

    #[test]
    fn test_create_module_patch_applies() {
        let before = "module(\n    name = \"foo\",\n    version = \"0.0.0\",\n)\n";
        let after = "module(\n    name = \"foo\",\n    version = \"4.5.6\",\n)\n";
        let patch = create_module_patch(before, after);

        assert!(patch.starts_with("--- a/MODULE.bazel\n+++ b/MODULE.bazel\n@@ "));
        assert!(patch.contains("-    version = \"0.0.0\",\n+    version = \"4.5.6\",\n"));

        let mut module = ModuleFile::from_content(MODULE_FILE, before);
        module.patch_content(VERSION_PATCH_NAME, &patch).unwrap();
        assert_eq!(module.content(), after);
        validate_patch(VERSION_PATCH_NAME, &patch).unwrap();
    }

    #[test]
    fn test_list_patches() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.patch"), "").unwrap();
        fs::write(dir.path().join("a.patch"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let names: Vec<String> = list_patches(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.patch", "b.patch"]);
        assert!(list_patches(&dir.path().join("missing")).unwrap().is_empty());
    }
}
