use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

/// Removes the specified file or directory safely.
///
/// If the path does not exist, this function returns `Ok(())` without error. Directories are
/// removed recursively.
///
/// # Errors
///
/// Returns a [`FileSystemError::File`] if the removal fails for any reason other than the path
/// not existing.
///
/// # Example
///
/// ```no_run
/// use regpub_utils::error::FileSystemResult;
/// use regpub_utils::fs::safe_remove;
///
/// fn main() -> FileSystemResult<()> {
///     safe_remove("/tmp/artifact-1234")?;
///     Ok(())
/// }
/// ```
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(());
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source: err,
        }
    })
}

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Creates a fresh directory under the system temp dir named `{prefix}-{uuid}`.
///
/// Each call yields a distinct path, so concurrent users never collide.
pub fn create_unique_temp_dir(prefix: &str) -> FileSystemResult<PathBuf> {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4().simple()));
    fs::create_dir_all(&dir).map_err(|err| {
        FileSystemError::Directory {
            path: dir.clone(),
            action: "create",
            source: err,
        }
    })?;
    Ok(dir)
}

/// Copies `from` to `to`, creating the parent directories of `to` first.
pub fn copy_file<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> FileSystemResult<u64> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if let Some(parent) = to.parent() {
        ensure_dir_exists(parent)?;
    }
    fs::copy(from, to).map_err(|err| {
        FileSystemError::File {
            path: from.to_path_buf(),
            action: "copy",
            source: err,
        }
    })
}

/// Lists regular files directly inside `dir` whose name ends with `suffix`, sorted by name.
///
/// A missing directory yields an empty list.
pub fn list_files_with_suffix<P: AsRef<Path>>(
    dir: P,
    suffix: &str,
) -> FileSystemResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|err| {
        FileSystemError::Directory {
            path: dir.to_path_buf(),
            action: "read",
            source: err,
        }
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_safe_remove_file_and_dir() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        File::create(&file).unwrap();
        safe_remove(&file).unwrap();
        assert!(!file.exists());

        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        File::create(nested.join("c")).unwrap();
        safe_remove(dir.path().join("a")).unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[test]
    fn test_safe_remove_missing_is_ok() {
        let dir = tempdir().unwrap();
        assert!(safe_remove(dir.path().join("nope")).is_ok());
    }

    #[test]
    fn test_ensure_dir_exists_not_a_dir() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        File::create(&file).unwrap();
        let result = ensure_dir_exists(&file);
        assert!(matches!(result, Err(FileSystemError::NotADirectory { .. })));

        let nested = dir.path().join("x/y/z");
        ensure_dir_exists(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_create_unique_temp_dir() {
        let first = create_unique_temp_dir("regpub-test").unwrap();
        let second = create_unique_temp_dir("regpub-test").unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("regpub-test-"));
        safe_remove(&first).unwrap();
        safe_remove(&second).unwrap();
    }

    #[test]
    fn test_copy_file_creates_parents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "data").unwrap();
        let dest = dir.path().join("deep/er/dest.txt");
        copy_file(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "data");
    }

    #[test]
    fn test_list_files_with_suffix() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.patch"), "").unwrap();
        fs::write(dir.path().join("a.patch"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("dir.patch")).unwrap();

        let files = list_files_with_suffix(dir.path(), ".patch").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.patch", "b.patch"]);

        assert!(list_files_with_suffix(dir.path().join("missing"), ".patch")
            .unwrap()
            .is_empty());
    }
}
