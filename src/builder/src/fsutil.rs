//! Small filesystem helpers shared by the instruction handlers and the
//! executor: rooted path joining, mode-preserving file creation, and
//! recursive file listing.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kbuild_core::error::{BuildError, Result};

/// Join an image-absolute path under a build root.
///
/// `Path::join` replaces the base when the argument is absolute, which is
/// never what the builder wants: `/bar` under root `/tmp/x` must become
/// `/tmp/x/bar` (Go `filepath.Join` semantics).
pub fn join_rooted(root: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("/") {
        Ok(rel) => root.join(rel),
        Err(_) => root.join(path),
    }
}

/// Create a file at `path` with the given contents and mode, creating any
/// missing parent directories.
pub fn create_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            tracing::debug!(dir = %parent.display(), "creating parent directory");
            fs::create_dir_all(parent)
                .map_err(|e| BuildError::Copy(format!("creating {}: {}", parent.display(), e)))?;
        }
    }
    fs::write(path, contents)
        .map_err(|e| BuildError::Copy(format!("writing {}: {}", path.display(), e)))?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| BuildError::Copy(format!("setting mode on {}: {}", path.display(), e)))?;
    Ok(())
}

/// Create a directory (and parents) at `path` with the given mode.
pub fn create_dir(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| BuildError::Copy(format!("creating {}: {}", path.display(), e)))?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| BuildError::Copy(format!("setting mode on {}: {}", path.display(), e)))?;
    Ok(())
}

/// All paths under `root` in lexicographic order, the root itself included.
pub fn files_under(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry =
            entry.map_err(|e| BuildError::Copy(format!("walking {}: {}", root.display(), e)))?;
        files.push(entry.path().to_path_buf());
    }
    Ok(files)
}

/// True if the path exists (without following a trailing symlink).
pub fn filepath_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_join_rooted_absolute() {
        assert_eq!(
            join_rooted(Path::new("/tmp/root"), "/bar"),
            PathBuf::from("/tmp/root/bar")
        );
    }

    #[test]
    fn test_join_rooted_relative() {
        assert_eq!(
            join_rooted(Path::new("/tmp/root"), "bar/baz"),
            PathBuf::from("/tmp/root/bar/baz")
        );
    }

    #[test]
    fn test_join_rooted_real_root() {
        assert_eq!(join_rooted(Path::new("/"), "/bar"), PathBuf::from("/bar"));
    }

    #[test]
    fn test_create_file_makes_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a/b/c.txt");
        create_file(&target, b"hello", 0o644).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn test_create_file_preserves_mode() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("script.sh");
        create_file(&target, b"#!/bin/sh", 0o755).unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_files_under_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        fs::write(tmp.path().join("a/x.txt"), "x").unwrap();

        let files = files_under(tmp.path()).unwrap();
        assert_eq!(files[0], tmp.path());
        assert_eq!(files[1], tmp.path().join("a"));
        assert_eq!(files[2], tmp.path().join("a/x.txt"));
        assert_eq!(files[3], tmp.path().join("b.txt"));
    }
}
