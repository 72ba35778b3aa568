//! Per-path fingerprint store backing the snapshotter.
//!
//! Fingerprints are stacked in frames, one frame per snapshot. A path only
//! re-enters a layer when its fingerprint differs from the topmost frame
//! that recorded it.

use std::collections::HashMap;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use kbuild_core::error::{BuildError, Result};
use sha2::{Digest, Sha256};

/// Fingerprinting function, injectable so tests can substitute a cheap one.
pub type Hasher = fn(&Path) -> Result<String>;

/// Ordered stack of `path → fingerprint` frames.
pub struct LayeredMap {
    layers: Vec<HashMap<String, String>>,
    hasher: Hasher,
}

impl LayeredMap {
    pub fn new(hasher: Hasher) -> Self {
        Self {
            layers: Vec::new(),
            hasher,
        }
    }

    /// Push a new empty frame. Subsequent `maybe_add` calls record into it.
    pub fn snapshot(&mut self) {
        self.layers.push(HashMap::new());
    }

    /// Look a path up across all frames, newest first.
    pub fn get(&self, path: &Path) -> Option<&str> {
        let key = path.to_string_lossy();
        self.layers
            .iter()
            .rev()
            .find_map(|frame| frame.get(key.as_ref()))
            .map(String::as_str)
    }

    /// Fingerprint `path` and record it in the current frame if it is new
    /// or changed. Returns whether it was recorded.
    pub fn maybe_add(&mut self, path: &Path) -> Result<bool> {
        let fingerprint = (self.hasher)(path)?;
        if self.get(path) == Some(fingerprint.as_str()) {
            return Ok(false);
        }
        let frame = self
            .layers
            .last_mut()
            .ok_or_else(|| BuildError::Snapshot("no snapshot frame pushed".to_string()))?;
        frame.insert(path.to_string_lossy().into_owned(), fingerprint);
        Ok(true)
    }
}

/// Default fingerprint policy.
///
/// Regular files hash `mode || size || content`; symlinks hash their target;
/// directories hash their mode only. mtime is deliberately excluded: ADD
/// from a URL stamps upstream timestamps onto files whose content identity
/// has not changed, and including mtime would re-layer them spuriously.
pub fn fingerprint(path: &Path) -> Result<String> {
    let meta = std::fs::symlink_metadata(path)
        .map_err(|e| BuildError::Snapshot(format!("stat {}: {}", path.display(), e)))?;
    let file_type = meta.file_type();
    let mode = meta.permissions().mode();

    if file_type.is_symlink() {
        let target = std::fs::read_link(path)
            .map_err(|e| BuildError::Snapshot(format!("readlink {}: {}", path.display(), e)))?;
        return Ok(format!("L{}", target.display()));
    }
    if file_type.is_dir() {
        return Ok(format!("D{:o}", mode));
    }
    if !file_type.is_file() {
        // Sockets, fifos, devices: identity is the mode.
        return Ok(format!("S{:o}", mode));
    }

    let mut hasher = Sha256::new();
    hasher.update(mode.to_le_bytes());
    hasher.update(meta.len().to_le_bytes());
    let mut file = std::fs::File::open(path)
        .map_err(|e| BuildError::Snapshot(format!("open {}: {}", path.display(), e)))?;
    io::copy(&mut file, &mut hasher)
        .map_err(|e| BuildError::Snapshot(format!("hashing {}: {}", path.display(), e)))?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_maybe_add_new_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "hello").unwrap();

        let mut map = LayeredMap::new(fingerprint);
        map.snapshot();
        assert!(map.maybe_add(&file).unwrap());
    }

    #[test]
    fn test_maybe_add_unchanged_across_frames() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "hello").unwrap();

        let mut map = LayeredMap::new(fingerprint);
        map.snapshot();
        assert!(map.maybe_add(&file).unwrap());
        map.snapshot();
        // Recorded in frame k, unchanged: must not re-enter in frame k+1.
        assert!(!map.maybe_add(&file).unwrap());
    }

    #[test]
    fn test_maybe_add_changed_content() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "hello").unwrap();

        let mut map = LayeredMap::new(fingerprint);
        map.snapshot();
        map.maybe_add(&file).unwrap();

        fs::write(&file, "changed").unwrap();
        map.snapshot();
        assert!(map.maybe_add(&file).unwrap());
    }

    #[test]
    fn test_maybe_add_changed_mode() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "hello").unwrap();

        let mut map = LayeredMap::new(fingerprint);
        map.snapshot();
        map.maybe_add(&file).unwrap();

        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
        map.snapshot();
        assert!(map.maybe_add(&file).unwrap());
    }

    #[test]
    fn test_mtime_does_not_change_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "hello").unwrap();

        let before = fingerprint(&file).unwrap();
        filetime::set_file_mtime(&file, filetime::FileTime::from_unix_time(1, 0)).unwrap();
        let after = fingerprint(&file).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_symlink_fingerprint_is_target() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("target"), "x").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink("target", &link).unwrap();

        let fp = fingerprint(&link).unwrap();
        assert_eq!(fp, "Ltarget");
    }

    #[test]
    fn test_get_searches_top_down() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "v1").unwrap();

        let mut map = LayeredMap::new(fingerprint);
        map.snapshot();
        map.maybe_add(&file).unwrap();
        let first = map.get(&file).unwrap().to_string();

        fs::write(&file, "v2-longer").unwrap();
        map.snapshot();
        map.maybe_add(&file).unwrap();
        assert_ne!(map.get(&file).unwrap(), first);
    }

    #[test]
    fn test_maybe_add_without_frame_errors() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a");
        fs::write(&file, "x").unwrap();

        let mut map = LayeredMap::new(fingerprint);
        assert!(map.maybe_add(&file).is_err());
    }
}
