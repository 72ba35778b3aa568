//! Paths the snapshotter must never capture.
//!
//! The builder mutates its own root filesystem, so kernel mounts and the
//! builder's own working directories have to be fenced off from both the
//! snapshot walk and the between-stage wipe. The list is built once per
//! stage from the kernel mount table and read-only afterwards.

use std::path::{Path, PathBuf};

use kbuild_core::constants;
use kbuild_core::error::{BuildError, Result};

use crate::fsutil::join_rooted;

/// Ordered list of absolute path prefixes excluded from snapshots.
#[derive(Debug, Clone)]
pub struct Allowlist {
    entries: Vec<PathBuf>,
}

impl Allowlist {
    /// Build an allowlist from the kernel mount table at `mountinfo_path`,
    /// merged with the fixed builder paths.
    ///
    /// Each mountinfo line looks like
    /// `36 35 98:0 /mnt1 /mnt2 rw,noatime master:1 - ext3 /dev/root rw` —
    /// the fifth space-separated field is the mount point relative to the
    /// process root. The root mount itself is skipped.
    pub fn initialize(mountinfo_path: &Path) -> Result<Self> {
        let mut list = Self::fixed();
        let contents = std::fs::read_to_string(mountinfo_path).map_err(|e| {
            BuildError::Snapshot(format!(
                "reading mount table {}: {}",
                mountinfo_path.display(),
                e
            ))
        })?;
        for line in contents.lines() {
            let fields: Vec<&str> = line.split(' ').collect();
            if fields.len() < 5 {
                continue;
            }
            let mount_point = fields[4];
            if mount_point == constants::ROOT_DIR {
                continue;
            }
            tracing::debug!(mount_point, "allowlisting mount point");
            list.entries.push(PathBuf::from(mount_point));
        }
        tracing::info!(entries = ?list.entries, "allowlisted directories");
        Ok(list)
    }

    /// An allowlist containing only the fixed builder paths. Tests and
    /// tempdir-rooted builds use this directly.
    pub fn fixed() -> Self {
        Self {
            entries: vec![PathBuf::from(constants::KBUILD_DIR)],
        }
    }

    /// True if `path` (a real filesystem path under `root`) must not be
    /// captured in a snapshot.
    pub fn should_ignore(&self, path: &Path, root: &Path) -> bool {
        self.entries
            .iter()
            .any(|e| path.starts_with(join_rooted(root, e)))
    }

    /// True if `path` must survive the between-stage wipe.
    ///
    /// Extends the snapshot set with the registry credential file and the
    /// CA bundle, and also protects ancestors of those paths so the wipe
    /// never removes a directory that contains one.
    pub fn should_ignore_for_deletion(&self, path: &Path, root: &Path) -> bool {
        if self.should_ignore(path, root) {
            return true;
        }
        [constants::DOCKER_CONFIG_PATH, constants::CA_CERTS_DIR]
            .iter()
            .any(|p| {
                let protected = join_rooted(root, p);
                path.starts_with(&protected) || protected.starts_with(path)
            })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }
}
