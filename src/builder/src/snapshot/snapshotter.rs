//! Filesystem change detection between instructions.
//!
//! The snapshotter walks the build root, diffs every path against the
//! layered map, and emits a tar layer containing only what changed. Handlers
//! that know exactly which files they touched can request a targeted
//! snapshot instead, which skips the walk entirely.

use std::path::PathBuf;
use std::sync::Arc;

use kbuild_core::error::{BuildError, Result};

use crate::allowlist::Allowlist;

use super::layered_map::LayeredMap;
use super::tar_writer::LayerWriter;

pub struct Snapshotter {
    layered_map: LayeredMap,
    root: PathBuf,
    allowlist: Arc<Allowlist>,
}

impl Snapshotter {
    pub fn new(root: impl Into<PathBuf>, layered_map: LayeredMap, allowlist: Arc<Allowlist>) -> Self {
        Self {
            layered_map,
            root: root.into(),
            allowlist,
        }
    }

    /// Record the state of the entire tree without emitting any tar output.
    /// The base image filesystem is not a layer produced by this builder.
    pub fn init(&mut self) -> Result<()> {
        self.layered_map.snapshot();
        for path in self.walk()? {
            if self.allowlist.should_ignore(&path, &self.root) {
                continue;
            }
            self.layered_map.maybe_add(&path)?;
        }
        Ok(())
    }

    /// Walk the root and emit a tar of every added or modified path.
    ///
    /// Returns the tar bytes and whether anything was emitted; on `false`
    /// the caller records an empty history entry instead of an empty layer.
    pub fn take_full_snapshot(&mut self) -> Result<(Vec<u8>, bool)> {
        self.layered_map.snapshot();
        let mut writer = LayerWriter::new();
        for path in self.walk()? {
            if self.allowlist.should_ignore(&path, &self.root) {
                continue;
            }
            if self.layered_map.maybe_add(&path)? {
                writer.append(&path)?;
            }
        }
        let changed = writer.entries() > 0;
        Ok((writer.into_bytes()?, changed))
    }

    /// Emit a tar containing exactly `files` (allowlist-filtered).
    ///
    /// The layered map is deliberately not updated: COPY/ADD know their
    /// outputs precisely, but the next full snapshot must still observe the
    /// mutation. Returns `None` when the input list is empty.
    pub fn take_targeted_snapshot(&mut self, files: &[PathBuf]) -> Result<Option<Vec<u8>>> {
        if files.is_empty() {
            tracing::info!("no files changed in this command, skipping snapshot");
            return Ok(None);
        }
        tracing::info!(?files, "taking snapshot of files");
        let mut writer = LayerWriter::new();
        for file in files {
            if self.allowlist.should_ignore(file, &self.root) {
                continue;
            }
            writer.append(file)?;
        }
        Ok(Some(writer.into_bytes()?))
    }

    /// Deterministic lexicographic walk of the root, root itself excluded.
    fn walk(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                BuildError::Snapshot(format!("walking {}: {}", self.root.display(), e))
            })?;
            paths.push(entry.path().to_path_buf());
        }
        Ok(paths)
    }
}
