//! Cross-stage artifact persistence and the between-stage root wipe.
//!
//! Before a non-final stage's filesystem is deleted, every file a later
//! stage will `COPY --from` out of it is saved under the builder's artifact
//! root, keyed by stage index with a symlink for the stage name.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use kbuild_core::constants;
use kbuild_core::error::{BuildError, Result};

use crate::allowlist::Allowlist;
use crate::dockerfile::{self, Instruction, Stage};
use crate::fsutil;
use crate::resolve;

/// The files later stages reference from this stage: the union of every
/// `COPY --from=<index|name>` source across subsequent stages, resolved
/// against the live root filesystem.
pub fn multi_stage_dependencies(
    stage: &Stage,
    stages: &[Stage],
    root: &Path,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for later in stages.iter().skip(stage.index + 1) {
        for instruction in &later.instructions {
            let Instruction::Copy {
                sources,
                from: Some(from),
                ..
            } = instruction
            else {
                continue;
            };
            if dockerfile::stage_index(stages, from) != Some(stage.index) {
                continue;
            }
            if resolve::contains_wildcards(sources) {
                tracing::warn!(?sources, "wildcard sources are not tracked across stages");
                continue;
            }
            for src in sources {
                let src_root = fsutil::join_rooted(root, src);
                if !fsutil::filepath_exists(&src_root) {
                    continue;
                }
                for path in fsutil::files_under(&src_root)? {
                    if path.is_dir() {
                        continue;
                    }
                    tracing::info!(path = %path.display(), "saving stage artifact");
                    files.push(path);
                }
            }
        }
    }
    Ok(files)
}

/// Save this stage's cross-stage artifacts (preserving modes) under
/// `/kbuild/<index>/…`, symlinking `/kbuild/<name>` to the index directory
/// when the stage is named.
pub fn persist_stage_artifacts(
    stage: &Stage,
    stages: &[Stage],
    root: &Path,
    allowlist: &Allowlist,
) -> Result<()> {
    let files = multi_stage_dependencies(stage, stages, root)?;
    let store_root = fsutil::join_rooted(root, constants::KBUILD_DIR);
    let index_dir = store_root.join(stage.index.to_string());
    fs::create_dir_all(&index_dir)
        .map_err(|e| BuildError::Copy(format!("creating {}: {}", index_dir.display(), e)))?;

    for file in files {
        if allowlist.should_ignore(&file, root) {
            continue;
        }
        let meta = fs::metadata(&file)
            .map_err(|e| BuildError::Copy(format!("stat {}: {}", file.display(), e)))?;
        let contents = fs::read(&file)
            .map_err(|e| BuildError::Copy(format!("reading {}: {}", file.display(), e)))?;
        let rel = file
            .strip_prefix(root)
            .map_err(|e| BuildError::Copy(format!("relativizing {}: {}", file.display(), e)))?;
        fsutil::create_file(
            &index_dir.join(rel),
            &contents,
            meta.permissions().mode() & 0o7777,
        )?;
    }

    if let Some(name) = &stage.name {
        let link = store_root.join(name);
        if !fsutil::filepath_exists(&link) {
            tracing::debug!(from = %link.display(), to = %index_dir.display(), "symlinking stage name");
            std::os::unix::fs::symlink(&index_dir, &link)
                .map_err(|e| BuildError::Copy(format!("symlinking {}: {}", link.display(), e)))?;
        }
    }
    Ok(())
}

/// Wipe the root filesystem between stages, leaving allowlisted paths plus
/// the credential and CA-certificate paths in place.
///
/// Removal failures for individual entries are logged and skipped: a parent
/// removed earlier in the walk already took its children with it.
pub fn delete_filesystem(root: &Path, allowlist: &Allowlist) -> Result<()> {
    tracing::info!(root = %root.display(), "deleting filesystem");
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        match entry {
            Ok(entry) => paths.push(entry.into_path()),
            Err(e) => tracing::debug!(error = %e, "skipping unreadable path during wipe"),
        }
    }
    for path in paths {
        if allowlist.should_ignore_for_deletion(&path, root) {
            continue;
        }
        if !fsutil::filepath_exists(&path) {
            continue;
        }
        let result = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            tracing::debug!(path = %path.display(), error = %e, "couldn't remove path");
        }
    }
    Ok(())
}
