//! The build context: the tree of files COPY and ADD may read from.
//!
//! Both variants are directory-backed — remote tarballs are unpacked to
//! disk up front — so the distinction only records provenance.

mod bucket;

use std::fs;
use std::path::{Path, PathBuf};

use kbuild_core::constants;
use kbuild_core::error::{BuildError, Result};

use crate::fsutil::join_rooted;

/// A build context rooted at a local directory or an unpacked tarball.
#[derive(Debug, Clone)]
pub enum BuildContext {
    LocalDirectory { root: PathBuf },
    UnpackedTar { root: PathBuf },
}

impl BuildContext {
    /// Resolve the `--context` argument: an existing local directory is used
    /// directly; anything else is treated as a remote bucket whose
    /// `kbuild.tar` object is fetched and unpacked.
    pub async fn resolve(source: &str, root: &Path) -> Result<Self> {
        if Path::new(source).is_dir() {
            tracing::info!(path = source, "using local directory context");
            return Ok(BuildContext::LocalDirectory {
                root: PathBuf::from(source),
            });
        }
        tracing::info!(bucket = source, "using remote bucket as context");
        let unpack_dir = join_rooted(root, constants::BUILD_CONTEXT_DIR);
        bucket::fetch_and_unpack(source, &unpack_dir).await?;
        Ok(BuildContext::UnpackedTar { root: unpack_dir })
    }

    /// A context over an existing directory, as used for `COPY --from`
    /// reads out of the stage artifact store.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        BuildContext::LocalDirectory { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        match self {
            BuildContext::LocalDirectory { root } | BuildContext::UnpackedTar { root } => root,
        }
    }

    /// Root a context-relative (or leading-slash) source under this context.
    pub fn join(&self, rel: &str) -> PathBuf {
        join_rooted(self.root(), rel)
    }

    /// All paths under `prefix`, relative to the context root, in
    /// lexicographic order. The prefix entry itself is included (as `.` for
    /// the root). A prefix that does not exist lists as empty.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = self.join(prefix);
        if !crate::fsutil::filepath_exists(&start) {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&start).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BuildError::Context(format!("walking context {}: {}", start.display(), e))
            })?;
            let rel = entry
                .path()
                .strip_prefix(self.root())
                .map_err(|e| BuildError::Context(format!("relativizing context path: {}", e)))?;
            if rel.as_os_str().is_empty() {
                files.push(".".to_string());
            } else {
                files.push(rel.to_string_lossy().into_owned());
            }
        }
        Ok(files)
    }

    pub fn stat(&self, rel: &str) -> Result<fs::Metadata> {
        let path = self.join(rel);
        fs::symlink_metadata(&path)
            .map_err(|e| BuildError::Context(format!("stat {}: {}", path.display(), e)))
    }

    pub fn contents(&self, rel: &str) -> Result<Vec<u8>> {
        let path = self.join(rel);
        fs::read(&path).map_err(|e| BuildError::Context(format!("reading {}: {}", path.display(), e)))
    }

    pub fn exists(&self, rel: &str) -> bool {
        crate::fsutil::filepath_exists(&self.join(rel))
    }
}
