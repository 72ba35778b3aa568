//! The WORKDIR instruction.
//!
//! Sets the config working directory, absolutizing relative paths against
//! the current one, and creates the directory on disk the way Docker does.
//! The directory creation is not a layer contribution: the snapshot list
//! stays empty.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use kbuild_core::error::{BuildError, Result};

use crate::context::BuildContext;
use crate::fsutil;
use crate::image::ImageConfig;
use crate::resolve;

use super::DockerCommand;

pub struct WorkdirCommand {
    path: String,
    root: PathBuf,
}

impl WorkdirCommand {
    pub fn new(path: String, root: &Path) -> Self {
        Self {
            path,
            root: root.to_path_buf(),
        }
    }
}

#[async_trait]
impl DockerCommand for WorkdirCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        let resolved = resolve::resolve_environment(&self.path, &config.env);
        config.workdir = if resolved.starts_with('/') {
            resolve::clean_path(&resolved)
        } else {
            resolve::go_join(&[config.working_dir(), &resolved])
        };
        tracing::info!(workdir = %config.workdir, "changed working directory");

        let on_disk = fsutil::join_rooted(&self.root, &config.workdir);
        std::fs::create_dir_all(&on_disk)
            .map_err(|e| BuildError::Copy(format!("creating {}: {}", on_disk.display(), e)))?;
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        format!("WORKDIR {}", self.path)
    }
}
