//! The RUN instruction: execute a command against the build root.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;

use kbuild_core::constants;
use kbuild_core::error::{BuildError, Result};

use crate::context::BuildContext;
use crate::fsutil;
use crate::image::ImageConfig;

use super::DockerCommand;

pub struct RunCommand {
    cmdline: Vec<String>,
    prepend_shell: bool,
    root: PathBuf,
}

impl RunCommand {
    pub fn new(cmdline: Vec<String>, prepend_shell: bool, root: &Path) -> Self {
        Self {
            cmdline,
            prepend_shell,
            root: root.to_path_buf(),
        }
    }

    fn argv(&self) -> Vec<String> {
        if self.prepend_shell {
            vec![
                constants::SHELL.to_string(),
                "-c".to_string(),
                self.cmdline.join(" "),
            ]
        } else {
            self.cmdline.clone()
        }
    }
}

#[async_trait]
impl DockerCommand for RunCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        let argv = self.argv();
        tracing::info!(cmd = %argv[0], args = ?&argv[1..], "running command");

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        // The child inherits the builder's environment; the image config
        // env is layered on top.
        for pair in &config.env {
            if let Some((key, value)) = pair.split_once('=') {
                command.env(key, value);
            }
        }
        let workdir = fsutil::join_rooted(&self.root, config.working_dir());
        if workdir.is_dir() {
            command.current_dir(workdir);
        }

        let output = command
            .output()
            .map_err(|e| BuildError::Run(format!("spawning {}: {}", argv[0], e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::Run(format!(
                "{} exited with {}: {}",
                argv.join(" "),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.is_empty() {
            tracing::info!(output = %stdout.trim_end(), "command output");
        }
        Ok(())
    }

    /// RUN may touch arbitrary paths: trigger a full snapshot.
    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        None
    }

    fn created_by(&self) -> String {
        if self.prepend_shell {
            format!("{} -c {}", constants::SHELL, self.cmdline.join(" "))
        } else {
            self.cmdline.join(" ")
        }
    }
}
