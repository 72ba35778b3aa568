//! The CMD instruction: replace the default command outright.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::constants;
use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;

use super::DockerCommand;

pub struct CmdCommand {
    argv: Vec<String>,
    prepend_shell: bool,
}

impl CmdCommand {
    pub fn new(argv: Vec<String>, prepend_shell: bool) -> Self {
        Self {
            argv,
            prepend_shell,
        }
    }
}

/// Shell form becomes `/bin/sh -c` with the joined line as one argument.
pub(crate) fn shell_form(argv: &[String], prepend_shell: bool) -> Vec<String> {
    if prepend_shell {
        vec![
            constants::SHELL.to_string(),
            "-c".to_string(),
            argv.join(" "),
        ]
    } else {
        argv.to_vec()
    }
}

#[async_trait]
impl DockerCommand for CmdCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        config.cmd = shell_form(&self.argv, self.prepend_shell);
        tracing::info!(cmd = ?config.cmd, "replaced default command");
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        format!("CMD {:?}", self.argv)
    }
}
