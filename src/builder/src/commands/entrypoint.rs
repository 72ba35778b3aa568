//! The ENTRYPOINT instruction: replace the entrypoint outright.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;

use super::cmd::shell_form;
use super::DockerCommand;

pub struct EntrypointCommand {
    argv: Vec<String>,
    prepend_shell: bool,
}

impl EntrypointCommand {
    pub fn new(argv: Vec<String>, prepend_shell: bool) -> Self {
        Self {
            argv,
            prepend_shell,
        }
    }
}

#[async_trait]
impl DockerCommand for EntrypointCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        config.entrypoint = shell_form(&self.argv, self.prepend_shell);
        tracing::info!(entrypoint = ?config.entrypoint, "replaced entrypoint");
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        format!("ENTRYPOINT {:?}", self.argv)
    }
}
