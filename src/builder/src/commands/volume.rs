//! The VOLUME instruction.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;

use super::DockerCommand;

pub struct VolumeCommand {
    paths: Vec<String>,
}

impl VolumeCommand {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl DockerCommand for VolumeCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        for path in &self.paths {
            tracing::info!(%path, "declaring volume");
            config.volumes.insert(path.clone());
        }
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        format!("VOLUME {}", self.paths.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_volume_merges_into_set() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::at(tmp.path());
        let mut config = ImageConfig::default();

        let mut command = VolumeCommand::new(vec!["/data".to_string(), "/logs".to_string()]);
        command.execute(&mut config, &ctx).await.unwrap();
        assert!(config.volumes.contains("/data"));
        assert!(config.volumes.contains("/logs"));
    }
}
