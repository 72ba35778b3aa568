//! The LABEL instruction.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;

use super::DockerCommand;

pub struct LabelCommand {
    pairs: Vec<(String, String)>,
}

impl LabelCommand {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

#[async_trait]
impl DockerCommand for LabelCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        for (key, value) in &self.pairs {
            tracing::info!(%key, %value, "setting label");
            config.labels.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        let pairs: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("LABEL {}", pairs.join(" "))
    }
}
