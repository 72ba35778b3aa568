//! The ENV instruction: merge key/value pairs into the config env.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;
use crate::resolve;

use super::DockerCommand;

pub struct EnvCommand {
    pairs: Vec<(String, String)>,
}

impl EnvCommand {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

#[async_trait]
impl DockerCommand for EnvCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        for (key, value) in &self.pairs {
            let value = resolve::resolve_environment(value, &config.env);
            tracing::info!(%key, %value, "setting environment variable");
            config.set_env(key, &value);
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
        format!("ENV {}", pairs.join(" "))
    }
}
