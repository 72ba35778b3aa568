//! The USER instruction.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;
use crate::resolve;

use super::DockerCommand;

pub struct UserCommand {
    user: String,
}

impl UserCommand {
    pub fn new(user: String) -> Self {
        Self { user }
    }
}

#[async_trait]
impl DockerCommand for UserCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        config.user = resolve::resolve_environment(&self.user, &config.env);
        tracing::info!(user = %config.user, "set user");
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        format!("USER {}", self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_user_set() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::at(tmp.path());
        let mut config = ImageConfig::default();

        let mut command = UserCommand::new("1000:1000".to_string());
        command.execute(&mut config, &ctx).await.unwrap();
        assert_eq!(config.user, "1000:1000");
    }

    #[tokio::test]
    async fn test_user_env_expansion() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::at(tmp.path());
        let mut config = ImageConfig::default();
        config.set_env("APP_USER", "svc");

        let mut command = UserCommand::new("$APP_USER".to_string());
        command.execute(&mut config, &ctx).await.unwrap();
        assert_eq!(config.user, "svc");
    }
}
