//! The EXPOSE instruction: merge ports into the config's exposed set.

use std::path::PathBuf;

use async_trait::async_trait;

use kbuild_core::error::{BuildError, Result};

use crate::context::BuildContext;
use crate::image::ImageConfig;
use crate::resolve;

use super::DockerCommand;

pub struct ExposeCommand {
    ports: Vec<String>,
}

impl ExposeCommand {
    pub fn new(ports: Vec<String>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl DockerCommand for ExposeCommand {
    async fn execute(&mut self, config: &mut ImageConfig, _ctx: &BuildContext) -> Result<()> {
        for port in &self.ports {
            let port = resolve::resolve_environment(port, &config.env);
            // The protocol defaults to tcp.
            let entry = match port.split_once('/') {
                None => format!("{}/tcp", port),
                Some((_, "tcp" | "udp")) => port.clone(),
                Some((_, proto)) => {
                    return Err(BuildError::Resolve(format!(
                        "invalid protocol '{}' in EXPOSE (expected tcp or udp)",
                        proto
                    )))
                }
            };
            tracing::info!(port = %entry, "exposing port");
            config.exposed_ports.insert(entry);
        }
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(Vec::new())
    }

    fn created_by(&self) -> String {
        format!("EXPOSE {}", self.ports.join(" "))
    }
}
