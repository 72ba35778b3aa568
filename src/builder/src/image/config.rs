//! Mutable per-stage image configuration.
//!
//! Instruction handlers mutate this between snapshots; the final stage
//! commits it into the assembled image.

use std::collections::{BTreeMap, BTreeSet};

use oci_spec::image::ImageConfiguration;

/// The working image configuration for one stage.
///
/// `env` keeps insertion order, with later writes replacing earlier
/// same-key entries in place. `workdir` is absolute after the first
/// WORKDIR.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageConfig {
    pub env: Vec<String>,
    pub workdir: String,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub user: String,
    pub exposed_ports: BTreeSet<String>,
    pub labels: BTreeMap<String, String>,
    pub volumes: BTreeSet<String>,
}

impl ImageConfig {
    /// Seed a stage config from a pulled base image configuration.
    pub fn from_base(base: &ImageConfiguration) -> Self {
        let mut config = Self::default();
        if let Some(base_config) = base.config() {
            if let Some(env) = base_config.env() {
                config.env = env.clone();
            }
            if let Some(entrypoint) = base_config.entrypoint() {
                config.entrypoint = entrypoint.clone();
            }
            if let Some(cmd) = base_config.cmd() {
                config.cmd = cmd.clone();
            }
            if let Some(user) = base_config.user() {
                config.user = user.clone();
            }
            if let Some(workdir) = base_config.working_dir() {
                config.workdir = workdir.clone();
            }
            if let Some(ports) = base_config.exposed_ports() {
                config.exposed_ports = ports.iter().cloned().collect();
            }
            if let Some(labels) = base_config.labels() {
                config.labels = labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            }
            if let Some(volumes) = base_config.volumes() {
                config.volumes = volumes.iter().cloned().collect();
            }
        }
        config
    }

    /// Set an environment variable, replacing an existing entry for the
    /// same key in place.
    pub fn set_env(&mut self, key: &str, value: &str) {
        let pair = format!("{}={}", key, value);
        let existing = self
            .env
            .iter_mut()
            .find(|entry| entry.split_once('=').map(|(k, _)| k) == Some(key));
        match existing {
            Some(entry) => *entry = pair,
            None => self.env.push(pair),
        }
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// The current working directory, defaulting to `/`.
    pub fn working_dir(&self) -> &str {
        if self.workdir.is_empty() {
            "/"
        } else {
            &self.workdir
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_env_appends_in_order() {
        let mut config = ImageConfig::default();
        config.set_env("A", "1");
        config.set_env("B", "2");
        assert_eq!(config.env, vec!["A=1", "B=2"]);
    }

    #[test]
    fn test_set_env_replaces_in_place() {
        let mut config = ImageConfig::default();
        config.set_env("A", "1");
        config.set_env("B", "2");
        config.set_env("A", "updated");
        assert_eq!(config.env, vec!["A=updated", "B=2"]);
    }

    #[test]
    fn test_get_env() {
        let mut config = ImageConfig::default();
        config.set_env("PATH", "/usr/bin");
        assert_eq!(config.get_env("PATH"), Some("/usr/bin"));
        assert_eq!(config.get_env("MISSING"), None);
    }

    #[test]
    fn test_working_dir_defaults_to_root() {
        let config = ImageConfig::default();
        assert_eq!(config.working_dir(), "/");
    }

    #[test]
    fn test_from_base_seeds_fields() {
        let raw = serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "config": {
                "Env": ["PATH=/bin"],
                "WorkingDir": "/app",
                "Entrypoint": ["/entry"],
                "Cmd": ["serve"],
                "User": "nobody",
                "Labels": {"a": "b"}
            },
            "rootfs": {"type": "layers", "diff_ids": []},
            "history": []
        });
        let base: ImageConfiguration = serde_json::from_value(raw).unwrap();
        let config = ImageConfig::from_base(&base);
        assert_eq!(config.env, vec!["PATH=/bin"]);
        assert_eq!(config.workdir, "/app");
        assert_eq!(config.entrypoint, vec!["/entry"]);
        assert_eq!(config.cmd, vec!["serve"]);
        assert_eq!(config.user, "nobody");
        assert_eq!(config.labels.get("a").map(String::as_str), Some("b"));
    }
}
