//! The under-construction image.
//!
//! A `MutableImage` accumulates the base image's layers, every layer
//! produced by the final stage, and one history record per instruction.
//! It is threaded explicitly through the driver — no module-level state —
//! so stages cannot leak image state into each other.

use sha2::{Digest, Sha256};

use kbuild_core::error::Result;

use super::config::ImageConfig;
use super::registry::PulledImage;

/// Media type for the uncompressed tar layers this builder produces.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";

/// One layer blob destined for the registry.
#[derive(Debug, Clone)]
pub struct LayerBlob {
    pub data: Vec<u8>,
    pub media_type: String,
    /// Digest of the uncompressed layer content, `sha256:` prefixed.
    pub diff_id: String,
}

#[derive(Debug, Clone)]
struct HistoryRecord {
    created_by: String,
    empty_layer: bool,
}

/// The image being assembled by the final stage.
#[derive(Debug)]
pub struct MutableImage {
    layers: Vec<LayerBlob>,
    history: Vec<HistoryRecord>,
    config: ImageConfig,
    architecture: String,
}

impl MutableImage {
    /// Start from a pulled base image: its layers ride along unchanged and
    /// new layers stack on top.
    pub fn from_base(base: &PulledImage) -> Self {
        let architecture = base
            .config
            .as_ref()
            .map(|c| c.architecture().to_string())
            .unwrap_or_else(|| host_architecture().to_string());
        Self {
            layers: base.layers.clone(),
            history: Vec::new(),
            config: ImageConfig::default(),
            architecture,
        }
    }

    /// Append a non-empty snapshot tar as a layer, with its history record.
    pub fn append_layer(&mut self, tar: Vec<u8>, created_by: String) -> Result<()> {
        let diff_id = format!("sha256:{}", hex::encode(Sha256::digest(&tar)));
        tracing::info!(%diff_id, size = tar.len(), "appending layer");
        self.layers.push(LayerBlob {
            data: tar,
            media_type: LAYER_MEDIA_TYPE.to_string(),
            diff_id,
        });
        self.history.push(HistoryRecord {
            created_by,
            empty_layer: false,
        });
        Ok(())
    }

    /// Record an instruction that produced no filesystem change.
    pub fn append_empty_history(&mut self, created_by: String) {
        tracing::info!(%created_by, "appending empty-layer history record");
        self.history.push(HistoryRecord {
            created_by,
            empty_layer: true,
        });
    }

    /// Commit the final stage's working configuration.
    pub fn set_config(&mut self, config: ImageConfig) {
        self.config = config;
    }

    pub fn layers(&self) -> &[LayerBlob] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Serialize the OCI image configuration blob.
    pub fn to_config_json(&self) -> Result<Vec<u8>> {
        let created = chrono::Utc::now().to_rfc3339();

        let mut config_section = serde_json::Map::new();
        if !self.config.env.is_empty() {
            config_section.insert("Env".to_string(), serde_json::json!(self.config.env));
        }
        if !self.config.entrypoint.is_empty() {
            config_section.insert(
                "Entrypoint".to_string(),
                serde_json::json!(self.config.entrypoint),
            );
        }
        if !self.config.cmd.is_empty() {
            config_section.insert("Cmd".to_string(), serde_json::json!(self.config.cmd));
        }
        if !self.config.workdir.is_empty() {
            config_section.insert(
                "WorkingDir".to_string(),
                serde_json::json!(self.config.workdir),
            );
        }
        if !self.config.user.is_empty() {
            config_section.insert("User".to_string(), serde_json::json!(self.config.user));
        }
        if !self.config.exposed_ports.is_empty() {
            let ports: serde_json::Map<String, serde_json::Value> = self
                .config
                .exposed_ports
                .iter()
                .map(|p| (p.clone(), serde_json::json!({})))
                .collect();
            config_section.insert("ExposedPorts".to_string(), serde_json::Value::Object(ports));
        }
        if !self.config.volumes.is_empty() {
            let volumes: serde_json::Map<String, serde_json::Value> = self
                .config
                .volumes
                .iter()
                .map(|v| (v.clone(), serde_json::json!({})))
                .collect();
            config_section.insert("Volumes".to_string(), serde_json::Value::Object(volumes));
        }
        if !self.config.labels.is_empty() {
            config_section.insert("Labels".to_string(), serde_json::json!(self.config.labels));
        }

        let config_obj = serde_json::json!({
            "architecture": self.architecture,
            "os": "linux",
            "created": created,
            "author": kbuild_core::constants::AUTHOR,
            "config": config_section,
            "rootfs": {
                "type": "layers",
                "diff_ids": self.layers.iter().map(|l| l.diff_id.clone()).collect::<Vec<_>>(),
            },
            "history": self.history.iter().map(|h| {
                let mut entry = serde_json::json!({
                    "created": created,
                    "created_by": h.created_by,
                });
                if h.empty_layer {
                    entry["empty_layer"] = serde_json::json!(true);
                }
                entry
            }).collect::<Vec<_>>(),
        });

        Ok(serde_json::to_vec_pretty(&config_obj)?)
    }
}

fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_image() -> MutableImage {
        MutableImage::from_base(&PulledImage::scratch())
    }

    #[test]
    fn test_append_layer_records_diff_id() {
        let mut image = scratch_image();
        image.append_layer(b"layer bytes".to_vec(), "foo /bar".to_string()).unwrap();
        assert_eq!(image.layer_count(), 1);
        assert!(image.layers()[0].diff_id.starts_with("sha256:"));
        assert_eq!(image.layers()[0].media_type, LAYER_MEDIA_TYPE);
    }

    #[test]
    fn test_history_counts_empty_and_real_layers() {
        let mut image = scratch_image();
        image.append_layer(b"data".to_vec(), "COPY a /a".to_string()).unwrap();
        image.append_empty_history("WORKDIR /w".to_string());
        image.append_empty_history("ENV A=1".to_string());
        assert_eq!(image.layer_count(), 1);
        assert_eq!(image.history_len(), 3);
    }

    #[test]
    fn test_config_json_shape() {
        let mut image = scratch_image();
        let mut config = ImageConfig::default();
        config.set_env("DIR", "/out/");
        config.workdir = "/app".to_string();
        config.exposed_ports.insert("8080/tcp".to_string());
        image.set_config(config);
        image.append_layer(b"x".to_vec(), "COPY foo /bar".to_string()).unwrap();
        image.append_empty_history("WORKDIR /app".to_string());

        let bytes = image.to_config_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed["os"], "linux");
        assert_eq!(parsed["config"]["Env"][0], "DIR=/out/");
        assert_eq!(parsed["config"]["WorkingDir"], "/app");
        assert!(parsed["config"]["ExposedPorts"]["8080/tcp"].is_object());
        assert_eq!(parsed["rootfs"]["diff_ids"].as_array().unwrap().len(), 1);

        let history = parsed["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["created_by"], "COPY foo /bar");
        assert!(history[0].get("empty_layer").is_none());
        assert_eq!(history[1]["empty_layer"], true);
    }
}
