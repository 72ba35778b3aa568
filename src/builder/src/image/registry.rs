//! Registry client: pulls base images and pushes the assembled image.
//!
//! Thin wrappers over the `oci-distribution` client; everything stays in
//! memory because layers are consumed immediately by extraction or push.

use oci_distribution::client::{Client, ClientConfig, Config as OciConfig, ImageLayer};
use oci_distribution::manifest::{self, OciImageManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::Reference;
use oci_spec::image::ImageConfiguration;

use kbuild_core::error::{BuildError, Result};

use super::mutable::{LayerBlob, MutableImage};
use super::reference::ImageReference;

/// Base image reference that skips pulling entirely.
pub const SCRATCH: &str = "scratch";

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Anonymous access.
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Basic authentication.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Credentials from `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`, falling
    /// back to anonymous.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();
        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// A pulled base image: layer blobs plus the parsed configuration.
#[derive(Debug)]
pub struct PulledImage {
    pub layers: Vec<LayerBlob>,
    pub config: Option<ImageConfiguration>,
}

impl PulledImage {
    /// The empty base used for `FROM scratch`.
    pub fn scratch() -> Self {
        Self {
            layers: Vec::new(),
            config: None,
        }
    }
}

/// Pulls and pushes images for the build.
pub struct RegistryClient {
    client: Client,
    auth: RegistryAuth,
}

impl RegistryClient {
    pub fn new(auth: RegistryAuth) -> Self {
        let client = Client::new(ClientConfig::default());
        Self { client, auth }
    }

    /// Pull a base image's config and layer blobs.
    pub async fn pull(&mut self, reference: &str) -> Result<PulledImage> {
        if reference == SCRATCH {
            return Ok(PulledImage::scratch());
        }
        let parsed = ImageReference::parse(reference)?;
        let oci_ref = to_oci_reference(&parsed)?;

        tracing::info!(reference = %parsed, "pulling base image");
        let image_data = self
            .client
            .pull(
                &oci_ref,
                &self.auth.to_oci_auth(),
                vec![
                    manifest::IMAGE_LAYER_MEDIA_TYPE,
                    manifest::IMAGE_LAYER_GZIP_MEDIA_TYPE,
                    manifest::IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
                    manifest::IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
                ],
            )
            .await
            .map_err(|e| BuildError::BaseImage(format!("pulling {}: {}", parsed, e)))?;

        let config: ImageConfiguration = serde_json::from_slice(&image_data.config.data)
            .map_err(|e| BuildError::BaseImage(format!("parsing config of {}: {}", parsed, e)))?;

        let diff_ids = config.rootfs().diff_ids().clone();
        if diff_ids.len() != image_data.layers.len() {
            return Err(BuildError::BaseImage(format!(
                "{}: {} layers but {} diff IDs in config",
                parsed,
                image_data.layers.len(),
                diff_ids.len()
            )));
        }
        let layers = image_data
            .layers
            .into_iter()
            .zip(diff_ids)
            .map(|(layer, diff_id)| LayerBlob {
                data: layer.data,
                media_type: layer.media_type,
                diff_id,
            })
            .collect();

        Ok(PulledImage {
            layers,
            config: Some(config),
        })
    }

    /// Push the assembled image to its destination reference.
    ///
    /// Returns the manifest URL reported by the registry.
    pub async fn push(&mut self, reference: &str, image: &MutableImage) -> Result<String> {
        let parsed = ImageReference::parse(reference)?;
        let oci_ref = to_oci_reference(&parsed)?;

        let layers: Vec<ImageLayer> = image
            .layers()
            .iter()
            .map(|layer| ImageLayer::new(layer.data.clone(), layer.media_type.clone(), None))
            .collect();
        let config_bytes = image.to_config_json()?;
        let config = OciConfig::new(
            config_bytes,
            manifest::IMAGE_CONFIG_MEDIA_TYPE.to_string(),
            None,
        );
        let image_manifest = OciImageManifest::build(&layers, &config, None);

        tracing::info!(
            reference = %parsed,
            layers = layers.len(),
            "pushing image"
        );
        let response = self
            .client
            .push(
                &oci_ref,
                &layers,
                config,
                &self.auth.to_oci_auth(),
                Some(image_manifest),
            )
            .await
            .map_err(|e| BuildError::Push(format!("pushing {}: {}", parsed, e)))?;

        tracing::info!(manifest_url = %response.manifest_url, "image pushed");
        Ok(response.manifest_url)
    }
}

fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    reference
        .full_reference()
        .parse::<Reference>()
        .map_err(|e| BuildError::Parse(format!("invalid reference '{}': {}", reference, e)))
}
