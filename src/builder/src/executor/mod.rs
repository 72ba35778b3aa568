//! The build executor: a sequential state machine over parsed Dockerfile
//! stages.
//!
//! The driver runs stages in order. Each stage extracts its base image
//! filesystem into the build root, re-initializes the snapshotter, executes
//! every instruction through its handler, and snapshots after each one.
//! Only the final stage accumulates layers; earlier stages persist their
//! referenced files for `COPY --from` and are wiped.

mod artifacts;

use std::path::PathBuf;
use std::sync::Arc;

use kbuild_core::constants;
use kbuild_core::error::{BuildError, Result};

use crate::allowlist::Allowlist;
use crate::archive;
use crate::commands;
use crate::context::BuildContext;
use crate::dockerfile::{self, Instruction, Stage};
use crate::fsutil;
use crate::image::{ImageConfig, MutableImage, RegistryAuth, RegistryClient};
use crate::snapshot::{fingerprint, LayeredMap, Snapshotter};

pub use artifacts::{delete_filesystem, multi_stage_dependencies, persist_stage_artifacts};

/// One image build invocation.
#[derive(Debug, Clone)]
pub struct BuildOpts {
    /// Path to the Dockerfile.
    pub dockerfile: PathBuf,
    /// Local directory or remote bucket holding the build context.
    pub context: String,
    /// Registry reference the final image is pushed to.
    pub destination: String,
    /// The filesystem root the build mutates (`/` in production).
    pub root: PathBuf,
    /// Mount table consulted for the allowlist.
    pub mountinfo: PathBuf,
}

impl BuildOpts {
    pub fn new(
        dockerfile: impl Into<PathBuf>,
        context: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            dockerfile: dockerfile.into(),
            context: context.into(),
            destination: destination.into(),
            root: PathBuf::from(constants::ROOT_DIR),
            mountinfo: PathBuf::from(constants::MOUNTINFO_PATH),
        }
    }
}

/// Run the full build and push the result.
///
/// Returns the manifest URL reported by the registry.
pub async fn build(opts: &BuildOpts) -> Result<String> {
    let mut registry = RegistryClient::new(RegistryAuth::from_env());
    let image = execute_stages(opts, &mut registry).await?;
    registry.push(&opts.destination, &image).await
}

/// Run every stage in order and return the assembled (unpushed) image.
pub async fn execute_stages(
    opts: &BuildOpts,
    registry: &mut RegistryClient,
) -> Result<MutableImage> {
    let content = std::fs::read_to_string(&opts.dockerfile).map_err(|e| {
        BuildError::Parse(format!(
            "reading Dockerfile {}: {}",
            opts.dockerfile.display(),
            e
        ))
    })?;
    let stages = dockerfile::parse(&content)?;
    let context = BuildContext::resolve(&opts.context, &opts.root).await?;

    let total = stages.len();
    let mut image = None;
    for stage in &stages {
        let final_stage = stage.index + 1 == total;
        tracing::info!(
            stage = stage.index,
            base = %stage.base_image_ref,
            final_stage,
            "executing stage"
        );
        let executor = StageExecutor {
            stage,
            stages: &stages,
            opts,
            context: &context,
            registry: &mut *registry,
            final_stage,
        };
        image = executor.run().await?;
    }
    // The loop always ends on the final stage, which produces the image.
    image.ok_or_else(|| BuildError::Layer("no final stage produced an image".to_string()))
}

/// Executes a single stage against the build root.
struct StageExecutor<'a> {
    stage: &'a Stage,
    stages: &'a [Stage],
    opts: &'a BuildOpts,
    context: &'a BuildContext,
    registry: &'a mut RegistryClient,
    final_stage: bool,
}

impl StageExecutor<'_> {
    async fn run(self) -> Result<Option<MutableImage>> {
        let root = &self.opts.root;

        // Extract the base filesystem, never clobbering builder paths.
        tracing::info!(base = %self.stage.base_image_ref, "extracting base filesystem");
        let base = self.registry.pull(&self.stage.base_image_ref).await?;
        for layer in &base.layers {
            archive::extract_layer(&layer.data, root, &Allowlist::fixed())?;
        }

        let allowlist = Arc::new(Allowlist::initialize(&self.opts.mountinfo)?);

        let mut snapshotter = Snapshotter::new(
            root.clone(),
            LayeredMap::new(fingerprint),
            allowlist.clone(),
        );
        snapshotter.init()?;

        let mut config = base
            .config
            .as_ref()
            .map(ImageConfig::from_base)
            .unwrap_or_default();
        let mut image = self.final_stage.then(|| MutableImage::from_base(&base));

        for instruction in &self.stage.instructions {
            let mut command = commands::get_command(instruction, root);

            // COPY --from reads out of a previous stage's artifact store
            // instead of the build context.
            let artifact_ctx;
            let ctx = match instruction {
                Instruction::Copy {
                    from: Some(from), ..
                } => {
                    let store = fsutil::join_rooted(root, constants::KBUILD_DIR).join(from);
                    artifact_ctx = BuildContext::at(store);
                    &artifact_ctx
                }
                _ => self.context,
            };

            command.execute(&mut config, ctx).await?;

            let tar = match command.files_to_snapshot() {
                None => {
                    tracing::info!("taking full snapshot");
                    let (bytes, changed) = snapshotter.take_full_snapshot()?;
                    changed.then_some(bytes)
                }
                Some(files) => snapshotter.take_targeted_snapshot(&files)?,
            };

            if let Some(image) = image.as_mut() {
                match tar {
                    Some(bytes) => image.append_layer(bytes, command.created_by())?,
                    None => image.append_empty_history(command.created_by()),
                }
            }
        }

        if let Some(mut image) = image {
            image.set_config(config);
            return Ok(Some(image));
        }

        // Non-final stage: keep what later stages need, wipe the rest.
        persist_stage_artifacts(self.stage, self.stages, root, &allowlist)?;
        delete_filesystem(root, &allowlist)?;
        Ok(None)
    }
}
