//! Image state and registry plumbing: the mutable per-stage configuration,
//! the under-construction image, reference parsing, and pull/push.

mod config;
mod mutable;
mod reference;
mod registry;

pub use config::ImageConfig;
pub use mutable::{LayerBlob, MutableImage, LAYER_MEDIA_TYPE};
pub use reference::ImageReference;
pub use registry::{PulledImage, RegistryAuth, RegistryClient, SCRATCH};
