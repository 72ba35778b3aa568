//! kbuild build engine.
//!
//! Builds an OCI container image from a Dockerfile without a container
//! runtime daemon: the builder runs inside a container, mutates its own
//! root filesystem to reproduce each instruction's semantics, snapshots the
//! changes into tar layers, and pushes the assembled image to a registry.
//!
//! # Architecture
//!
//! ```text
//! Dockerfile ──parse──▶ stages ──▶ multi-stage driver
//!                                      │ per stage
//!                                      ▼
//!                       extract base ─▶ snapshotter.init()
//!                                      │ per instruction
//!                                      ▼
//!                       handler.execute ─▶ snapshot ─▶ layer / history
//!                                      │
//!                                      ▼
//!                       final stage: assemble image ─▶ push
//! ```

pub mod allowlist;
pub mod archive;
pub mod commands;
pub mod context;
pub mod dockerfile;
pub mod executor;
pub mod fsutil;
pub mod image;
pub mod resolve;
pub mod snapshot;

pub use allowlist::Allowlist;
pub use context::BuildContext;
pub use dockerfile::{Instruction, Stage};
pub use executor::{build, BuildOpts};
pub use image::{ImageConfig, ImageReference, MutableImage, RegistryAuth, RegistryClient};
pub use snapshot::{LayeredMap, Snapshotter};
