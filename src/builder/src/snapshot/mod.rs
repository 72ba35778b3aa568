//! Incremental filesystem snapshotting: the layered fingerprint map, the
//! layer tar writer, and the snapshotter that drives both.

mod layered_map;
mod snapshotter;
mod tar_writer;

pub use layered_map::{fingerprint, Hasher, LayeredMap};
pub use snapshotter::Snapshotter;
pub use tar_writer::LayerWriter;
