//! Shared foundation for the kbuild image builder: the error taxonomy and
//! the well-known paths every subsystem agrees on.

pub mod constants;
pub mod error;

pub use error::{BuildError, Result};
