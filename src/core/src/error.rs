use thiserror::Error;

/// kbuild error types.
///
/// Every variant is fatal to the build: the executor logs the error and
/// exits. There is no partial retry — masking an error would produce an
/// image that differs from what the Dockerfile describes.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Dockerfile unparseable or contains an unsupported instruction
    #[error("parse error: {0}")]
    Parse(String),

    /// Pulling or extracting the base image failed
    #[error("base image error: {0}")]
    BaseImage(String),

    /// Build context missing, unreadable, or bucket unpack failed
    #[error("build context error: {0}")]
    Context(String),

    /// Environment expansion, wildcard match, or URL scheme failure
    #[error("resolve error: {0}")]
    Resolve(String),

    /// Source validation failed for a COPY/ADD instruction
    #[error("invalid sources: {0}")]
    InvalidSources(String),

    /// Reading or writing files during COPY/ADD, including tar extraction
    #[error("copy error: {0}")]
    Copy(String),

    /// RUN subprocess failed to spawn or exited non-zero
    #[error("run error: {0}")]
    Run(String),

    /// Filesystem walk, stat, or tar-write failure while snapshotting
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Appending a layer to the image failed
    #[error("layer error: {0}")]
    Layer(String),

    /// Pushing the final image to the registry failed
    #[error("push error: {0}")]
    Push(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        BuildError::Serialization(err.to_string())
    }
}

/// Result type alias for kbuild operations
pub type Result<T> = std::result::Result<T, BuildError>;
