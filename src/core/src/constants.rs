//! Well-known paths and defaults shared across the builder.

/// Default log level for the CLI.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The root directory the builder mutates. The builder runs inside its own
/// container, so this is `/` in production; tests substitute a tempdir.
pub const ROOT_DIR: &str = "/";

/// Directory owned by the builder itself. Always allowlisted so the
/// snapshotter never captures it and the between-stage wipe never removes it.
pub const KBUILD_DIR: &str = "/kbuild";

/// Directory a remote build context is unpacked into.
pub const BUILD_CONTEXT_DIR: &str = "/kbuild/buildcontext";

/// Name of the context tarball fetched from a remote bucket.
pub const CONTEXT_TARBALL: &str = "kbuild.tar";

/// Kernel mount table consulted when initializing the allowlist.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Registry credential file, protected from the between-stage wipe.
pub const DOCKER_CONFIG_PATH: &str = "/root/.docker/config.json";

/// CA certificate bundle, protected from the between-stage wipe.
pub const CA_CERTS_DIR: &str = "/etc/ssl/certs";

/// Recorded as the author of image history entries.
pub const AUTHOR: &str = "kbuild";

/// Shell used for shell-form RUN/CMD/ENTRYPOINT.
pub const SHELL: &str = "/bin/sh";
