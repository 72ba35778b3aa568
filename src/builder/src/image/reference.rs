//! Image reference parsing.
//!
//! Parses references like `gcr.io/test/example:latest` into structured
//! components, applying the Docker Hub defaults for bare names.

use kbuild_core::error::{BuildError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "gcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/alpine", "test/example")
    pub repository: String,
    /// Tag (e.g., "latest", "v1.2")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supported forms:
    /// - `alpine` → docker.io/library/alpine:latest
    /// - `alpine:3.19` → docker.io/library/alpine:3.19
    /// - `user/image` → docker.io/user/image:latest
    /// - `gcr.io/org/image:tag`
    /// - `gcr.io/org/image@sha256:abc...`
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BuildError::Parse("empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(BuildError::Parse(format!(
                        "invalid digest in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // The tag separator is a colon after the last slash.
        let last_slash = name_tag.rfind('/');
        let (name, tag) = match name_tag.rfind(':') {
            Some(colon) if last_slash.map_or(true, |slash| colon > slash) => (
                &name_tag[..colon],
                Some(name_tag[colon + 1..].to_string()),
            ),
            _ => (name_tag, None),
        };
        if name.is_empty() {
            return Err(BuildError::Parse(format!(
                "invalid image reference '{}'",
                reference
            )));
        }

        // The first component is a registry iff it looks like a hostname.
        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DEFAULT_REGISTRY.to_string(), name.to_string()),
            None => (DEFAULT_REGISTRY.to_string(), format!("library/{}", name)),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The fully-qualified reference string.
    pub fn full_reference(&self) -> String {
        let mut reference = format!("{}/{}", self.registry, self.repository);
        match (&self.tag, &self.digest) {
            (_, Some(digest)) => {
                if let Some(tag) = &self.tag {
                    reference.push(':');
                    reference.push_str(tag);
                }
                reference.push('@');
                reference.push_str(digest);
            }
            (Some(tag), None) => {
                reference.push(':');
                reference.push_str(tag);
            }
            (None, None) => {
                reference.push(':');
                reference.push_str(DEFAULT_TAG);
            }
        }
        reference
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let parsed = ImageReference::parse("alpine").unwrap();
        assert_eq!(parsed.registry, "docker.io");
        assert_eq!(parsed.repository, "library/alpine");
        assert_eq!(parsed.full_reference(), "docker.io/library/alpine:latest");
    }

    #[test]
    fn test_parse_name_with_tag() {
        let parsed = ImageReference::parse("alpine:3.19").unwrap();
        assert_eq!(parsed.tag.as_deref(), Some("3.19"));
        assert_eq!(parsed.full_reference(), "docker.io/library/alpine:3.19");
    }

    #[test]
    fn test_parse_user_repository() {
        let parsed = ImageReference::parse("someuser/app").unwrap();
        assert_eq!(parsed.registry, "docker.io");
        assert_eq!(parsed.repository, "someuser/app");
    }

    #[test]
    fn test_parse_full_registry() {
        let parsed = ImageReference::parse("gcr.io/test/example:latest").unwrap();
        assert_eq!(parsed.registry, "gcr.io");
        assert_eq!(parsed.repository, "test/example");
        assert_eq!(parsed.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn test_parse_registry_with_port() {
        let parsed = ImageReference::parse("localhost:5000/my/image:dev").unwrap();
        assert_eq!(parsed.registry, "localhost:5000");
        assert_eq!(parsed.repository, "my/image");
        assert_eq!(parsed.tag.as_deref(), Some("dev"));
    }

    #[test]
    fn test_parse_digest() {
        let parsed =
            ImageReference::parse("gcr.io/org/image@sha256:0123abcd").unwrap();
        assert_eq!(parsed.digest.as_deref(), Some("sha256:0123abcd"));
        assert_eq!(parsed.tag, None);
        assert_eq!(
            parsed.full_reference(),
            "gcr.io/org/image@sha256:0123abcd"
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("image@baddigest").is_err());
    }
}
