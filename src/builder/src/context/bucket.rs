//! Remote bucket context fetching.
//!
//! The context tarball `kbuild.tar` is downloaded from the bucket's public
//! object URL and unpacked into the well-known build-context directory.

use std::path::Path;

use kbuild_core::constants;
use kbuild_core::error::{BuildError, Result};

use crate::archive;

fn object_url(bucket: &str) -> String {
    format!(
        "https://storage.googleapis.com/{}/{}",
        bucket,
        constants::CONTEXT_TARBALL
    )
}

/// Download `kbuild.tar` from `bucket` and unpack it into `dest`.
pub async fn fetch_and_unpack(bucket: &str, dest: &Path) -> Result<()> {
    let url = object_url(bucket);
    tracing::info!(%url, dest = %dest.display(), "fetching context tarball");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| BuildError::Context(format!("fetching {}: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(BuildError::Context(format!(
            "fetching {}: HTTP {}",
            url,
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BuildError::Context(format!("reading {}: {}", url, e)))?;

    std::fs::create_dir_all(dest)
        .map_err(|e| BuildError::Context(format!("creating {}: {}", dest.display(), e)))?;
    archive::unpack_tar_stream(bytes.as_ref(), dest)
        .map_err(|e| BuildError::Context(format!("unpacking context tarball: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        assert_eq!(
            object_url("my-builds"),
            "https://storage.googleapis.com/my-builds/kbuild.tar"
        );
    }
}
