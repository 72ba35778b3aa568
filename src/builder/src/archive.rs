//! Tar archive handling: compression sniffing, local-archive unpacking for
//! ADD, and base-image layer extraction into the build root.

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use kbuild_core::error::{BuildError, Result};

use crate::allowlist::Allowlist;
use crate::fsutil::join_rooted;

/// Prefix marking a deleted path in an image layer.
const WHITEOUT_PREFIX: &str = ".wh.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

fn detect_compression(buf: &[u8]) -> Compression {
    if buf.starts_with(&[0x1f, 0x8b]) {
        Compression::Gzip
    } else if buf.starts_with(b"BZh") {
        Compression::Bzip2
    } else if buf.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Compression::Xz
    } else {
        Compression::None
    }
}

/// True if the file at `path` is a local tar archive: either its magic
/// number marks a compressed stream, or it parses as an uncompressed tar.
pub fn is_local_tar_archive(path: &Path) -> bool {
    let mut magic = [0u8; 6];
    let n = match fs::File::open(path).and_then(|mut f| f.read(&mut magic)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    if detect_compression(&magic[..n]) != Compression::None {
        return true;
    }
    is_uncompressed_tar(path)
}

fn is_uncompressed_tar(path: &Path) -> bool {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        return false;
    }
    let mut archive = tar::Archive::new(file);
    match archive.entries() {
        Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
        Err(_) => false,
    }
}

/// Unpack the local tar archive at `path` into the directory `dest`,
/// preserving modes, like `tar -x` would. The destination is created if
/// missing.
pub fn unpack_local_tar_archive(path: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .map_err(|e| BuildError::Copy(format!("creating {}: {}", dest.display(), e)))?;
    let mut magic = [0u8; 6];
    let n = fs::File::open(path)
        .and_then(|mut f| f.read(&mut magic))
        .map_err(|e| BuildError::Copy(format!("opening {}: {}", path.display(), e)))?;

    let file = fs::File::open(path)
        .map_err(|e| BuildError::Copy(format!("opening {}: {}", path.display(), e)))?;
    match detect_compression(&magic[..n]) {
        Compression::Gzip => unpack_tar_stream(GzDecoder::new(file), dest),
        Compression::None if is_uncompressed_tar(path) => unpack_tar_stream(file, dest),
        Compression::Bzip2 | Compression::Xz => Err(BuildError::Copy(format!(
            "{}: unsupported archive compression",
            path.display()
        ))),
        Compression::None => Err(BuildError::Copy(format!(
            "{} is not a local tar archive",
            path.display()
        ))),
    }
}

/// Unpack a tar stream into `dest`, preserving permissions.
pub fn unpack_tar_stream<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| BuildError::Copy(format!("unpacking archive to {}: {}", dest.display(), e)))?;
    Ok(())
}

/// Extract one base-image layer into the build root.
///
/// Allowlisted target paths are never clobbered, and whiteout markers
/// delete the path they shadow instead of materializing as files. The
/// layer may be gzip-compressed or raw tar.
pub fn extract_layer(data: &[u8], root: &Path, allowlist: &Allowlist) -> Result<()> {
    match detect_compression(data) {
        Compression::Gzip => extract_tar_entries(GzDecoder::new(data), root, allowlist),
        Compression::None => extract_tar_entries(data, root, allowlist),
        other => Err(BuildError::BaseImage(format!(
            "unsupported layer compression {:?}",
            other
        ))),
    }
}

fn extract_tar_entries<R: Read>(reader: R, root: &Path, allowlist: &Allowlist) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    let entries = archive
        .entries()
        .map_err(|e| BuildError::BaseImage(format!("reading layer: {}", e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| BuildError::BaseImage(format!("reading layer: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| BuildError::BaseImage(format!("layer entry path: {}", e)))?
            .into_owned();

        if let Some(name) = entry_path.file_name().and_then(|n| n.to_str()) {
            if let Some(shadowed) = name.strip_prefix(WHITEOUT_PREFIX) {
                let target = join_rooted(root, entry_path.with_file_name(shadowed));
                if target.exists() {
                    remove_any(&target)?;
                }
                continue;
            }
        }

        let target = join_rooted(root, &entry_path);
        if allowlist.should_ignore(&target, root) {
            tracing::debug!(path = %target.display(), "skipping allowlisted path during extraction");
            continue;
        }
        entry.unpack_in(root).map_err(|e| {
            BuildError::BaseImage(format!("extracting {}: {}", entry_path.display(), e))
        })?;
    }
    Ok(())
}

fn remove_any(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| BuildError::BaseImage(format!("stat {}: {}", path.display(), e)))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| BuildError::BaseImage(format!("removing {}: {}", path.display(), e)))
}
