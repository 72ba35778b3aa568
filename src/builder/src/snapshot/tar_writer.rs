//! Tar stream production for image layers.
//!
//! Entries are named by the absolute path they were walked at, not made
//! relative, so a layer records exactly where in the image filesystem each
//! file lives. Hardlink identity is tracked per writer instance: it is only
//! meaningful within a single archive.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use kbuild_core::error::{BuildError, Result};

const GNU_LONG_NAME_MARKER: &[u8] = b"././@LongLink";

/// Accumulates tar entries for one layer in memory.
pub struct LayerWriter {
    builder: tar::Builder<Vec<u8>>,
    hardlinks: HashMap<u64, PathBuf>,
    entries: usize,
}

impl LayerWriter {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
            hardlinks: HashMap::new(),
            entries: 0,
        }
    }

    /// Append the filesystem entry at `path` under its absolute name.
    ///
    /// Directories yield headers without bodies, symlinks record their
    /// readlink target, the second sighting of an inode becomes a hardlink
    /// entry pointing at the first, and regular files stream their contents.
    pub fn append(&mut self, path: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(path)
            .map_err(|e| BuildError::Snapshot(format!("stat {}: {}", path.display(), e)))?;
        let file_type = meta.file_type();

        let mut header = tar::Header::new_gnu();
        header.set_metadata(&meta);

        if file_type.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| BuildError::Snapshot(format!("readlink {}: {}", path.display(), e)))?;
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header
                .set_link_name(&target)
                .map_err(|e| BuildError::Snapshot(format!("link name for {}: {}", path.display(), e)))?;
            self.append_with_name(&mut header, path, io::empty())?;
            return Ok(());
        }

        if file_type.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            self.append_with_name(&mut header, path, io::empty())?;
            return Ok(());
        }

        // Hardlink: emit a link entry pointing at the first path this inode
        // was seen under.
        if meta.nlink() > 1 {
            if let Some(original) = self.hardlinks.get(&meta.ino()).cloned() {
                if original != path {
                    tracing::debug!(
                        path = %path.display(),
                        original = %original.display(),
                        "emitting hardlink entry"
                    );
                    header.set_entry_type(tar::EntryType::Link);
                    header.set_size(0);
                    header.set_link_name(&original).map_err(|e| {
                        BuildError::Snapshot(format!("link name for {}: {}", path.display(), e))
                    })?;
                    self.append_with_name(&mut header, path, io::empty())?;
                    return Ok(());
                }
            } else {
                self.hardlinks.insert(meta.ino(), path.to_path_buf());
            }
        }

        if !file_type.is_file() {
            // Sockets and fifos carry no body.
            header.set_size(0);
            self.append_with_name(&mut header, path, io::empty())?;
            return Ok(());
        }

        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(meta.len());
        let file = fs::File::open(path)
            .map_err(|e| BuildError::Snapshot(format!("open {}: {}", path.display(), e)))?;
        self.append_with_name(&mut header, path, file)
    }

    /// Number of entries appended so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Finish the archive and return its bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.builder
            .into_inner()
            .map_err(|e| BuildError::Snapshot(format!("finalizing layer tar: {}", e)))
    }

    /// Set the (possibly absolute, possibly long) entry name and append.
    ///
    /// `Header::set_path` insists on relative names, so the name bytes are
    /// written into the GNU header directly; names over 100 bytes get a GNU
    /// long-name extension entry first, exactly as GNU tar emits them.
    fn append_with_name<R: io::Read>(
        &mut self,
        header: &mut tar::Header,
        path: &Path,
        data: R,
    ) -> Result<()> {
        let name = path.as_os_str().as_encoded_bytes();
        let field = &mut header
            .as_gnu_mut()
            .expect("header was constructed as GNU")
            .name;
        if name.len() <= field.len() {
            field[..name.len()].copy_from_slice(name);
        } else {
            let truncated = name[..field.len()].to_vec();
            field.copy_from_slice(&truncated);
            self.append_long_name(name)?;
        }
        header.set_cksum();
        self.builder
            .append(header, data)
            .map_err(|e| BuildError::Snapshot(format!("appending {}: {}", path.display(), e)))?;
        self.entries += 1;
        Ok(())
    }

    fn append_long_name(&mut self, name: &[u8]) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        {
            let field = &mut header
                .as_gnu_mut()
                .expect("header was constructed as GNU")
                .name;
            field[..GNU_LONG_NAME_MARKER.len()].copy_from_slice(GNU_LONG_NAME_MARKER);
        }
        let mut data = name.to_vec();
        data.push(0);
        header.set_entry_type(tar::EntryType::GNULongName);
        header.set_mode(0o644);
        header.set_size(data.len() as u64);
        header.set_cksum();
        self.builder
            .append(&header, data.as_slice())
            .map_err(|e| BuildError::Snapshot(format!("appending long name entry: {}", e)))
    }
}

impl Default for LayerWriter {
    fn default() -> Self {
        Self::new()
    }
}
