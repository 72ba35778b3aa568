//! The ADD instruction.
//!
//! ADD is COPY plus two special source forms: remote URLs (downloaded with
//! 0600 permissions and the upstream `Last-Modified` mtime) and local tar
//! archives named literally (unpacked into the destination, with the
//! unpacked files replacing the archive in the snapshot list).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use filetime::FileTime;

use kbuild_core::error::{BuildError, Result};

use crate::archive;
use crate::context::BuildContext;
use crate::fsutil;
use crate::image::ImageConfig;
use crate::resolve;

use super::{apply_chown, copy_context_file, DockerCommand};

pub struct AddCommand {
    sources: Vec<String>,
    dest: String,
    chown: Option<String>,
    root: PathBuf,
    snapshot_files: Vec<PathBuf>,
}

impl AddCommand {
    pub fn new(sources: Vec<String>, dest: String, chown: Option<String>, root: &Path) -> Self {
        Self {
            sources,
            dest,
            chown,
            root: root.to_path_buf(),
            snapshot_files: Vec::new(),
        }
    }

    async fn add_remote_file(&mut self, url: &str, dest: &str, cwd: &str) -> Result<()> {
        // A directory destination gets the URL's filename appended; anything
        // else is the literal target.
        let filename = url.rsplit('/').next().unwrap_or("download");
        let dest_path = if resolve::is_dest_dir(dest) {
            let base = if dest.starts_with('/') {
                dest.to_string()
            } else {
                resolve::go_join(&[cwd, dest])
            };
            resolve::go_join(&[&base, filename])
        } else if dest.starts_with('/') {
            dest.to_string()
        } else {
            resolve::go_join(&[cwd, dest])
        };
        let target = fsutil::join_rooted(&self.root, &dest_path);

        tracing::info!(url, target = %target.display(), "downloading remote file");
        let response = reqwest::get(url)
            .await
            .map_err(|e| BuildError::Resolve(format!("fetching {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(BuildError::Resolve(format!(
                "fetching {}: HTTP {}",
                url,
                response.status()
            )));
        }
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| chrono::DateTime::parse_from_rfc2822(v).ok());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BuildError::Resolve(format!("reading {}: {}", url, e)))?;

        fsutil::create_file(&target, &bytes, 0o600)?;
        if let Some(modified) = last_modified {
            filetime::set_file_mtime(&target, FileTime::from_unix_time(modified.timestamp(), 0))
                .map_err(|e| BuildError::Copy(format!("setting mtime on {}: {}", target.display(), e)))?;
        }
        apply_chown(&target, self.chown.as_deref())?;
        self.snapshot_files.push(target);
        Ok(())
    }
}

#[async_trait]
impl DockerCommand for AddCommand {
    async fn execute(&mut self, config: &mut ImageConfig, ctx: &BuildContext) -> Result<()> {
        let mut resolved = resolve::resolve_environment_list(
            &[self.sources.clone(), vec![self.dest.clone()]].concat(),
            &config.env,
        );
        let dest = resolved.pop().unwrap_or_default();
        let sources = resolved;
        tracing::info!(?sources, %dest, "cmd: add");

        let cwd = config.working_dir().to_string();
        let unpack_dest = if dest.starts_with('/') {
            resolve::clean_path(&dest)
        } else {
            resolve::go_join(&[&cwd, &dest])
        };

        // Remote URLs are handled directly and drop out of source
        // resolution.
        let mut local_sources = Vec::new();
        for src in sources {
            if resolve::is_url(&src) {
                self.add_remote_file(&src, &dest, &cwd).await?;
            } else {
                local_sources.push(src);
            }
        }
        if local_sources.is_empty() {
            return Ok(());
        }

        let src_map = resolve::resolve_sources(&local_sources, &dest, ctx)?;
        for (src, files) in &src_map {
            for file in files {
                if !ctx.exists(file) {
                    continue;
                }
                let file_path = ctx.join(file);
                if resolve::is_filename_source(src_map.keys(), file)?
                    && archive::is_local_tar_archive(&file_path)
                {
                    let target_dir = fsutil::join_rooted(&self.root, &unpack_dest);
                    tracing::info!(
                        archive = %file,
                        dest = %target_dir.display(),
                        "unpacking local tar archive"
                    );
                    archive::unpack_local_tar_archive(&file_path, &target_dir)?;
                    // The unpacked files replace the archive in the
                    // snapshot list.
                    self.snapshot_files.extend(fsutil::files_under(&target_dir)?);
                    continue;
                }
                let written = copy_context_file(
                    ctx,
                    &self.root,
                    file,
                    src,
                    &dest,
                    &cwd,
                    self.chown.as_deref(),
                )?;
                self.snapshot_files.push(written);
            }
        }
        Ok(())
    }

    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>> {
        Some(self.snapshot_files.clone())
    }

    fn created_by(&self) -> String {
        let mut parts = self.sources.clone();
        parts.push(self.dest.clone());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[tokio::test]
    async fn test_add_unpacks_literal_tar_source() {
        let ctx_dir = TempDir::new().unwrap();
        fs::write(
            ctx_dir.path().join("archive.tar"),
            tar_bytes(&[("inside/file", b"hello")]),
        )
        .unwrap();
        let ctx = BuildContext::at(ctx_dir.path());

        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();
        let mut command = AddCommand::new(
            vec!["archive.tar".to_string()],
            "/x/".to_string(),
            None,
            root.path(),
        );
        command.execute(&mut config, &ctx).await.unwrap();

        assert_eq!(
            fs::read_to_string(root.path().join("x/inside/file")).unwrap(),
            "hello"
        );
        // The archive itself must not land in the image.
        assert!(!root.path().join("x/archive.tar").exists());

        let files = command.files_to_snapshot().unwrap();
        assert!(files.contains(&root.path().join("x/inside/file")));
        assert!(!files.iter().any(|f| f.ends_with("archive.tar")));
    }

    #[tokio::test]
    async fn test_add_plain_file_copies_like_copy() {
        let ctx_dir = TempDir::new().unwrap();
        fs::write(ctx_dir.path().join("notes.txt"), "plain").unwrap();
        let ctx = BuildContext::at(ctx_dir.path());

        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();
        let mut command = AddCommand::new(
            vec!["notes.txt".to_string()],
            "/doc/".to_string(),
            None,
            root.path(),
        );
        command.execute(&mut config, &ctx).await.unwrap();

        assert_eq!(
            fs::read_to_string(root.path().join("doc/notes.txt")).unwrap(),
            "plain"
        );
    }

    #[tokio::test]
    async fn test_add_relative_dest_unpacks_under_workdir() {
        let ctx_dir = TempDir::new().unwrap();
        fs::write(
            ctx_dir.path().join("bundle.tar"),
            tar_bytes(&[("f", b"data")]),
        )
        .unwrap();
        let ctx = BuildContext::at(ctx_dir.path());

        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();
        config.workdir = "/app".to_string();
        let mut command = AddCommand::new(
            vec!["bundle.tar".to_string()],
            "unpacked/".to_string(),
            None,
            root.path(),
        );
        command.execute(&mut config, &ctx).await.unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("app/unpacked/f")).unwrap(),
            "data"
        );
    }

    #[test]
    fn test_created_by() {
        let command = AddCommand::new(
            vec!["a".to_string(), "b".to_string()],
            "/dest/".to_string(),
            None,
            Path::new("/"),
        );
        assert_eq!(command.created_by(), "a b /dest/");
    }
}
