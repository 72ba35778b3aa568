//! The COPY instruction: resolver-driven file transfer from the build
//! context (or a previous stage's artifacts) into the image filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use kbuild_core::error::Result;

use crate::context::BuildContext;
use crate::image::ImageConfig;
use crate::resolve;

use super::{copy_context_file, DockerCommand};

#[derive(Debug)]
pub struct CopyCommand {
    sources: Vec<String>,
    dest: String,
    from: Option<String>,
    chown: Option<String>,
    root: PathBuf,
    snapshot_files: Vec<PathBuf>,
}

impl CopyCommand {
    pub fn new(
        sources: Vec<String>,
        dest: String,
        from: Option<String>,
        chown: Option<String>,
        root: &Path,
    ) -> Self {
        Self {
            sources,
            dest,
            from,
            chown,
            root: root.to_path_buf(),
            snapshot_files: Vec::new(),
        }
    }

    /// The stage this COPY reads from, when `--from` was given. The
    /// executor swaps the build context accordingly before `execute`.
    pub fn from_stage(&self) -> Option<&str> {
        self.from.as_deref()
    }
}

#[async_trait]
impl DockerCommand for CopyCommand {
    async fn execute(&mut self, config: &mut ImageConfig, ctx: &BuildContext) -> Result<()> {
        let mut resolved = resolve::resolve_environment_list(
            &[self.sources.clone(), vec![self.dest.clone()]].concat(),
            &config.env,
        );
        let dest = resolved.pop().unwrap_or_default();
        let sources = resolved;
        tracing::info!(?sources, %dest, "cmd: copy");

        let src_map = resolve::resolve_sources(&sources, &dest, ctx)?;
        let cwd = config.working_dir().to_string();
        for (src, files) in &src_map {
            for file in files {
                if !ctx.exists(file) {
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
    use kbuild_core::error::BuildError;
    use std::fs;
    use tempfile::TempDir;

    fn context_with(files: &[(&str, &str)]) -> (TempDir, BuildContext) {
        let tmp = TempDir::new().unwrap();
        for (path, contents) in files {
            let full = tmp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, contents).unwrap();
        }
        let ctx = BuildContext::at(tmp.path());
        (tmp, ctx)
    }

    async fn run_copy(
        sources: &[&str],
        dest: &str,
        ctx: &BuildContext,
        config: &mut ImageConfig,
        root: &Path,
    ) -> Result<CopyCommand> {
        let mut command = CopyCommand::new(
            sources.iter().map(|s| s.to_string()).collect(),
            dest.to_string(),
            None,
            None,
            root,
        );
        command.execute(config, ctx).await?;
        Ok(command)
    }

    #[tokio::test]
    async fn test_copy_single_file_to_file_dest() {
        let (_ctx_dir, ctx) = context_with(&[("foo", "hi")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        let command = run_copy(&["foo"], "/bar", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(root.path().join("bar")).unwrap(), "hi");
        assert_eq!(
            command.files_to_snapshot().unwrap(),
            vec![root.path().join("bar")]
        );
        assert_eq!(command.created_by(), "foo /bar");
    }

    #[tokio::test]
    async fn test_copy_env_expanded_dest() {
        let (_ctx_dir, ctx) = context_with(&[("foo", "x")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();
        config.set_env("DIR", "/out/");

        run_copy(&["foo"], "$DIR", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(root.path().join("out/foo")).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_copy_wildcard_to_dir() {
        let (_ctx_dir, ctx) = context_with(&[("pkg/a", "1"), ("pkg/b", "2"), ("other", "z")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        let command = run_copy(&["pkg/*"], "/p/", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(root.path().join("p/a")).unwrap(), "1");
        assert_eq!(fs::read_to_string(root.path().join("p/b")).unwrap(), "2");
        assert!(!root.path().join("p/other").exists());
        assert_eq!(command.files_to_snapshot().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_copy_directory_source() {
        let (_ctx_dir, ctx) = context_with(&[("dir/a/b", "deep"), ("dir/c", "shallow")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        run_copy(&["dir"], "/pkg/", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("pkg/a/b")).unwrap(),
            "deep"
        );
        assert_eq!(fs::read_to_string(root.path().join("pkg/c")).unwrap(), "shallow");
    }

    #[tokio::test]
    async fn test_copy_dot_source() {
        let (_ctx_dir, ctx) = context_with(&[("context/bar", "b")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        run_copy(&["."], "/dir", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("dir/context/bar")).unwrap(),
            "b"
        );
    }

    #[tokio::test]
    async fn test_copy_relative_dest_uses_workdir() {
        let (_ctx_dir, ctx) = context_with(&[("foo", "w")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();
        config.workdir = "/app".to_string();

        run_copy(&["foo"], "foo", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(root.path().join("app/foo")).unwrap(), "w");
    }

    #[tokio::test]
    async fn test_copy_no_match_is_invalid_sources() {
        let (_ctx_dir, ctx) = context_with(&[("foo", "x")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        let err = run_copy(&["*.missing"], "/d/", &ctx, &mut config, root.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidSources(_)));
    }

    #[tokio::test]
    async fn test_copy_multi_source_needs_dir_dest() {
        let (_ctx_dir, ctx) = context_with(&[("a", "1"), ("b", "2")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        let err = run_copy(&["a", "b"], "/single", &ctx, &mut config, root.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidSources(_)));
    }

    #[tokio::test]
    async fn test_copy_escaped_dollar_source() {
        let (_ctx_dir, ctx) = context_with(&[("$foo", "literal")]);
        let root = TempDir::new().unwrap();
        let mut config = ImageConfig::default();

        run_copy(&[r"\$foo"], "/out", &ctx, &mut config, root.path())
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("out")).unwrap(),
            "literal"
        );
    }
}
