//! Per-instruction handlers.
//!
//! Each Dockerfile instruction maps to one handler behind the
//! `DockerCommand` trait. A handler either mutates the image configuration
//! only (metadata instructions) or also writes under the build root
//! (RUN/COPY/ADD), and afterwards tells the executor which files to
//! snapshot.

mod add;
mod cmd;
mod copy;
mod entrypoint;
mod env;
mod expose;
mod label;
mod run;
mod user;
mod volume;
mod workdir;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use kbuild_core::error::{BuildError, Result};

use crate::context::BuildContext;
use crate::dockerfile::Instruction;
use crate::fsutil;
use crate::image::ImageConfig;
use crate::resolve;

pub use add::AddCommand;
pub use cmd::CmdCommand;
pub use copy::CopyCommand;
pub use entrypoint::EntrypointCommand;
pub use env::EnvCommand;
pub use expose::ExposeCommand;
pub use label::LabelCommand;
pub use run::RunCommand;
pub use user::UserCommand;
pub use volume::VolumeCommand;
pub use workdir::WorkdirCommand;

/// A single executable Dockerfile instruction.
#[async_trait]
pub trait DockerCommand: Send {
    /// Perform the instruction: mutate `config`, and for filesystem
    /// instructions write under the build root. Must not touch the config
    /// history — the executor owns that.
    async fn execute(&mut self, config: &mut ImageConfig, ctx: &BuildContext) -> Result<()>;

    /// The files this instruction touched: a precise list, an empty list
    /// for metadata-only instructions, or `None` when arbitrary paths may
    /// have changed (RUN) and a full snapshot is required.
    fn files_to_snapshot(&self) -> Option<Vec<PathBuf>>;

    /// The human-readable line recorded in the image config history.
    fn created_by(&self) -> String;
}

/// Resolve the handler for an instruction.
pub fn get_command(instruction: &Instruction, root: &Path) -> Box<dyn DockerCommand> {
    match instruction.clone() {
        Instruction::Run {
            cmdline,
            prepend_shell,
        } => Box::new(RunCommand::new(cmdline, prepend_shell, root)),
        Instruction::Copy {
            sources,
            dest,
            from,
            chown,
        } => Box::new(CopyCommand::new(sources, dest, from, chown, root)),
        Instruction::Add {
            sources,
            dest,
            chown,
        } => Box::new(AddCommand::new(sources, dest, chown, root)),
        Instruction::Env { pairs } => Box::new(EnvCommand::new(pairs)),
        Instruction::Workdir { path } => Box::new(WorkdirCommand::new(path, root)),
        Instruction::Expose { ports } => Box::new(ExposeCommand::new(ports)),
        Instruction::Cmd {
            argv,
            prepend_shell,
        } => Box::new(CmdCommand::new(argv, prepend_shell)),
        Instruction::Entrypoint {
            argv,
            prepend_shell,
        } => Box::new(EntrypointCommand::new(argv, prepend_shell)),
        Instruction::User { user } => Box::new(UserCommand::new(user)),
        Instruction::Volume { paths } => Box::new(VolumeCommand::new(paths)),
        Instruction::Label { pairs } => Box::new(LabelCommand::new(pairs)),
    }
}

/// Copy one resolved context file to its destination under the root,
/// preserving mode. Returns the real path written, for the snapshot list.
pub(crate) fn copy_context_file(
    ctx: &BuildContext,
    root: &Path,
    file: &str,
    src: &str,
    dest: &str,
    cwd: &str,
    chown: Option<&str>,
) -> Result<PathBuf> {
    let src_is_dir = ctx.stat(src).map(|m| m.is_dir()).unwrap_or(false);
    let info = ctx.stat(file)?;
    let dest_path =
        resolve::destination_filepath(file, src, dest, cwd, src_is_dir, info.is_dir());
    let target = fsutil::join_rooted(root, &dest_path);
    let mode = info.permissions().mode() & 0o7777;

    if info.is_dir() {
        tracing::info!(path = %target.display(), "creating directory");
        fsutil::create_dir(&target, mode)?;
    } else {
        let contents = ctx.contents(file)?;
        tracing::info!(from = file, to = %target.display(), "copying file");
        fsutil::create_file(&target, &contents, mode)?;
    }
    apply_chown(&target, chown)?;
    Ok(target)
}

/// Apply a numeric `uid[:gid]` ownership specification.
pub(crate) fn apply_chown(path: &Path, chown: Option<&str>) -> Result<()> {
    let Some(spec) = chown else {
        return Ok(());
    };
    let (user, group) = spec.split_once(':').unwrap_or((spec, spec));
    match (user.parse::<u32>(), group.parse::<u32>()) {
        (Ok(uid), Ok(gid)) => std::os::unix::fs::chown(path, Some(uid), Some(gid))
            .map_err(|e| BuildError::Copy(format!("chown {}: {}", path.display(), e))),
        _ => {
            tracing::warn!(chown = spec, "ignoring non-numeric chown specification");
            Ok(())
        }
    }
}
