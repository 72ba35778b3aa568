//! kbuild CLI entry point.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kbuild_builder::executor::{build, BuildOpts};
use kbuild_core::constants;

/// Build a container image from a Dockerfile and push it to a registry,
/// without a container runtime daemon.
#[derive(Parser, Debug)]
#[command(name = "kbuild", version, about)]
struct Cli {
    /// Path to the Dockerfile to be built
    #[arg(short = 'f', long, default_value = "/workspace/Dockerfile")]
    dockerfile: PathBuf,

    /// Path to the build context: a local directory or a remote bucket name
    #[arg(short = 'c', long)]
    context: String,

    /// Registry reference the final image is pushed to
    /// (ex: gcr.io/test/example:latest)
    #[arg(short = 'd', long)]
    destination: String,

    /// Log level (debug, info, warn, error, fatal, panic)
    #[arg(short = 'v', long, default_value = constants::DEFAULT_LOG_LEVEL)]
    verbosity: String,
}

/// Map the logrus-style verbosity names onto tracing filter directives.
fn log_filter(verbosity: &str) -> Result<&'static str, String> {
    match verbosity {
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" => Ok("warn"),
        "error" | "fatal" | "panic" => Ok("error"),
        other => Err(format!(
            "unknown verbosity '{}' (expected debug|info|warn|error|fatal|panic)",
            other
        )),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match log_filter(&cli.verbosity) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let opts = BuildOpts::new(cli.dockerfile, cli.context, cli.destination);
    match build(&opts).await {
        Ok(manifest_url) => {
            tracing::info!(%manifest_url, "build complete");
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
