//! CLI command definitions and dispatch.

pub mod jail;
pub mod run;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use corral_common::config::CorralConfig;
use corral_runtime::engine::Engine;
use corral_runtime::process::ExecutionRequest;

const LONG_ABOUT: &str = "\
Pulls an image from a Docker Registry v2 (Docker Hub by default) into a
temporary root directory and runs a command in it under chroot, as PID 1 of
a new PID namespace. The temporary root is removed when the command exits,
and corral exits with the command's exit status.

Only the filesystem root and the process ID space are isolated. Network,
mounts, users, IPC and hostname are shared with the host, no resource limits
are applied, and a process running as root can escape a chroot. Running
requires root (CAP_SYS_ADMIN and CAP_SYS_CHROOT).

Ctrl-C (or SIGTERM) stops a pull in progress. Once the command runs, the
first interrupt is forwarded to it as SIGINT, which a command running as
PID 1 ignores unless it handles it; a second interrupt kills it. The
temporary root is removed in every case.";

/// corral: run a command inside a pulled image.
#[derive(Parser, Debug)]
#[command(name = "corral", version, about, long_about = LONG_ABOUT)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Registry and scratch directory overrides.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Base URL of the registry API.
    #[arg(long, global = true, env = "CORRAL_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// URL of the token endpoint.
    #[arg(long, global = true, env = "CORRAL_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Service name sent to the token endpoint.
    #[arg(long, global = true, env = "CORRAL_AUTH_SERVICE")]
    pub auth_service: Option<String>,

    /// Directory that holds temporary roots and layer archives.
    #[arg(long, global = true, env = "CORRAL_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,
}

impl GlobalArgs {
    /// Applies the overrides on top of the default configuration.
    #[must_use]
    pub fn config(&self) -> CorralConfig {
        let mut config = CorralConfig::default();
        if let Some(url) = &self.registry_url {
            config.registry.registry_url.clone_from(url);
        }
        if let Some(url) = &self.auth_url {
            config.registry.auth_url.clone_from(url);
        }
        if let Some(service) = &self.auth_service {
            config.registry.auth_service.clone_from(service);
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir.clone_from(dir);
        }
        config
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull an image and run a command inside it.
    Run(run::RunArgs),
    /// Run a host executable alone in an empty jail (static binaries only).
    Jail(jail::JailArgs),
}

/// Dispatches the parsed CLI command and returns the command's exit status.
///
/// # Errors
///
/// Returns an error if the image cannot be built or the command cannot be
/// launched.
pub fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.global.config();
    tracing::debug!(?config, "resolved configuration");
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Jail(args) => jail::execute(args, config),
    }
}

/// Routes Ctrl-C and termination signals to `engine` for the rest of the
/// process lifetime.
fn install_interrupt_handler(engine: &Engine) -> anyhow::Result<()> {
    let handle = engine.interrupt_handle();
    ctrlc::set_handler(move || handle.trigger()).context("cannot install the interrupt handler")
}

/// Splits `COMMAND [ARGS]...` into an execution request.
fn execution_request(words: &[String]) -> anyhow::Result<ExecutionRequest> {
    let (command, args) = words.split_first().context("no command given")?;
    Ok(ExecutionRequest::new(command.clone(), args.iter().cloned()))
}
