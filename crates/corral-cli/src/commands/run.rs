//! `corral run`: pull an image and run a command inside it.

use anyhow::Context;
use clap::Args;
use corral_common::config::CorralConfig;
use corral_runtime::engine::Engine;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference: `name`, `name:tag` or `name@sha256:<hex>`.
    pub image: String,

    /// Command to execute inside the image, followed by its arguments.
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Executes the `run` command and returns the command's exit status.
///
/// # Errors
///
/// Returns an error if the image cannot be pulled or the command cannot be
/// launched.
pub fn execute(args: RunArgs, config: CorralConfig) -> anyhow::Result<i32> {
    let request = super::execution_request(&args.command)?;
    let engine = Engine::new(config);
    super::install_interrupt_handler(&engine)?;
    engine
        .run_image(&args.image, &request)
        .with_context(|| format!("cannot run '{}' in {}", request.command, args.image))
}
