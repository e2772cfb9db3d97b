//! `corral jail`: run a host executable alone in an empty jail.

use anyhow::Context;
use clap::Args;
use corral_common::config::CorralConfig;
use corral_runtime::engine::Engine;

/// Arguments for the `jail` command.
#[derive(Args, Debug)]
pub struct JailArgs {
    /// Host executable to copy into the jail, followed by its arguments.
    ///
    /// Shared libraries are not copied, so only statically linked programs
    /// can start.
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

/// Executes the `jail` command and returns the command's exit status.
///
/// # Errors
///
/// Returns an error if the executable cannot be staged or launched.
pub fn execute(args: JailArgs, config: CorralConfig) -> anyhow::Result<i32> {
    let request = super::execution_request(&args.command)?;
    let engine = Engine::new(config);
    super::install_interrupt_handler(&engine)?;
    engine
        .run_bare(&request)
        .with_context(|| format!("cannot run '{}' in an empty jail", request.command))
}
