//! # corral
//!
//! Pulls an image from a Docker Registry v2 and runs a command in it under
//! `chroot` in a new PID namespace. Exits with the command's exit status.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use corral_common::constants::{
    BIN_NAME, DEFAULT_LOG_FILTER, EXIT_INTERNAL_FAILURE, EXIT_INTERRUPTED,
};
use corral_common::error::CorralError;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

#[allow(clippy::print_stderr)]
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::execute(cli) {
        Ok(code) => exit_status(code),
        Err(e) => {
            eprintln!("{BIN_NAME}: {e:#}");
            exit_status(failure_status(&e))
        }
    }
}

/// Converts a child's exit status into the process exit code.
fn exit_status(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

/// Picks the exit status for a run that ended in an error.
fn failure_status(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<CorralError>() {
        Some(CorralError::Interrupted) => EXIT_INTERRUPTED,
        _ => EXIT_INTERNAL_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn child_status_becomes_process_status() {
        assert_eq!(exit_status(0), ExitCode::SUCCESS);
        assert_eq!(exit_status(3), ExitCode::from(3));
        assert_eq!(exit_status(137), ExitCode::from(137));
    }

    #[test]
    fn out_of_range_status_is_failure() {
        assert_eq!(exit_status(256), ExitCode::FAILURE);
        assert_eq!(exit_status(-1), ExitCode::FAILURE);
    }

    #[test]
    fn interrupted_run_exits_like_a_shell() {
        let err = Err::<(), _>(CorralError::Interrupted)
            .context("cannot run 'sleep' in busybox")
            .expect_err("error");
        assert_eq!(failure_status(&err), 130);
    }

    #[test]
    fn other_failures_exit_with_one() {
        let err = anyhow::Error::from(CorralError::launch("exec failed"));
        assert_eq!(failure_status(&err), 1);
        assert_eq!(failure_status(&anyhow::anyhow!("no command given")), 1);
    }
}
