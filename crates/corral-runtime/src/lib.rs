//! Run lifecycle for corral.
//!
//! Owns the per-run ephemeral root, the run state machine, launching the
//! command in a PID namespace under `chroot`, interrupt delivery, and the
//! [`engine::Engine`] that ties image building and launching together.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod process;
pub mod signal;
pub mod state;
