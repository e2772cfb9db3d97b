//! # corral-core
//!
//! Low-level Linux isolation primitives for the corral runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: cloning a child into a fresh PID namespace and reaping it.
//! - **Filesystem**: `chroot(2)` jail entry and staging a host executable
//!   into an otherwise empty jail.
//!
//! The isolation boundary is deliberately narrow: only the filesystem root
//! and the PID space are separated from the host. There is no mount,
//! network, user, IPC, or UTS namespace, no capability dropping, and no
//! resource limit. A privileged process inside the jail can escape a
//! `chroot`; treat the boundary as a convenience, not a security guarantee.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod namespace;
