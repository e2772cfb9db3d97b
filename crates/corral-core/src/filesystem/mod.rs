//! Filesystem management for the jail.
//!
//! Provides `chroot(2)` entry for the launched child and staging of a host
//! executable into an empty root.

pub mod chroot;
pub mod stage;
