//! Linux namespace management for process isolation.
//!
//! Only the PID namespace is used: the launched command becomes PID 1 of
//! its own process-numbering space while sharing every other namespace
//! with the host.

pub mod pid;
