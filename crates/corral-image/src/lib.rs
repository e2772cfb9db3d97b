//! # corral-image
//!
//! Image acquisition for the corral runtime.
//!
//! Handles:
//! - **Registry**: the [`registry::Registry`] seam and its HTTP client for
//!   anonymous pull tokens, manifests, and blobs.
//! - **Hashing**: SHA-256 verification of downloaded blobs.
//! - **Storage**: the per-build staging area for layer archives.
//! - **Layers**: applying one gzip tar layer onto a root, whiteouts included.
//! - **Rootfs**: building a root filesystem from an image reference, one layer
//!   at a time in manifest order.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod auth;
pub mod blob;
pub mod hash;
pub mod layer;
pub mod manifest;
pub mod registry;
pub mod rootfs;
pub mod storage;
