//! # volsim-common
//!
//! Shared utilities and types for the volsim mount sandbox.
//!
//! This crate provides common functionality used across the volsim crates:
//! - Destination path normalization and prefix logic
//! - Standard store paths
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod paths;

pub use error::{VolsimError, VolsimResult};
pub use paths::VolsimPaths;
