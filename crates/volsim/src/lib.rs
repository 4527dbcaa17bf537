//! # volsim
//!
//! A sandbox for reasoning about container volume-mount precedence.
//!
//! `volsim` parses `docker run -v` style mount specs, resolves which backing
//! store answers for any container path (longest destination prefix wins),
//! materializes named and anonymous volumes in a local store, and simulates
//! container start against an image manifest so mount-shadowing failures can
//! be reproduced and diagnosed without a container runtime.
//!
//! No real `mount(2)` calls are made; bind mounts read the live host
//! filesystem, volumes live under the store root as plain directories.

#![warn(missing_docs)]

pub mod cli;
pub mod image;
pub mod launch;
pub mod resolver;
pub mod spec;
pub mod view;
pub mod volume;

pub use image::ImageManifest;
pub use launch::{Launch, LaunchOptions, RequirementCheck, StartReport};
pub use resolver::{MountMatch, MountTable, Shadow};
pub use spec::{MountKind, MountSpec};
pub use view::{ActiveMount, Backing, ContainerView, Origin};
pub use volume::{Volume, VolumeStore};
