//! Composed container filesystem view.
//!
//! Overlays a container's active mounts onto the image manifest. Bind
//! mounts are consulted live on the host filesystem (two-way sync), volume
//! mounts read the store's data directories, and everything else falls
//! through to the image layer.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use volsim_common::error::VolsimResult;
use volsim_common::paths::is_path_prefix;

use crate::image::ImageManifest;
use crate::resolver::MountTable;
use crate::spec::MountKind;

/// The backing store behind an active mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// Host directory, read live.
    Bind {
        /// Absolute host path.
        host: PathBuf,
        /// Read-only mount.
        readonly: bool,
    },
    /// Store-managed volume data directory.
    Volume {
        /// Volume name.
        name: String,
        /// Data directory on disk.
        data: PathBuf,
        /// Whether the volume is anonymous.
        anonymous: bool,
    },
}

/// A mount materialized for a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMount {
    /// Normalized container destination.
    pub destination: PathBuf,
    /// What answers below the destination.
    pub backing: Backing,
    /// The `-v` form that produced this mount.
    pub kind: MountKind,
}

/// Which backing store answers for a queried path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin<'a> {
    /// The image's built-in filesystem layer.
    Image,
    /// One of the container's mounts.
    Mount {
        /// The winning mount.
        mount: &'a ActiveMount,
        /// Path remainder below the mount destination.
        below: PathBuf,
    },
}

impl fmt::Display for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image layer"),
            Self::Mount { mount, .. } => match &mount.backing {
                Backing::Bind { host, readonly } => {
                    write!(f, "bind mount {}", host.display())?;
                    if *readonly {
                        write!(f, " (ro)")?;
                    }
                    Ok(())
                }
                Backing::Volume {
                    name, anonymous, ..
                } => {
                    if *anonymous {
                        write!(f, "anonymous volume {}", short_name(name))
                    } else {
                        write!(f, "volume {name}")
                    }
                }
            },
        }
    }
}

/// Shortened volume name for display.
fn short_name(name: &str) -> &str {
    if name.len() <= 12 { name } else { &name[..12] }
}

/// The composed view a container sees, fixed at container-start time.
#[derive(Debug)]
pub struct ContainerView {
    image: ImageManifest,
    mounts: Vec<ActiveMount>,
    table: MountTable,
}

impl ContainerView {
    /// Compose a view from an image manifest and active mounts.
    ///
    /// # Errors
    ///
    /// Returns an error if two mounts target the identical destination.
    pub fn new(image: ImageManifest, mounts: Vec<ActiveMount>) -> VolsimResult<Self> {
        let table = MountTable::build(mounts.iter().map(|m| m.destination.clone()))?;
        Ok(Self {
            image,
            mounts,
            table,
        })
    }

    /// The image manifest backing this view.
    #[must_use]
    pub fn image(&self) -> &ImageManifest {
        &self.image
    }

    /// The active mounts, in declaration order.
    #[must_use]
    pub fn mounts(&self) -> &[ActiveMount] {
        &self.mounts
    }

    /// Which backing store answers for `path`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Origin<'_> {
        match self.table.resolve(path) {
            Some(hit) => Origin::Mount {
                mount: &self.mounts[hit.index],
                below: hit.below,
            },
            None => Origin::Image,
        }
    }

    /// Whether `path` exists in the composed view.
    ///
    /// Bind mounts consult the live host filesystem; volumes consult their
    /// data directories; everything else asks the image manifest.
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        match self.resolve(path) {
            Origin::Image => self.image.contains(path),
            Origin::Mount { mount, below } => match &mount.backing {
                Backing::Bind { host, .. } => host.join(&below).exists(),
                Backing::Volume { data, .. } => data.join(&below).exists(),
            },
        }
    }

    /// Effective entries at or below `dir`, as container-absolute paths.
    ///
    /// Candidates are gathered from every backing store whose subtree
    /// intersects `dir`, then filtered through precedence so a shadowed
    /// parent never contributes entries the shadowing mount hides.
    ///
    /// # Errors
    ///
    /// Returns an error if a backing directory cannot be walked.
    pub fn entries_under(&self, dir: &Path) -> VolsimResult<Vec<PathBuf>> {
        let mut candidates = BTreeSet::new();

        for file in self.image.entries_under(dir) {
            candidates.insert(dir.join(file));
        }

        for mount in &self.mounts {
            let backing_dir = match &mount.backing {
                Backing::Bind { host, .. } => host.clone(),
                Backing::Volume { data, .. } => data.clone(),
            };
            // Only subtrees that intersect the queried directory.
            let walk_root = if is_path_prefix(dir, &mount.destination) {
                backing_dir
            } else if is_path_prefix(&mount.destination, dir) {
                let below = dir.strip_prefix(&mount.destination).unwrap_or(Path::new(""));
                backing_dir.join(below)
            } else {
                continue;
            };
            if !walk_root.exists() {
                continue;
            }

            let container_root = if is_path_prefix(dir, &mount.destination) {
                mount.destination.clone()
            } else {
                dir.to_path_buf()
            };
            for entry in walkdir::WalkDir::new(&walk_root) {
                let entry = entry.map_err(|e| volsim_common::VolsimError::Internal {
                    message: format!("failed to walk {}: {e}", walk_root.display()),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&walk_root)
                    .unwrap_or(entry.path());
                candidates.insert(container_root.join(relative));
            }
        }

        // Precedence filter: keep only candidates the composed view serves.
        Ok(candidates
            .into_iter()
            .filter(|p| self.exists(p))
            .collect())
    }
}
