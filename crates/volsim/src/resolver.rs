//! Mount precedence resolution.
//!
//! Given the destination paths of a container's mounts, decides which mount
//! answers for any container path: the mount whose destination is the
//! longest per-component prefix of the path wins, regardless of the order
//! the mounts were declared in. Paths no mount covers fall through to the
//! image layer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use volsim_common::error::{VolsimError, VolsimResult};
use volsim_common::paths::{depth, is_path_prefix};

/// A precedence-resolved table of mount destinations.
///
/// Built once per container from its mount specs; identical destinations
/// are rejected at build time, so resolution is deterministic and
/// independent of declaration order.
#[derive(Debug, Clone)]
pub struct MountTable {
    /// (input index, destination), sorted deepest destination first.
    entries: Vec<(usize, PathBuf)>,
}

/// The mount that answers for a queried path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMatch {
    /// Index of the winning mount in the input order.
    pub index: usize,
    /// The winning mount's destination.
    pub destination: PathBuf,
    /// Path remainder below the mount destination (empty at the
    /// destination itself).
    pub below: PathBuf,
}

/// A shadowing relationship between two mounts.
///
/// The outer mount's content at and below the inner mount's destination is
/// hidden by the inner mount; nothing is deleted or merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shadow {
    /// Input index of the mount whose subtree is partially hidden.
    pub outer: usize,
    /// Input index of the more specific mount doing the hiding.
    pub inner: usize,
}

impl MountTable {
    /// Build a table from normalized mount destinations, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`VolsimError::DuplicateDestination`] if two destinations are
    /// identical after normalization.
    pub fn build<I>(destinations: I) -> VolsimResult<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (index, dest) in destinations.into_iter().enumerate() {
            if !seen.insert(dest.clone()) {
                return Err(VolsimError::DuplicateDestination {
                    path: dest.display().to_string(),
                });
            }
            entries.push((index, dest));
        }

        // Deepest first. Equal-depth destinations are distinct, so at most
        // one of them can prefix any given path; the ordering makes
        // resolution independent of declaration order.
        entries.sort_by(|(_, a), (_, b)| depth(b).cmp(&depth(a)));

        Ok(Self { entries })
    }

    /// Number of mounts in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no mounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve which mount answers for `path`.
    ///
    /// Returns `None` when no destination prefixes the path, meaning the
    /// image's built-in filesystem layer answers.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Option<MountMatch> {
        self.entries
            .iter()
            .find(|(_, dest)| is_path_prefix(dest, path))
            .map(|(index, dest)| MountMatch {
                index: *index,
                destination: dest.clone(),
                below: path.strip_prefix(dest).unwrap_or(Path::new("")).to_path_buf(),
            })
    }

    /// Report every pair of mounts whose destinations are in a strict
    /// prefix relationship.
    #[must_use]
    pub fn shadows(&self) -> Vec<Shadow> {
        let mut shadows = Vec::new();
        for (outer_idx, outer_dest) in &self.entries {
            for (inner_idx, inner_dest) in &self.entries {
                if outer_dest != inner_dest && is_path_prefix(outer_dest, inner_dest) {
                    shadows.push(Shadow {
                        outer: *outer_idx,
                        inner: *inner_idx,
                    });
                }
            }
        }
        shadows.sort_by_key(|s| (s.outer, s.inner));
        shadows
    }
}
