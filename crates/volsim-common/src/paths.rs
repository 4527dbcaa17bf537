//! Standard store paths and destination-path logic for volsim.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;

use crate::error::{VolsimError, VolsimResult};

/// Default root directory for volsim data.
pub static VOLSIM_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("VOLSIM_ROOT").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::data_local_dir()
            .map(|d| d.join("volsim"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/volsim"))
    })
});

/// Standard paths used by the volsim store.
#[derive(Debug, Clone)]
pub struct VolsimPaths {
    /// Root data directory.
    pub root: PathBuf,
}

impl VolsimPaths {
    /// Create paths with the default root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for volume storage.
    #[must_use]
    pub fn volumes(&self) -> PathBuf {
        self.root.join("volumes")
    }

    /// Directory for a specific volume.
    #[must_use]
    pub fn volume(&self, name: &str) -> PathBuf {
        self.volumes().join(name)
    }

    /// Data directory of a volume (what gets mounted).
    #[must_use]
    pub fn volume_data(&self, name: &str) -> PathBuf {
        self.volume(name).join("_data")
    }

    /// Metadata sidecar file of a volume.
    #[must_use]
    pub fn volume_metadata(&self, name: &str) -> PathBuf {
        self.volume(name).join("metadata.json")
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.volumes())?;
        Ok(())
    }
}

impl Default for VolsimPaths {
    fn default() -> Self {
        Self {
            root: VOLSIM_ROOT.clone(),
        }
    }
}

/// Normalize an absolute container path.
///
/// Repeated and trailing slashes collapse; `.` and `..` components are
/// rejected. `/` itself is a valid result here (use
/// [`normalize_destination`] for mount destinations, which reject it).
///
/// # Errors
///
/// Returns [`VolsimError::InvalidDestination`] if the path is relative or
/// contains dot components.
pub fn normalize_abs_path(raw: &str) -> VolsimResult<PathBuf> {
    if !raw.starts_with('/') {
        return Err(VolsimError::InvalidDestination {
            path: raw.to_string(),
            reason: "must be an absolute container path".to_string(),
        });
    }

    let mut normalized = PathBuf::from("/");
    for part in raw.split('/') {
        match part {
            "" => {}
            "." | ".." => {
                return Err(VolsimError::InvalidDestination {
                    path: raw.to_string(),
                    reason: format!("'{part}' components are not allowed"),
                });
            }
            other => normalized.push(other),
        }
    }

    Ok(normalized)
}

/// Normalize a mount destination path.
///
/// Same as [`normalize_abs_path`], but additionally rejects `/` as a
/// destination.
///
/// # Errors
///
/// Returns [`VolsimError::InvalidDestination`] if the path violates any of
/// the above.
pub fn normalize_destination(raw: &str) -> VolsimResult<PathBuf> {
    let normalized = normalize_abs_path(raw)?;

    if normalized == Path::new("/") {
        return Err(VolsimError::InvalidDestination {
            path: raw.to_string(),
            reason: "destination can't be '/'".to_string(),
        });
    }

    Ok(normalized)
}

/// Whether `ancestor` is a per-component prefix of `path`.
///
/// Both paths are expected to be normalized absolute paths. `/app` is a
/// prefix of `/app/node_modules` but not of `/application`.
#[must_use]
pub fn is_path_prefix(ancestor: &Path, path: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Number of components below the root.
#[must_use]
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_layout() {
        let paths = VolsimPaths::with_root("/tmp/volsim-test");
        assert_eq!(paths.volumes(), PathBuf::from("/tmp/volsim-test/volumes"));
        assert_eq!(
            paths.volume_data("web-data"),
            PathBuf::from("/tmp/volsim-test/volumes/web-data/_data")
        );
        assert_eq!(
            paths.volume_metadata("web-data"),
            PathBuf::from("/tmp/volsim-test/volumes/web-data/metadata.json")
        );
    }

    #[test]
    fn normalize_collapses_slashes() {
        assert_eq!(
            normalize_destination("/app//node_modules/").unwrap(),
            PathBuf::from("/app/node_modules")
        );
    }

    #[test]
    fn normalize_rejects_relative() {
        assert!(normalize_destination("app/data").is_err());
        assert!(normalize_destination("").is_err());
    }

    #[test]
    fn abs_path_allows_root() {
        assert_eq!(normalize_abs_path("/").unwrap(), PathBuf::from("/"));
        assert!(normalize_abs_path("relative").is_err());
    }

    #[test]
    fn normalize_rejects_root_and_dots() {
        assert!(normalize_destination("/").is_err());
        assert!(normalize_destination("//").is_err());
        assert!(normalize_destination("/app/./data").is_err());
        assert!(normalize_destination("/app/../etc").is_err());
    }

    #[test]
    fn prefix_is_per_component() {
        assert!(is_path_prefix(
            Path::new("/app"),
            Path::new("/app/node_modules")
        ));
        assert!(is_path_prefix(Path::new("/app"), Path::new("/app")));
        assert!(!is_path_prefix(
            Path::new("/app"),
            Path::new("/application")
        ));
    }

    #[test]
    fn depth_counts_components() {
        assert_eq!(depth(Path::new("/")), 0);
        assert_eq!(depth(Path::new("/app")), 1);
        assert_eq!(depth(Path::new("/app/node_modules")), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn segment() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_.-]{0,8}"
        }

        proptest! {
            #[test]
            fn normalization_is_idempotent(segs in prop::collection::vec(segment(), 1..6)) {
                let raw = format!("/{}", segs.join("/"));
                let once = normalize_destination(&raw).unwrap();
                let twice = normalize_destination(&once.to_string_lossy()).unwrap();
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn extra_slashes_never_change_the_result(segs in prop::collection::vec(segment(), 1..6)) {
                let clean = format!("/{}", segs.join("/"));
                let messy = format!("//{}//", segs.join("//"));
                prop_assert_eq!(
                    normalize_destination(&clean).unwrap(),
                    normalize_destination(&messy).unwrap()
                );
            }
        }
    }
}
