//! Image manifests.
//!
//! An image manifest declares, as plain data, what an image build baked into
//! the filesystem and which paths the entrypoint needs at container start.
//! It stands in for the image's built-in layer in the composed view.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use volsim_common::error::{VolsimError, VolsimResult};
use volsim_common::paths::{is_path_prefix, normalize_destination};

/// The image-built filesystem, declared as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    /// Image name.
    pub name: String,
    /// Entrypoint command, informational only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    /// File paths baked in at build time.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Paths the entrypoint requires to exist at container start.
    #[serde(default)]
    pub requires: Vec<PathBuf>,
}

impl ImageManifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entrypoint: Vec::new(),
            paths: Vec::new(),
            requires: Vec::new(),
        }
    }

    /// Add a baked file path.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Add a required-at-start path.
    #[must_use]
    pub fn with_requirement(mut self, path: impl Into<PathBuf>) -> Self {
        self.requires.push(path.into());
        self
    }

    /// Load a manifest from a JSON file and validate its paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// contains relative or otherwise unusable paths.
    pub fn load(path: &Path) -> VolsimResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| VolsimError::ImageManifest {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let manifest: Self = serde_json::from_str(&content)?;
        manifest.validated()
    }

    /// Save the manifest as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> VolsimResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Normalize and validate every declared path.
    ///
    /// # Errors
    ///
    /// Returns [`VolsimError::ImageManifest`] if any path is not a clean
    /// absolute container path.
    pub fn validated(mut self) -> VolsimResult<Self> {
        for list in [&mut self.paths, &mut self.requires] {
            for p in list.iter_mut() {
                *p = normalize_destination(&p.to_string_lossy()).map_err(|e| {
                    VolsimError::ImageManifest {
                        message: format!("image '{}': {e}", self.name),
                    }
                })?;
            }
        }
        Ok(self)
    }

    /// Whether the image layer has content at `path`.
    ///
    /// True for a baked file itself or any ancestor directory of one.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths
            .iter()
            .any(|file| file == path || is_path_prefix(path, file))
    }

    /// Baked files at or below `dir`, as remainders relative to `dir`.
    #[must_use]
    pub fn entries_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.paths
            .iter()
            .filter(|file| is_path_prefix(dir, file))
            .map(|file| file.strip_prefix(dir).unwrap_or(file).to_path_buf())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_image() -> ImageManifest {
        ImageManifest::new("node-app")
            .with_file("/app/server.js")
            .with_file("/app/node_modules/express/index.js")
            .with_requirement("/app/node_modules")
    }

    #[test]
    fn contains_files_and_ancestors() {
        let image = node_image();
        assert!(image.contains(Path::new("/app/server.js")));
        assert!(image.contains(Path::new("/app")));
        assert!(image.contains(Path::new("/app/node_modules")));
        assert!(!image.contains(Path::new("/app/missing.js")));
        assert!(!image.contains(Path::new("/data")));
    }

    #[test]
    fn entries_under_returns_remainders() {
        let image = node_image();
        let entries = image.entries_under(Path::new("/app/node_modules"));
        assert_eq!(entries, vec![PathBuf::from("express/index.js")]);
        assert!(image.entries_under(Path::new("/data")).is_empty());
    }

    #[test]
    fn load_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");

        node_image().save(&path).unwrap();
        let loaded = ImageManifest::load(&path).unwrap();
        assert_eq!(loaded.name, "node-app");
        assert_eq!(loaded.paths.len(), 2);
        assert_eq!(loaded.requires, vec![PathBuf::from("/app/node_modules")]);
    }

    #[test]
    fn load_rejects_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");
        fs::write(&path, r#"{"name": "bad", "paths": ["app/server.js"]}"#).unwrap();
        assert!(ImageManifest::load(&path).is_err());
    }
}
