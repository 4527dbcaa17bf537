//! Volume store.
//!
//! Named and anonymous volumes are materialized as directories under the
//! store root so their lifecycle is observable: named volumes survive
//! container removal unless pruned, anonymous volumes are removed with
//! their container.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use volsim_common::error::{VolsimError, VolsimResult};
use volsim_common::paths::VolsimPaths;

use crate::image::ImageManifest;

static VOLUME_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap());

/// Whether a string is an acceptable volume name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    VOLUME_NAME_RE.is_match(name)
}

/// Store for named and anonymous volumes.
pub struct VolumeStore {
    paths: VolsimPaths,
    /// Cached volume metadata, keyed by name.
    volumes: HashMap<String, Volume>,
}

/// A volume managed by the store.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Volume name (generated hex for anonymous volumes).
    pub name: String,
    /// Whether the volume was created without a user-assigned name.
    pub anonymous: bool,
    /// Volume labels.
    pub labels: HashMap<String, String>,
    /// Creation timestamp.
    pub created: chrono::DateTime<chrono::Utc>,
    /// Data directory (what gets mounted).
    pub data: PathBuf,
}

impl VolumeStore {
    /// Open a store rooted at the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directories cannot be created or
    /// existing metadata cannot be read.
    pub fn open_default() -> VolsimResult<Self> {
        Self::open(VolsimPaths::new())
    }

    /// Open a store at the given paths, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directories cannot be created or
    /// existing metadata cannot be read.
    pub fn open(paths: VolsimPaths) -> VolsimResult<Self> {
        paths.create_dirs()?;
        let mut store = Self {
            paths,
            volumes: HashMap::new(),
        };
        store.load_volumes()?;
        Ok(store)
    }

    /// Create a new named volume.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or already taken.
    pub fn create(
        &mut self,
        name: &str,
        labels: HashMap<String, String>,
    ) -> VolsimResult<Volume> {
        if !is_valid_name(name) {
            return Err(VolsimError::InvalidVolumeName {
                name: name.to_string(),
            });
        }
        if self.volumes.contains_key(name) {
            return Err(VolsimError::VolumeExists {
                name: name.to_string(),
            });
        }
        self.materialize(name, false, labels)
    }

    /// Create an anonymous volume with a generated name.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume directories cannot be created.
    pub fn create_anonymous(&mut self) -> VolsimResult<Volume> {
        let name = uuid::Uuid::new_v4().simple().to_string();
        self.materialize(&name, true, HashMap::new())
    }

    /// Get an existing volume by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Volume> {
        self.volumes.get(name)
    }

    /// Get a named volume, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or creation fails.
    pub fn get_or_create(&mut self, name: &str) -> VolsimResult<Volume> {
        if let Some(vol) = self.volumes.get(name) {
            return Ok(vol.clone());
        }
        self.create(name, HashMap::new())
    }

    /// List all volumes, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<&Volume> {
        let mut volumes: Vec<&Volume> = self.volumes.values().collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        volumes
    }

    /// Remove a volume.
    ///
    /// With `force`, removing a missing volume is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`VolsimError::VolumeNotFound`] if the volume does not exist
    /// and `force` is false, or if deletion fails.
    pub fn remove(&mut self, name: &str, force: bool) -> VolsimResult<()> {
        let Some(volume) = self.volumes.remove(name) else {
            if force {
                return Ok(());
            }
            return Err(VolsimError::VolumeNotFound {
                name: name.to_string(),
            });
        };

        let dir = self.paths.volume(&volume.name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }

        tracing::info!(name, "Volume removed");
        Ok(())
    }

    /// Remove all anonymous volumes, returning their names.
    ///
    /// Named volumes survive pruning; only runtime-generated ones go.
    ///
    /// # Errors
    ///
    /// Returns an error if a volume directory cannot be deleted.
    pub fn prune(&mut self) -> VolsimResult<Vec<String>> {
        let doomed: Vec<String> = self
            .volumes
            .values()
            .filter(|v| v.anonymous)
            .map(|v| v.name.clone())
            .collect();

        for name in &doomed {
            self.remove(name, true)?;
        }

        tracing::info!(count = doomed.len(), "Pruned anonymous volumes");
        Ok(doomed)
    }

    /// Seed an empty volume from the image content under its destination.
    ///
    /// This models the runtime's copy-on-first-use: a volume mounted over a
    /// directory the image populated captures that content, so its
    /// precedence protects it from a parent bind mount. Volumes that
    /// already hold data are left alone; bind mounts are never seeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed files cannot be created.
    pub fn seed_from_image(
        &self,
        volume: &Volume,
        image: &ImageManifest,
        destination: &Path,
    ) -> VolsimResult<bool> {
        if !dir_is_empty(&volume.data)? {
            return Ok(false);
        }

        let entries = image.entries_under(destination);
        if entries.is_empty() {
            return Ok(false);
        }

        for entry in &entries {
            let target = volume.data.join(entry);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, b"")?;
        }

        tracing::debug!(
            volume = %volume.name,
            destination = %destination.display(),
            entries = entries.len(),
            "Seeded volume from image content"
        );
        Ok(true)
    }

    /// Create the on-disk layout and metadata for a volume.
    fn materialize(
        &mut self,
        name: &str,
        anonymous: bool,
        labels: HashMap<String, String>,
    ) -> VolsimResult<Volume> {
        let data = self.paths.volume_data(name);
        fs::create_dir_all(&data)?;

        let volume = Volume {
            name: name.to_string(),
            anonymous,
            labels,
            created: chrono::Utc::now(),
            data,
        };

        let metadata = serde_json::to_string_pretty(&VolumeMetadata::from(&volume))?;
        fs::write(self.paths.volume_metadata(name), metadata)?;

        self.volumes.insert(name.to_string(), volume.clone());

        tracing::info!(name, anonymous, "Volume created");
        Ok(volume)
    }

    /// Load existing volumes from disk.
    fn load_volumes(&mut self) -> VolsimResult<()> {
        let volumes_dir = self.paths.volumes();
        if !volumes_dir.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(&volumes_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            let metadata_path = self.paths.volume_metadata(&name);
            if !metadata_path.exists() {
                continue;
            }

            let content = fs::read_to_string(&metadata_path)?;
            let metadata: VolumeMetadata = serde_json::from_str(&content)?;

            self.volumes.insert(
                metadata.name.clone(),
                Volume {
                    name: metadata.name,
                    anonymous: metadata.anonymous,
                    labels: metadata.labels,
                    created: metadata.created,
                    data: self.paths.volume_data(&name),
                },
            );
        }

        tracing::debug!(count = self.volumes.len(), "Loaded existing volumes");
        Ok(())
    }
}

/// Whether a directory exists and has no entries.
fn dir_is_empty(dir: &Path) -> VolsimResult<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Volume metadata for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct VolumeMetadata {
    name: String,
    anonymous: bool,
    labels: HashMap<String, String>,
    created: chrono::DateTime<chrono::Utc>,
}

impl From<&Volume> for VolumeMetadata {
    fn from(vol: &Volume) -> Self {
        Self {
            name: vol.name.clone(),
            anonymous: vol.anonymous,
            labels: vol.labels.clone(),
            created: vol.created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, VolumeStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = VolumeStore::open(VolsimPaths::with_root(temp.path())).unwrap();
        (temp, store)
    }

    #[test]
    fn create_and_get() {
        let (_temp, mut store) = test_store();
        let vol = store.create("pgdata", HashMap::new()).unwrap();
        assert!(!vol.anonymous);
        assert!(vol.data.is_dir());
        assert!(store.get("pgdata").is_some());
        assert!(matches!(
            store.create("pgdata", HashMap::new()),
            Err(VolsimError::VolumeExists { .. })
        ));
    }

    #[test]
    fn anonymous_volumes_get_hex_names() {
        let (_temp, mut store) = test_store();
        let vol = store.create_anonymous().unwrap();
        assert!(vol.anonymous);
        assert_eq!(vol.name.len(), 32);
        assert!(vol.name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn store_reloads_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        {
            let mut store = VolumeStore::open(VolsimPaths::with_root(temp.path())).unwrap();
            store.create("kept", HashMap::new()).unwrap();
        }
        let store = VolumeStore::open(VolsimPaths::with_root(temp.path())).unwrap();
        assert!(store.get("kept").is_some());
    }

    #[test]
    fn remove_and_force() {
        let (_temp, mut store) = test_store();
        store.create("gone", HashMap::new()).unwrap();
        store.remove("gone", false).unwrap();
        assert!(store.get("gone").is_none());
        assert!(store.remove("gone", false).is_err());
        store.remove("gone", true).unwrap();
    }

    #[test]
    fn prune_removes_only_anonymous() {
        let (_temp, mut store) = test_store();
        store.create("named", HashMap::new()).unwrap();
        let anon = store.create_anonymous().unwrap();

        let pruned = store.prune().unwrap();
        assert_eq!(pruned, vec![anon.name]);
        assert!(store.get("named").is_some());
    }

    #[test]
    fn seeding_copies_image_entries_once() {
        let (_temp, mut store) = test_store();
        let image = ImageManifest::new("node-app")
            .with_file("/app/node_modules/express/index.js")
            .with_file("/app/node_modules/.bin/tsc");
        let vol = store.create_anonymous().unwrap();

        let seeded = store
            .seed_from_image(&vol, &image, Path::new("/app/node_modules"))
            .unwrap();
        assert!(seeded);
        assert!(vol.data.join("express/index.js").exists());
        assert!(vol.data.join(".bin/tsc").exists());

        // Non-empty volumes keep their content.
        let seeded = store
            .seed_from_image(&vol, &image, Path::new("/app/node_modules"))
            .unwrap();
        assert!(!seeded);
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("pgdata"));
        assert!(is_valid_name("a.b-c_d"));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("has space"));
    }
}
