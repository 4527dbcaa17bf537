//! Container start simulation.
//!
//! Materializes a container's mounts against the volume store, composes the
//! filesystem view, and checks the image's start requirements against it —
//! reproducing, offline, the classic failure where a bind mount over `/app`
//! shadows the image-built `node_modules`.

use std::path::{Path, PathBuf};

use volsim_common::error::VolsimResult;

use crate::image::ImageManifest;
use crate::spec::{MountKind, MountSpec};
use crate::view::{ActiveMount, Backing, ContainerView, Origin};
use crate::volume::VolumeStore;

/// Options for a simulated launch.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Container name; generated when absent.
    pub name: Option<String>,
    /// Remove the container's anonymous volumes after the run (`--rm`).
    pub remove: bool,
}

/// Outcome of checking one required path against the composed view.
#[derive(Debug, Clone)]
pub struct RequirementCheck {
    /// The required container path.
    pub path: PathBuf,
    /// Human-readable description of the backing store that answered.
    pub origin: String,
    /// Whether the path exists in the composed view.
    pub satisfied: bool,
    /// Remediation hint when the requirement is missing.
    pub hint: Option<String>,
}

/// Start report for a simulated container.
#[derive(Debug, Clone)]
pub struct StartReport {
    /// Whether every requirement was satisfied.
    pub started: bool,
    /// Per-requirement results, in manifest order.
    pub checks: Vec<RequirementCheck>,
}

/// A simulated container launch.
#[derive(Debug)]
pub struct Launch {
    /// Container name.
    pub container: String,
    /// The composed filesystem view.
    pub view: ContainerView,
    /// The start report.
    pub report: StartReport,
    /// Anonymous volumes created for this launch.
    anonymous_created: Vec<String>,
    remove: bool,
}

impl Launch {
    /// Simulate `run` for an image with the given mount specs.
    ///
    /// Named volumes are looked up or created in the store; anonymous
    /// volumes are always created. Empty volumes are seeded from the image
    /// content under their destination before first use.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate destinations or store failures.
    pub fn run(
        image: ImageManifest,
        specs: &[MountSpec],
        store: &mut VolumeStore,
        options: LaunchOptions,
    ) -> VolsimResult<Self> {
        let container = options
            .name
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..12].to_string());

        tracing::info!(
            container = %container,
            image = %image.name,
            mounts = specs.len(),
            "Simulating container start"
        );

        // Validate destinations before materializing any volume.
        let _ = crate::resolver::MountTable::build(
            specs.iter().map(|s| s.destination.clone()),
        )?;

        let mut mounts = Vec::with_capacity(specs.len());
        let mut anonymous_created = Vec::new();
        for spec in specs {
            let backing = match spec.kind {
                MountKind::Bind => Backing::Bind {
                    host: spec.host_path().unwrap_or_default(),
                    readonly: spec.readonly,
                },
                MountKind::Volume => {
                    let name = spec.volume_name().unwrap_or_default();
                    let volume = store.get_or_create(name)?;
                    store.seed_from_image(&volume, &image, &spec.destination)?;
                    Backing::Volume {
                        name: volume.name,
                        data: volume.data,
                        anonymous: false,
                    }
                }
                MountKind::Anonymous => {
                    let volume = store.create_anonymous()?;
                    store.seed_from_image(&volume, &image, &spec.destination)?;
                    anonymous_created.push(volume.name.clone());
                    Backing::Volume {
                        name: volume.name,
                        data: volume.data,
                        anonymous: true,
                    }
                }
            };
            mounts.push(ActiveMount {
                destination: spec.destination.clone(),
                backing,
                kind: spec.kind,
            });
        }

        let view = ContainerView::new(image, mounts)?;
        let report = check_requirements(&view);

        if report.started {
            tracing::info!(container = %container, "Container started");
        } else {
            let missing: Vec<&str> = report
                .checks
                .iter()
                .filter(|c| !c.satisfied)
                .map(|c| c.path.to_str().unwrap_or("?"))
                .collect();
            tracing::warn!(container = %container, ?missing, "Container failed to start");
        }

        Ok(Self {
            container,
            view,
            report,
            anonymous_created,
            remove: options.remove,
        })
    }

    /// Anonymous volume names created for this launch.
    #[must_use]
    pub fn anonymous_volumes(&self) -> &[String] {
        &self.anonymous_created
    }

    /// Simulate container removal.
    ///
    /// With `--rm`, the launch's anonymous volumes go with the container;
    /// named volumes always survive.
    ///
    /// # Errors
    ///
    /// Returns an error if a volume cannot be removed from the store.
    pub fn finish(self, store: &mut VolumeStore) -> VolsimResult<()> {
        if self.remove {
            for name in &self.anonymous_created {
                store.remove(name, true)?;
            }
            tracing::debug!(
                container = %self.container,
                removed = self.anonymous_created.len(),
                "Removed container and its anonymous volumes"
            );
        }
        Ok(())
    }
}

/// Check every required path of the image against the composed view.
fn check_requirements(view: &ContainerView) -> StartReport {
    let mut checks = Vec::new();
    for required in &view.image().requires {
        let origin = view.resolve(required);
        let satisfied = view.exists(required);
        let hint = if satisfied {
            None
        } else {
            Some(remediation_hint(view, &origin, required))
        };
        checks.push(RequirementCheck {
            path: required.clone(),
            origin: origin.to_string(),
            satisfied,
            hint,
        });
    }
    let started = checks.iter().all(|c| c.satisfied);
    StartReport { started, checks }
}

/// Suggest a fix for a missing requirement.
fn remediation_hint(view: &ContainerView, origin: &Origin<'_>, required: &Path) -> String {
    match origin {
        Origin::Mount { mount, .. } => match &mount.backing {
            Backing::Bind { host, .. } => {
                if view.image().contains(required) {
                    format!(
                        "bind mount {} shadows the image-built content at {}; \
                         add '-v {}' so an anonymous volume protects it",
                        host.display(),
                        required.display(),
                        required.display()
                    )
                } else {
                    format!(
                        "host path {} has no content for {} and the image provides none",
                        host.display(),
                        required.display()
                    )
                }
            }
            Backing::Volume { name, .. } => format!(
                "volume {name} is empty and the image has no content under {} to seed it with",
                required.display()
            ),
        },
        Origin::Image => format!(
            "the image does not provide {} and no mount covers it",
            required.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volsim_common::paths::VolsimPaths;

    fn node_image() -> ImageManifest {
        ImageManifest::new("node-app")
            .with_file("/app/server.js")
            .with_file("/app/node_modules/express/index.js")
            .with_requirement("/app/node_modules")
    }

    fn store_in(temp: &tempfile::TempDir) -> VolumeStore {
        VolumeStore::open(VolsimPaths::with_root(temp.path())).unwrap()
    }

    #[test]
    fn no_mounts_starts_from_image_content() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = store_in(&temp);

        let launch =
            Launch::run(node_image(), &[], &mut store, LaunchOptions::default()).unwrap();
        assert!(launch.report.started);
    }

    #[test]
    fn bare_bind_mount_loses_built_dependencies() {
        let temp = tempfile::tempdir().unwrap();
        let host = tempfile::tempdir().unwrap();
        std::fs::write(host.path().join("server.js"), "x").unwrap();
        let mut store = store_in(&temp);

        let specs = vec![
            MountSpec::parse(&format!("{}:/app", host.path().display())).unwrap(),
        ];
        let launch =
            Launch::run(node_image(), &specs, &mut store, LaunchOptions::default()).unwrap();

        assert!(!launch.report.started);
        let check = &launch.report.checks[0];
        assert!(!check.satisfied);
        assert!(check.hint.as_deref().unwrap().contains("-v /app/node_modules"));
    }

    #[test]
    fn anonymous_volume_mount_protects_built_dependencies() {
        let temp = tempfile::tempdir().unwrap();
        let host = tempfile::tempdir().unwrap();
        std::fs::write(host.path().join("server.js"), "x").unwrap();
        let mut store = store_in(&temp);

        let specs = vec![
            MountSpec::parse(&format!("{}:/app", host.path().display())).unwrap(),
            MountSpec::parse("/app/node_modules").unwrap(),
        ];
        let launch =
            Launch::run(node_image(), &specs, &mut store, LaunchOptions::default()).unwrap();

        assert!(launch.report.started);
        assert_eq!(launch.anonymous_volumes().len(), 1);
        assert!(
            launch
                .view
                .exists(std::path::Path::new("/app/node_modules/express/index.js"))
        );
    }

    #[test]
    fn finish_with_rm_drops_anonymous_volumes_only() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = store_in(&temp);

        let specs = vec![
            MountSpec::parse("pgdata:/var/lib/postgresql/data").unwrap(),
            MountSpec::parse("/app/node_modules").unwrap(),
        ];
        let image = ImageManifest::new("db");
        let launch = Launch::run(
            image,
            &specs,
            &mut store,
            LaunchOptions {
                name: Some("db-1".to_string()),
                remove: true,
            },
        )
        .unwrap();

        let anon = launch.anonymous_volumes()[0].clone();
        launch.finish(&mut store).unwrap();
        assert!(store.get(&anon).is_none());
        assert!(store.get("pgdata").is_some());
    }

    #[test]
    fn missing_image_requirement_without_mounts() {
        let temp = tempfile::tempdir().unwrap();
        let mut store = store_in(&temp);

        let image = ImageManifest::new("empty").with_requirement("/app/node_modules");
        let launch =
            Launch::run(image, &[], &mut store, LaunchOptions::default()).unwrap();
        assert!(!launch.report.started);
        assert!(
            launch.report.checks[0]
                .hint
                .as_deref()
                .unwrap()
                .contains("does not provide")
        );
    }
}
