//! Mount spec parsing.
//!
//! Implements the three `-v` forms accepted at container creation:
//!
//! - `name:path` — named volume
//! - `/abs/host/path:path` — bind mount
//! - `path` — anonymous volume
//!
//! An optional trailing `:ro` / `:rw` mode segment is accepted on the
//! two-segment forms.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use volsim_common::error::{VolsimError, VolsimResult};
use volsim_common::paths::normalize_destination;

use crate::volume;

/// The kind of backing store a mount spec requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Host directory mapped into the container, live in both directions.
    Bind,
    /// Named volume managed by the store, survives container removal.
    Volume,
    /// Store-managed volume with a generated name, removed with the container.
    Anonymous,
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => write!(f, "bind"),
            Self::Volume => write!(f, "volume"),
            Self::Anonymous => write!(f, "anonymous"),
        }
    }
}

/// A parsed mount specification.
///
/// Supplied at container-creation time and fixed for the container's
/// lifetime. The destination is normalized (absolute, no repeated slashes,
/// no dot components).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Backing store kind.
    pub kind: MountKind,
    /// Volume name or absolute host path; `None` for anonymous volumes.
    pub source: Option<String>,
    /// Normalized container destination path.
    pub destination: PathBuf,
    /// Read-only mount.
    pub readonly: bool,
}

impl MountSpec {
    /// Parse a `-v` style mount spec string.
    ///
    /// # Errors
    ///
    /// Returns [`VolsimError::InvalidMountSpec`] for malformed input,
    /// [`VolsimError::InvalidDestination`] for unusable destinations, and
    /// [`VolsimError::InvalidVolumeName`] for bad volume names.
    pub fn parse(spec: &str) -> VolsimResult<Self> {
        if spec.is_empty() {
            return Err(VolsimError::InvalidMountSpec {
                spec: spec.to_string(),
                reason: "empty spec".to_string(),
            });
        }

        let parts: Vec<&str> = spec.split(':').collect();
        let (source, destination, mode) = match parts.as_slice() {
            [dest] => (None, *dest, None),
            [source, dest] => (Some(*source), *dest, None),
            [source, dest, mode] => (Some(*source), *dest, Some(*mode)),
            _ => {
                return Err(VolsimError::InvalidMountSpec {
                    spec: spec.to_string(),
                    reason: "too many ':' separated segments".to_string(),
                });
            }
        };

        let readonly = match mode {
            Some(mode) => parse_mode(spec, mode)?,
            None => false,
        };

        let destination = normalize_destination(destination)?;

        let (kind, source) = match source {
            None => (MountKind::Anonymous, None),
            Some("") => {
                return Err(VolsimError::InvalidMountSpec {
                    spec: spec.to_string(),
                    reason: "empty mount source".to_string(),
                });
            }
            Some(src) if src.starts_with('/') => (MountKind::Bind, Some(src.to_string())),
            Some(src) if src.contains('/') || src.starts_with('.') || src.starts_with('~') => {
                return Err(VolsimError::InvalidMountSpec {
                    spec: spec.to_string(),
                    reason: "bind mount source must be an absolute host path".to_string(),
                });
            }
            Some(src) => {
                if !volume::is_valid_name(src) {
                    return Err(VolsimError::InvalidVolumeName {
                        name: src.to_string(),
                    });
                }
                (MountKind::Volume, Some(src.to_string()))
            }
        };

        Ok(Self {
            kind,
            source,
            destination,
            readonly,
        })
    }

    /// The host path behind a bind mount, if this is one.
    #[must_use]
    pub fn host_path(&self) -> Option<PathBuf> {
        match self.kind {
            MountKind::Bind => self.source.as_deref().map(PathBuf::from),
            _ => None,
        }
    }

    /// The volume name behind a named-volume mount, if this is one.
    #[must_use]
    pub fn volume_name(&self) -> Option<&str> {
        match self.kind {
            MountKind::Volume => self.source.as_deref(),
            _ => None,
        }
    }

    /// Destination as a borrowed path.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Parse a trailing mode segment (`ro`, `rw`, or a comma list of them).
fn parse_mode(spec: &str, mode: &str) -> VolsimResult<bool> {
    let mut readonly: Option<bool> = None;
    for flag in mode.split(',') {
        let value = match flag {
            "ro" => true,
            "rw" => false,
            other => {
                return Err(VolsimError::InvalidMountSpec {
                    spec: spec.to_string(),
                    reason: format!("unknown mode flag '{other}'"),
                });
            }
        };
        if readonly.is_some_and(|prev| prev != value) {
            return Err(VolsimError::InvalidMountSpec {
                spec: spec.to_string(),
                reason: "conflicting 'ro' and 'rw' mode flags".to_string(),
            });
        }
        readonly = Some(value);
    }
    Ok(readonly.unwrap_or(false))
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}:{}", source, self.destination.display())?,
            None => write!(f, "{}", self.destination.display())?,
        }
        if self.readonly {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

impl FromStr for MountSpec {
    type Err = VolsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_volume_form() {
        let spec = MountSpec::parse("pgdata:/var/lib/postgresql/data").unwrap();
        assert_eq!(spec.kind, MountKind::Volume);
        assert_eq!(spec.volume_name(), Some("pgdata"));
        assert_eq!(spec.destination, PathBuf::from("/var/lib/postgresql/data"));
        assert!(!spec.readonly);
    }

    #[test]
    fn bind_mount_form() {
        let spec = MountSpec::parse("/home/dev/app:/app").unwrap();
        assert_eq!(spec.kind, MountKind::Bind);
        assert_eq!(spec.host_path(), Some(PathBuf::from("/home/dev/app")));
        assert_eq!(spec.destination, PathBuf::from("/app"));
    }

    #[test]
    fn anonymous_volume_form() {
        let spec = MountSpec::parse("/app/node_modules").unwrap();
        assert_eq!(spec.kind, MountKind::Anonymous);
        assert_eq!(spec.source, None);
        assert_eq!(spec.destination, PathBuf::from("/app/node_modules"));
    }

    #[test]
    fn readonly_mode() {
        let spec = MountSpec::parse("/etc/config:/config:ro").unwrap();
        assert!(spec.readonly);
        let spec = MountSpec::parse("cache:/cache:rw").unwrap();
        assert!(!spec.readonly);
    }

    #[test]
    fn conflicting_modes_rejected() {
        assert!(MountSpec::parse("cache:/cache:ro,rw").is_err());
        assert!(MountSpec::parse("cache:/cache:rslave").is_err());
    }

    #[test]
    fn relative_sources_rejected() {
        assert!(MountSpec::parse("./app:/app").is_err());
        assert!(MountSpec::parse("~/app:/app").is_err());
        assert!(MountSpec::parse("a/b:/app").is_err());
        assert!(MountSpec::parse(":/app").is_err());
    }

    #[test]
    fn bad_destinations_rejected() {
        assert!(MountSpec::parse("data:relative").is_err());
        assert!(MountSpec::parse("data:/").is_err());
        assert!(MountSpec::parse("node_modules").is_err());
        assert!(MountSpec::parse("").is_err());
    }

    #[test]
    fn bad_volume_names_rejected() {
        assert!(MountSpec::parse("-data:/app").is_err());
        assert!(MountSpec::parse("da ta:/app").is_err());
    }

    #[test]
    fn destination_is_normalized() {
        let spec = MountSpec::parse("data://app//cache/").unwrap();
        assert_eq!(spec.destination, PathBuf::from("/app/cache"));
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "pgdata:/var/lib/postgresql/data",
            "/home/dev/app:/app",
            "/app/node_modules",
            "/etc/config:/config:ro",
        ] {
            let spec = MountSpec::parse(raw).unwrap();
            assert_eq!(MountSpec::parse(&spec.to_string()).unwrap(), spec);
        }
    }
}
