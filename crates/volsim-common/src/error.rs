//! Common error types for the volsim sandbox.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`VolsimError`].
pub type VolsimResult<T> = Result<T, VolsimError>;

/// Common errors across the volsim crates.
#[derive(Error, Diagnostic, Debug)]
pub enum VolsimError {
    /// Mount spec string could not be parsed.
    #[error("Invalid mount spec '{spec}': {reason}")]
    #[diagnostic(
        code(volsim::mount::invalid_spec),
        help("Use NAME:PATH (named volume), /HOST/PATH:PATH (bind mount), or PATH (anonymous volume), optionally suffixed with :ro or :rw")
    )]
    InvalidMountSpec {
        /// The spec string as supplied.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Mount destination path is not usable.
    #[error("Invalid mount destination '{path}': {reason}")]
    #[diagnostic(
        code(volsim::mount::invalid_destination),
        help("Destinations must be absolute container paths other than '/', without '.' or '..' components")
    )]
    InvalidDestination {
        /// The offending destination path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two mounts target the identical destination path.
    #[error("Duplicate mount destination: {path}")]
    #[diagnostic(
        code(volsim::mount::duplicate_destination),
        help("Each mount must target a distinct container path; nested paths are fine, identical ones are not")
    )]
    DuplicateDestination {
        /// The destination claimed twice.
        path: String,
    },

    /// Named volume not found in the store.
    #[error("Volume not found: {name}")]
    #[diagnostic(code(volsim::volume::not_found))]
    VolumeNotFound {
        /// The volume name that was not found.
        name: String,
    },

    /// Named volume already exists in the store.
    #[error("Volume already exists: {name}")]
    #[diagnostic(code(volsim::volume::exists))]
    VolumeExists {
        /// The conflicting volume name.
        name: String,
    },

    /// Volume name does not match the accepted pattern.
    #[error("Invalid volume name: {name}")]
    #[diagnostic(
        code(volsim::volume::invalid_name),
        help("Volume names must start with an alphanumeric character and contain only [a-zA-Z0-9_.-]")
    )]
    InvalidVolumeName {
        /// The invalid volume name.
        name: String,
    },

    /// Image manifest could not be loaded or is inconsistent.
    #[error("Image manifest error: {message}")]
    #[diagnostic(code(volsim::image::manifest))]
    ImageManifest {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(volsim::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(volsim::serialization))]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(volsim::internal),
        help("This is a bug, please report it at https://github.com/volsim/volsim/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl From<serde_json::Error> for VolsimError {
    fn from(err: serde_json::Error) -> Self {
        VolsimError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VolsimError::DuplicateDestination {
            path: "/app/data".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate mount destination: /app/data");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VolsimError = io_err.into();
        assert!(matches!(err, VolsimError::Io(_)));
    }
}
