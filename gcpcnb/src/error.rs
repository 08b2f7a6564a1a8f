use crate::config::ConfigError;
use crate::layer::LayerError;
use crate::plan::PlanError;
use crate::registry::RegistryError;
use crate::toml_file::TomlFileError;
use gcpcnb_data::buildpack::{BuildpackId, BuildpackIdError};
use gcpcnb_data::launch::ProcessTypeError;
use gcpcnb_data::layer::{LayerName, LayerNameError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A specialized Result type for gcpcnb.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that occurred while dispatching or running a buildpack phase.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Usage: runner -buildpack <id> [args...]")]
    MissingBuildpackId,

    #[error("Unknown buildpack ID: {id}\nRegistered buildpacks are:\n  {}", join_ids(.registered))]
    UnknownBuildpackId {
        id: String,
        registered: Vec<BuildpackId>,
    },

    #[error("Invalid phase {0:?}, expected 'detect' or 'build'")]
    InvalidPhase(String),

    #[error("Usage: {0}")]
    Usage(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("buildpack.toml declares ID {declared}, but the runner was invoked as {requested}")]
    BuildpackIdMismatch {
        declared: BuildpackId,
        requested: BuildpackId,
    },

    #[error("Invalid buildpack ID: {0}")]
    BuildpackIdError(#[from] BuildpackIdError),

    #[error("Invalid layer name: {0}")]
    LayerNameError(#[from] LayerNameError),

    #[error("Invalid process type: {0}")]
    ProcessTypeError(#[from] ProcessTypeError),

    #[error("Couldn't determine app directory: {0}")]
    CannotDetermineAppDirectory(std::io::Error),

    #[error("Couldn't create platform from platform path: {0}")]
    CannotCreatePlatformFromPath(std::io::Error),

    #[error("Couldn't read buildpack descriptor (buildpack.toml): {0}")]
    CannotReadBuildpackDescriptor(TomlFileError),

    #[error("Couldn't read buildpack plan: {0}")]
    CannotReadBuildpackPlan(TomlFileError),

    #[error("Couldn't write build plan: {0}")]
    CannotWriteBuildPlan(TomlFileError),

    #[error("Couldn't write launch.toml: {0}")]
    CannotWriteLaunch(TomlFileError),

    #[error("Couldn't write build.toml: {0}")]
    CannotWriteBuild(TomlFileError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("layer {layer:?} was reused after a cache hit, but its metadata changed from {restored} to {current}")]
    CacheInconsistency {
        layer: LayerName,
        restored: String,
        current: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Builder(#[from] BuilderError),
}

impl Error {
    /// The canonical status reported in the structured builder output.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Builder(builder_error) => builder_error.status(),
            _ => Status::Internal,
        }
    }

    /// Errors that stop the runner before any phase logic runs.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingBuildpackId
                | Self::UnknownBuildpackId { .. }
                | Self::InvalidPhase(_)
                | Self::Usage(_)
                | Self::Registry(_)
                | Self::Config(_)
                | Self::BuildpackIdMismatch { .. }
        )
    }
}

fn join_ids(ids: &[BuildpackId]) -> String {
    ids.iter()
        .map(AsRef::<str>::as_ref)
        .collect::<Vec<_>>()
        .join("\n  ")
}

/// Canonical error codes, serialized with their upper-case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Cancelled,
    /// Attributed to the user, e.g. an invalid version constraint.
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    /// Attributed to the buildpacks themselves.
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Status {
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ERROR_ID_LENGTH: usize = 8;

/// A short, stable identifier for an error message, shown to users for supportability.
#[must_use]
pub fn generate_error_id<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
    }

    let mut id = hex::encode(hasher.finalize());
    id.truncate(ERROR_ID_LENGTH);
    id
}

/// An error carrying a canonical status, raised by buildpack code.
///
/// # Examples
/// ```
/// use gcpcnb::{BuilderError, Status};
///
/// let error = BuilderError::user("invalid Go version specified: 1.x.y");
/// assert_eq!(error.status(), Status::Unknown);
/// assert_eq!(error.id().len(), 8);
/// assert!(error.to_string().starts_with("(error ID: "));
/// ```
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("(error ID: {id}):\n{message}")]
pub struct BuilderError {
    status: Status,
    id: String,
    message: String,
}

impl BuilderError {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            id: generate_error_id(&[&message]),
            message,
        }
    }

    /// An error caused by the application or its configuration.
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(Status::Unknown, message)
    }

    /// An error caused by the buildpacks.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Status::Internal, message)
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_id_is_truncated_lowercase_sha256() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        assert_eq!(generate_error_id(&["abc"]), "ba7816bf");
        assert_eq!(generate_error_id(&["a", "bc"]), "ba7816bf");
    }

    #[test]
    fn builder_error_display() {
        let error = BuilderError::internal("abc");
        assert_eq!(error.to_string(), "(error ID: ba7816bf):\nabc");
        assert_eq!(error.status(), Status::Internal);
    }

    #[test]
    fn status_serializes_as_canonical_name() {
        assert_eq!(
            serde_json::to_string(&Status::InvalidArgument).unwrap(),
            "\"INVALID_ARGUMENT\""
        );
        assert_eq!(Status::Unknown.code(), 2);
        assert_eq!(Status::Internal.code(), 13);
        assert_eq!(Status::Internal.to_string(), "INTERNAL");
    }

    #[test]
    fn unknown_buildpack_id_lists_registered_ids() {
        let error = Error::UnknownBuildpackId {
            id: String::from("google.cobol.build"),
            registered: vec![
                "google.dotnet.sdk".parse().unwrap(),
                "google.go.build".parse().unwrap(),
            ],
        };

        assert_eq!(
            error.to_string(),
            "Unknown buildpack ID: google.cobol.build\nRegistered buildpacks are:\n  google.dotnet.sdk\n  google.go.build"
        );
        assert!(error.is_configuration_error());
    }

    #[test]
    fn status_of_wrapped_builder_error_is_kept() {
        let error = Error::from(BuilderError::user("bad"));
        assert_eq!(error.status(), Status::Unknown);
        assert_eq!(
            Error::InvalidPhase(String::from("export")).status(),
            Status::Internal
        );
    }
}
