//! Error types for bnd-validate.

use std::path::PathBuf;

use bnd_core::{DataKind, NamingError, StorageError};
use thiserror::Error;

/// Wrong file types, counts or locations inside an otherwise-identified
/// session. Every variant names the offending path and what was expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("expected {expected} files with extension {extension} in {dir}, but found {found}")]
    WrongFileCount {
        dir: PathBuf,
        extension: String,
        expected: usize,
        found: usize,
    },

    #[error("filename {path} does not match expected pattern '{expected}'")]
    UnexpectedFilename { path: PathBuf, expected: String },

    #[error("could not find any {extension} files in {dir}")]
    MissingScript { dir: PathBuf, extension: String },

    #[error("found {found} {extension} files in {dir}, expected exactly one")]
    TooManyScripts {
        dir: PathBuf,
        extension: String,
        found: usize,
    },

    #[error("unexpected entry {path}; expected {expected}")]
    UnexpectedEntry { path: PathBuf, expected: String },

    #[error("folder name {path} doesn't match the expected format for probes: {source}")]
    BadProbeFolder {
        path: PathBuf,
        #[source]
        source: NamingError,
    },

    #[error("files in probe folder {dir} do not match; missing: {missing:?}, unexpected: {unexpected:?}")]
    ProbeFilesMismatch {
        dir: PathBuf,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("found {what} file in unexpected location: {path}; expected it under {expected_dir}")]
    FileInUnexpectedLocation {
        path: PathBuf,
        what: String,
        expected_dir: PathBuf,
    },

    #[error("no {extension} video files found in {dir}")]
    MissingVideoFiles { dir: PathBuf, extension: String },

    #[error("video filename does not start with '{expected_prefix}': {path}")]
    BadVideoFilename {
        path: PathBuf,
        expected_prefix: String,
    },

    #[error("expected exactly '{expected}' next to the videos in {dir}, found {found:?}")]
    BadSidecar {
        dir: PathBuf,
        expected: String,
        found: Vec<String>,
    },

    #[error("video files found in more than one folder: {folders:?}")]
    MultipleVideoFolders { folders: Vec<PathBuf> },
}

/// Everything that can stop [`crate::validate_session`].
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A requested data kind is simply absent, as opposed to malformed.
    #[error("no {kind} data found in {path}")]
    MissingData { kind: DataKind, path: PathBuf },

    #[error("session directory not found: {path}")]
    SessionNotFound { path: PathBuf },

    #[error("no valid sessions found for subject {subject} in {path}")]
    NoSessions { subject: String, path: PathBuf },

    #[error("path has no usable folder name: {path}")]
    NoFolderName { path: PathBuf },

    /// A configured filename pattern is not a valid regex.
    #[error("invalid filename pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ValidationError {
    /// `true` when the error only says the data is absent.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, ValidationError::MissingData { .. })
    }
}

/// Failures of the rename passes. Nothing is renamed when one of these is
/// returned before the apply phase.
#[derive(Debug, Error)]
pub enum RenameError {
    #[error("aborting renaming: {path} already exists (renaming {source_path})")]
    FileExists { path: PathBuf, source_path: PathBuf },

    #[error("aborting renaming: more than one file would be renamed to {path}")]
    DuplicateTarget { path: PathBuf },

    #[error("cannot derive a camera id from {path}; expected a name ending in _<number>")]
    UnparseableCameraId { path: PathBuf },

    /// The tree was remediated but still does not validate.
    #[error("videos in {path} are still invalid after renaming: {source}")]
    StillInvalid {
        path: PathBuf,
        #[source]
        source: Box<ValidationError>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<NamingError> for RenameError {
    fn from(e: NamingError) -> Self {
        RenameError::Validation(ValidationError::Naming(e))
    }
}

impl From<StructureError> for RenameError {
    fn from(e: StructureError) -> Self {
        RenameError::Validation(ValidationError::Structure(e))
    }
}
