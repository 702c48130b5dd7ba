//! Error types for bnd-sync.

use std::path::PathBuf;

use bnd_core::StorageError;
use bnd_validate::{RenameError, ValidationError};
use thiserror::Error;

use crate::executor::RollbackReport;
use crate::plan::CollisionPolicy;

/// All errors that can arise from planning, copying and verifying a transfer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The destination exists and the collision policy forbids proceeding.
    #[error("destination file already exists{}: {path}", .policy.collision_detail())]
    Collision {
        path: PathBuf,
        policy: CollisionPolicy,
    },

    /// The copy ran, but the destination manifest differs from the plan.
    #[error(
        "destination session {path} does not match what was copied; missing: {missing:?}, unexpected: {unexpected:?}"
    )]
    Integrity {
        path: PathBuf,
        missing: Vec<PathBuf>,
        unexpected: Vec<PathBuf>,
        /// Set when the integrity policy rolled the copy back.
        rollback: Option<RollbackReport>,
    },

    /// The copy ran, but the destination no longer validates.
    #[error("destination session {path} is invalid after copying: {source}")]
    DestinationInvalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
        rollback: Option<RollbackReport>,
    },

    /// A single copy failed; every step already done has been undone.
    #[error("failed to copy {source_path} to {dest_path}: {cause}; {rollback}")]
    Transfer {
        source_path: PathBuf,
        dest_path: PathBuf,
        #[source]
        cause: Box<SyncError>,
        rollback: RollbackReport,
    },

    /// An earlier, interrupted overwrite left its backup behind.
    #[error("stale backup {backup} of {path} found; restore or remove it before overwriting")]
    StaleBackup { path: PathBuf, backup: PathBuf },

    #[error("{path} is not inside {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("expected a raw session at <root>/raw/<subject>/<session>, got {path}")]
    NotARawSession { path: PathBuf },

    /// A level or subject directory required for the transfer is missing.
    #[error("{what} directory does not exist: {path}")]
    SubjectDirectory { what: &'static str, path: PathBuf },

    /// A rename pass was requested for data that is not being transferred.
    #[error("do not rename {what} when they are not being transferred")]
    RenameWithoutTransfer { what: &'static str },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rename(#[from] RenameError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// `true` for failures detected after the copy completed.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            SyncError::Integrity { .. } | SyncError::DestinationInvalid { .. }
        )
    }
}
