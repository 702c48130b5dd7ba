//! Structure validation for experimental-session data.
//!
//! `validate_session(storage, path, subject, kinds, rules)` walks one session
//! folder against the naming grammar and the per-kind schemas (behavioral,
//! ephys, video, extra files) and returns a flat [`FileManifest`] per kind.
//! The rename passes in [`rename`] bring loosely-named videos and extra files
//! into convention first; [`subjects`] holds subject-level queries and the
//! per-session-isolated batch validator.
//!
//! [`FileManifest`]: bnd_core::FileManifest

pub mod behavior;
pub mod ephys;
pub mod error;
pub mod extra;
pub mod rename;
pub mod report;
pub mod schema;
pub mod session;
pub mod subjects;
pub mod video;

#[cfg(test)]
mod testutil;

pub use error::{RenameError, StructureError, ValidationError};
pub use rename::{rename_extra_files, rename_videos, RenameReport, RenameStep};
pub use report::{ValidationReport, Warning};
pub use schema::{Schema, Validator};
pub use session::{session_from_path, validate_kinds, validate_session, SessionContext, SessionRules};
pub use subjects::{
    last_session, list_subject_sessions, sessions_on_day, validate_subject_sessions, OutcomeSummary,
    SessionFolder, SessionListing, SessionOutcome,
};
pub use video::{diagnose as diagnose_videos, VideoDiagnosis};
