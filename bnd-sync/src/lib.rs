//! # bnd-sync
//!
//! Transactional transfer of validated sessions between two storage roots.
//!
//! [`plan`] maps manifests onto the destination and pre-flights the collision
//! policy, [`executor`] copies with a compensating undo log, [`verify`]
//! re-validates the destination. [`upload_session`] and [`download_session`]
//! run the whole pipeline.

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod plan;
pub mod verify;

pub use error::SyncError;
pub use executor::{execute, Execution, RollbackFailure, RollbackReport, UndoLog, UndoStep};
pub use pipeline::{
    download_session, ensure_subject_dir, upload_session, Direction, Endpoint, IntegrityPolicy,
    Stage, SyncOptions, SyncReport,
};
pub use plan::{
    map_path, plan_transfer, preflight, Action, CheckedPlan, CheckedTransfer, CollisionPolicy,
    Transfer, TransferPlan,
};
pub use verify::{diff_manifests, verify_destination, ManifestDiff};
