//! Validation results: per-kind manifests plus policy warnings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use bnd_core::{DataKind, FileManifest};
use serde::Serialize;

/// Conditions that are schema-legal but worth flagging.
///
/// Each warning is also logged through `tracing::warn!` where it is raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// More than one ephys recording in one session.
    MultipleRecordings { session: PathBuf, count: usize },
    /// The behavioral task-script folder is absent.
    NoTaskScriptFolder { path: PathBuf },
    /// A data kind was left out of a transfer.
    KindSkipped { data_kind: DataKind, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MultipleRecordings { session, count } => {
                write!(f, "more than one raw ephys recording found ({count}) in {}", session.display())
            }
            Warning::NoTaskScriptFolder { path } => {
                write!(f, "no task script folder found at {}", path.display())
            }
            Warning::KindSkipped { data_kind, reason } => {
                write!(f, "skipping {data_kind} data because of: {reason}")
            }
        }
    }
}

/// Output of one `validate_session` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub manifests: BTreeMap<DataKind, FileManifest>,
    pub warnings: Vec<Warning>,
}

impl ValidationReport {
    pub fn manifest(&self, kind: DataKind) -> Option<&FileManifest> {
        self.manifests.get(&kind)
    }

    /// Total number of files over all manifests.
    pub fn file_count(&self) -> usize {
        self.manifests.values().map(FileManifest::len).sum()
    }
}
