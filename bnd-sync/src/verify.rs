//! Post-transfer verifier: re-validate the destination session and compare
//! its manifests with the plan.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bnd_core::{DataKind, Storage, SubjectName};
use bnd_validate::{validate_kinds, SessionContext, SessionRules, ValidationReport};

use crate::error::SyncError;
use crate::plan::TransferPlan;

/// Differences between a destination manifest and the planned paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub missing: Vec<PathBuf>,
    pub unexpected: Vec<PathBuf>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Compare the files found at the destination with the planned ones.
///
/// Extra files are an open set (the destination may hold extras from
/// another machine), so for [`DataKind::Extra`] only missing files count.
pub fn diff_manifests(
    plan: &TransferPlan,
    found: &ValidationReport,
) -> ManifestDiff {
    let mut diff = ManifestDiff::default();
    for kind in plan.kinds() {
        let planned = plan.dests_of(kind);
        let there: BTreeSet<PathBuf> = found
            .manifest(kind)
            .map(|m| m.to_set())
            .unwrap_or_default();
        diff.missing.extend(planned.difference(&there).cloned());
        if kind != DataKind::Extra {
            diff.unexpected.extend(there.difference(&planned).cloned());
        }
    }
    diff
}

/// Validate the destination session for the kinds of `plan` and check that
/// exactly the planned files are there.
///
/// Returns the destination report. Failures are returned without rollback;
/// the caller applies its integrity policy.
pub fn verify_destination(
    dst: &dyn Storage,
    dest_session: &Path,
    subject: &SubjectName,
    rules: &SessionRules,
    plan: &TransferPlan,
) -> Result<ValidationReport, SyncError> {
    let invalid = |source| SyncError::DestinationInvalid {
        path: dest_session.to_path_buf(),
        source,
        rollback: None,
    };
    let mut ctx = SessionContext::open(dst, dest_session, subject, rules).map_err(invalid)?;
    ctx.warn_if_absent = false;
    let report = validate_kinds(&ctx, &plan.kinds()).map_err(invalid)?;

    let diff = diff_manifests(plan, &report);
    if !diff.is_empty() {
        return Err(SyncError::Integrity {
            path: dest_session.to_path_buf(),
            missing: diff.missing,
            unexpected: diff.unexpected,
            rollback: None,
        });
    }
    tracing::info!(
        "verified {} file(s) in {}",
        plan.len(),
        dest_session.display()
    );
    Ok(report)
}
