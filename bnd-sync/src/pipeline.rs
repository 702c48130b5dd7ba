//! Sync pipeline shared by upload and download.
//!
//! One call walks `RenamePass → ValidateSource → Resolve → Plan → Preflight →
//! Copy → VerifyDestination → Done`. Everything up to and including the
//! pre-flight only reads; a failure there leaves both roots untouched. A copy
//! failure is rolled back by the executor. A verification failure keeps or
//! rolls back the copy according to [`IntegrityPolicy`].
//!
//! Downloading is uploading with the roots swapped, except that a download
//! skips (with a warning) every kind that is absent or invalid on the remote
//! side instead of failing.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use bnd_core::{DataKind, FileManifest, ProcessingLevel, Storage, SubjectName};
use bnd_validate::{
    rename_extra_files, rename_videos, validate_kinds, RenameReport, SessionContext, SessionRules,
    ValidationError, Warning,
};
use serde::Serialize;

use crate::error::SyncError;
use crate::executor::{execute, RollbackReport, UndoLog, UndoStep};
use crate::plan::{map_path, plan_transfer, preflight, Action, CheckedPlan, CollisionPolicy};
use crate::verify::verify_destination;

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// States of one sync call, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RenamePass,
    ValidateSource,
    Resolve,
    Plan,
    Preflight,
    Copy,
    VerifyDestination,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::RenamePass => "rename pass",
            Stage::ValidateSource => "validate source",
            Stage::Resolve => "resolve",
            Stage::Plan => "plan",
            Stage::Preflight => "pre-flight",
            Stage::Copy => "copy",
            Stage::VerifyDestination => "verify destination",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// What happens to a completed copy whose destination fails verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// Leave the copied files in place for manual inspection.
    #[default]
    Keep,
    /// Replay the undo log, as for a failed copy.
    Rollback,
}

impl FromStr for IntegrityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(IntegrityPolicy::Keep),
            "rollback" => Ok(IntegrityPolicy::Rollback),
            other => Err(format!(
                "unknown integrity policy '{other}', expected 'keep' or 'rollback'"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upload,
    Download,
}

/// A storage together with the root its `raw` and `processed` trees live in.
#[derive(Clone, Copy)]
pub struct Endpoint<'a> {
    pub storage: &'a dyn Storage,
    pub root: &'a Path,
}

impl<'a> Endpoint<'a> {
    pub fn new(storage: &'a dyn Storage, root: &'a Path) -> Self {
        Self { storage, root }
    }

    fn level_dir(&self, level: ProcessingLevel) -> PathBuf {
        self.root.join(level.dir_name())
    }
}

/// Which data to move and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Requested data kinds; `Extra` is controlled by `include_extra`.
    pub kinds: Vec<DataKind>,
    pub include_extra: bool,
    /// Run the video rename pass on the source first (uploads only).
    pub rename_videos: bool,
    /// Run the extra-file rename pass on the source first (uploads only).
    pub rename_extra: bool,
    pub policy: CollisionPolicy,
    pub integrity: IntegrityPolicy,
    /// Stop after the pre-flight and report the plan.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            kinds: DataKind::SELECTABLE.to_vec(),
            include_extra: true,
            rename_videos: false,
            rename_extra: false,
            policy: CollisionPolicy::default(),
            integrity: IntegrityPolicy::default(),
            dry_run: false,
        }
    }
}

impl SyncOptions {
    fn requested(&self) -> BTreeSet<DataKind> {
        self.kinds
            .iter()
            .copied()
            .filter(|k| *k != DataKind::Extra)
            .collect()
    }
}

/// Outcome of one sync call.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: Direction,
    pub session: String,
    pub source: PathBuf,
    pub dest: PathBuf,
    /// Last stage reached: `Done`, or `Preflight` for a dry run
    /// (`RenamePass` when renames are pending).
    pub stage: Stage,
    pub kinds: Vec<DataKind>,
    pub plan: CheckedPlan,
    pub copied: usize,
    pub skipped: usize,
    pub bytes: u64,
    pub renames: Vec<RenameReport>,
    pub warnings: Vec<Warning>,
    pub dry_run: bool,
    /// A dry run stopped after planning renames. Validation and the transfer
    /// plan depend on them, so `plan` is empty.
    pub pending_renames: bool,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Upload the raw session at `session_path` (under `local.root`) to `remote`.
///
/// Every requested kind must validate; any failure aborts before the first
/// write.
pub fn upload_session(
    local: Endpoint<'_>,
    remote: Endpoint<'_>,
    session_path: &Path,
    subject: &SubjectName,
    rules: &SessionRules,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    sync(Direction::Upload, local, remote, session_path, subject, rules, options)
}

/// Download the raw session at `session_path` (under `remote.root`) to `local`.
///
/// Kinds that are absent or invalid on the remote side are skipped with a
/// warning; the rest are still transferred. Rename options are ignored.
pub fn download_session(
    remote: Endpoint<'_>,
    local: Endpoint<'_>,
    session_path: &Path,
    subject: &SubjectName,
    rules: &SessionRules,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    sync(Direction::Download, remote, local, session_path, subject, rules, options)
}

/// Make sure the destination subject folder exists before copying into it.
///
/// The source level and subject folders and the destination level folder
/// must already exist. The destination subject folder is created when absent
/// and the creation is recorded in `log`. Returns the destination subject
/// folder.
pub fn ensure_subject_dir(
    src: Endpoint<'_>,
    dst: Endpoint<'_>,
    level: ProcessingLevel,
    subject: &SubjectName,
    log: &mut UndoLog,
) -> Result<PathBuf, SyncError> {
    fn require(storage: &dyn Storage, path: PathBuf, what: &'static str) -> Result<PathBuf, SyncError> {
        if storage.is_dir(&path)? {
            Ok(path)
        } else {
            Err(SyncError::SubjectDirectory { what, path })
        }
    }

    let src_level = require(src.storage, src.level_dir(level), "source level")?;
    require(src.storage, src_level.join(subject.as_str()), "source subject")?;
    let dst_level = require(dst.storage, dst.level_dir(level), "destination level")?;

    let dst_subject = dst_level.join(subject.as_str());
    if !dst.storage.exists(&dst_subject)? {
        dst.storage.create_dir(&dst_subject)?;
        log.push(UndoStep::RemoveDir(dst_subject.clone()));
        tracing::info!("created subject directory: {}", dst_subject.display());
    }
    Ok(dst_subject)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn sync(
    direction: Direction,
    src: Endpoint<'_>,
    dst: Endpoint<'_>,
    session_path: &Path,
    subject: &SubjectName,
    rules: &SessionRules,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    check_raw_session(session_path, src.root, subject)?;
    let requested = options.requested();
    if direction == Direction::Upload {
        if options.rename_videos && !requested.contains(&DataKind::Video) {
            return Err(SyncError::RenameWithoutTransfer { what: "videos" });
        }
        if options.rename_extra && !options.include_extra {
            return Err(SyncError::RenameWithoutTransfer { what: "extra files" });
        }
    }

    let mut ctx = SessionContext::open(src.storage, session_path, subject, rules)?;
    ctx.warn_if_absent = direction == Direction::Upload;
    let session = ctx.name().to_string();
    let dest_session = map_path(session_path, src.root, dst.root)?;

    let mut renames = Vec::new();
    if direction == Direction::Upload {
        enter(Stage::RenamePass, &session);
        if options.rename_videos {
            renames.push(rename_videos(&ctx, options.dry_run)?);
        }
        if options.rename_extra {
            renames.push(rename_extra_files(&ctx, options.dry_run)?);
        }
        if options.dry_run && renames.iter().any(|r| !r.is_noop()) {
            // the source only validates once the renames are applied
            tracing::info!("[dry-run] transfer plan for {session} depends on pending renames");
            return Ok(SyncReport {
                direction,
                session,
                source: session_path.to_path_buf(),
                dest: dest_session,
                stage: Stage::RenamePass,
                kinds: Vec::new(),
                plan: CheckedPlan {
                    policy: options.policy,
                    transfers: Vec::new(),
                },
                copied: 0,
                skipped: 0,
                bytes: 0,
                renames,
                warnings: Vec::new(),
                dry_run: true,
                pending_renames: true,
            });
        }
    }

    enter(Stage::ValidateSource, &session);
    let mut warnings = Vec::new();
    let manifests = match direction {
        Direction::Upload => validate_all(&ctx, &requested, options.include_extra, &mut warnings)?,
        Direction::Download => validate_each(&ctx, &requested, options.include_extra, &mut warnings),
    };

    enter(Stage::Resolve, &session);
    let manifests: Vec<FileManifest> = manifests.into_iter().filter(|m| !m.is_empty()).collect();

    enter(Stage::Plan, &session);
    let plan = plan_transfer(&manifests, src.root, dst.root, options.policy)?;

    enter(Stage::Preflight, &session);
    let checked = preflight(&plan, src.storage, dst.storage)?;
    let mut report = SyncReport {
        direction,
        session: session.clone(),
        source: session_path.to_path_buf(),
        dest: dest_session.clone(),
        stage: Stage::Preflight,
        kinds: plan.kinds(),
        copied: 0,
        skipped: checked.count(Action::Skip),
        bytes: 0,
        plan: checked,
        renames,
        warnings,
        dry_run: options.dry_run,
        pending_renames: false,
    };
    if options.dry_run {
        tracing::info!("[dry-run] {} file(s) planned for {session}", plan.len());
        return Ok(report);
    }
    if plan.is_empty() {
        tracing::warn!("nothing to transfer for {session}");
        report.stage = Stage::Done;
        return Ok(report);
    }

    enter(Stage::Copy, &session);
    let mut log = UndoLog::new();
    ensure_subject_dir(src, dst, ProcessingLevel::Raw, subject, &mut log)?;
    let execution = execute(&report.plan, src.storage, dst.storage, &mut log)?;
    report.copied = execution.copied.len();
    report.skipped = execution.skipped.len();
    report.bytes = execution.bytes;
    tracing::debug!("{} undo step(s) recorded for {session}", log.len());

    enter(Stage::VerifyDestination, &session);
    if let Err(err) = verify_destination(dst.storage, &dest_session, subject, rules, &plan) {
        return Err(match options.integrity {
            IntegrityPolicy::Rollback => {
                tracing::warn!("destination failed verification, rolling back: {err}");
                let rollback = log.rollback(dst.storage);
                with_rollback(err, rollback)
            }
            IntegrityPolicy::Keep => {
                tracing::warn!("destination failed verification, keeping the copied files: {err}");
                log.commit(dst.storage);
                err
            }
        });
    }
    log.commit(dst.storage);

    enter(Stage::Done, &session);
    report.stage = Stage::Done;
    Ok(report)
}

fn enter(stage: Stage, session: &str) {
    tracing::info!("{stage}: {session}");
}

/// `session_path` must be `<root>/raw/<subject>/<session>`.
fn check_raw_session(session_path: &Path, root: &Path, subject: &SubjectName) -> Result<(), SyncError> {
    let relative = session_path
        .strip_prefix(root)
        .map_err(|_| SyncError::PathOutsideRoot {
            path: session_path.to_path_buf(),
            root: root.to_path_buf(),
        })?;
    let parts: Vec<&std::ffi::OsStr> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect::<Option<_>>()
        .unwrap_or_default();
    let raw = ProcessingLevel::Raw.dir_name();
    match parts.as_slice() {
        [level, subject_dir, _] if *level == raw && *subject_dir == subject.as_str() => Ok(()),
        _ => Err(SyncError::NotARawSession {
            path: session_path.to_path_buf(),
        }),
    }
}

/// Upload validation: all requested kinds at once, first failure aborts.
fn validate_all(
    ctx: &SessionContext<'_>,
    requested: &BTreeSet<DataKind>,
    include_extra: bool,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<FileManifest>, SyncError> {
    let kinds: Vec<DataKind> = requested.iter().copied().collect();
    let mut report = validate_kinds(ctx, &kinds)?;
    warnings.append(&mut report.warnings);

    // an absent recording is legal for validation but not for an ephys upload
    if requested.contains(&DataKind::Ephys)
        && report.manifest(DataKind::Ephys).map_or(true, FileManifest::is_empty)
    {
        return Err(ValidationError::MissingData {
            kind: DataKind::Ephys,
            path: ctx.path.clone(),
        }
        .into());
    }
    if !include_extra {
        report.manifests.remove(&DataKind::Extra);
    }
    Ok(report.manifests.into_values().collect())
}

/// Download validation: each kind on its own, skipping what fails.
fn validate_each(
    ctx: &SessionContext<'_>,
    requested: &BTreeSet<DataKind>,
    include_extra: bool,
    warnings: &mut Vec<Warning>,
) -> Vec<FileManifest> {
    let mut kinds: Vec<DataKind> = requested.iter().copied().collect();
    if include_extra {
        kinds.push(DataKind::Extra);
    }

    let mut manifests = Vec::new();
    for kind in kinds {
        let reason = match validate_kinds(ctx, &[kind]) {
            Ok(mut report) => {
                warnings.append(&mut report.warnings);
                match report.manifests.remove(&kind) {
                    Some(manifest) if !manifest.is_empty() => {
                        manifests.push(manifest);
                        continue;
                    }
                    _ => "it was not found".to_string(),
                }
            }
            Err(err) => err.to_string(),
        };
        let warning = Warning::KindSkipped {
            data_kind: kind,
            reason,
        };
        tracing::warn!("{warning}");
        warnings.push(warning);
    }
    manifests
}

fn with_rollback(err: SyncError, report: RollbackReport) -> SyncError {
    match err {
        SyncError::Integrity {
            path,
            missing,
            unexpected,
            ..
        } => SyncError::Integrity {
            path,
            missing,
            unexpected,
            rollback: Some(report),
        },
        SyncError::DestinationInvalid { path, source, .. } => SyncError::DestinationInvalid {
            path,
            source,
            rollback: Some(report),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/data/raw/M011/M011_2023_04_04_16_00", true)]
    #[case("/data/processed/M011/M011_2023_04_04_16_00", false)]
    #[case("/data/raw/M012/M011_2023_04_04_16_00", false)]
    #[case("/data/raw/M011", false)]
    #[case("/data/raw/M011/M011_2023_04_04_16_00/extra", false)]
    #[case("/data/raw/../raw/M011/M011_2023_04_04_16_00", false)]
    fn raw_session_location(#[case] path: &str, #[case] ok: bool) {
        let result = check_raw_session(Path::new(path), Path::new("/data"), &SubjectName::from("M011"));
        assert_eq!(result.is_ok(), ok, "{path}: {result:?}");
        if let Err(err) = result {
            assert!(matches!(err, SyncError::NotARawSession { .. }), "{err}");
        }
    }

    #[test]
    fn session_outside_root_is_rejected() {
        let err = check_raw_session(
            Path::new("/elsewhere/raw/M011/M011_2023_04_04_16_00"),
            Path::new("/data"),
            &SubjectName::from("M011"),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::PathOutsideRoot { .. }));
    }

    #[rstest]
    #[case("keep", IntegrityPolicy::Keep)]
    #[case("Rollback", IntegrityPolicy::Rollback)]
    fn integrity_policy_parses(#[case] input: &str, #[case] expected: IntegrityPolicy) {
        assert_eq!(input.parse::<IntegrityPolicy>().unwrap(), expected);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Preflight < Stage::Copy);
        assert!(Stage::VerifyDestination < Stage::Done);
        assert_eq!(Stage::Preflight.to_string(), "pre-flight");
    }
}
