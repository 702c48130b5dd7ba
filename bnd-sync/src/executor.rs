//! Copy executor with a compensating undo log.
//!
//! Copies run strictly in plan order. Every mutation of the destination is
//! recorded in an [`UndoLog`] before or as it happens; when a copy fails the
//! log is replayed in reverse (delete copied files, restore overwritten ones,
//! remove created directories innermost first). Each undo step is attempted
//! independently and failures are collected, never propagated.

use std::fmt;
use std::path::{Path, PathBuf};

use bnd_core::{copy_with_metadata, FileStamp, Storage, StorageError};
use serde::Serialize;

use crate::error::SyncError;
use crate::plan::{decide, Action, CheckedPlan, CheckedTransfer, CollisionPolicy};

/// Suffix of the hidden sibling an overwritten destination is parked under
/// until the sync commits. Hidden names are ignored by every schema, so
/// verification sees the tree as it will be after the commit.
pub const BACKUP_SUFFIX: &str = ".bnd-backup";

// ---------------------------------------------------------------------------
// Undo log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoStep {
    RemoveFile(PathBuf),
    RemoveDir(PathBuf),
    RestoreBackup { backup: PathBuf, original: PathBuf },
}

impl fmt::Display for UndoStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoStep::RemoveFile(p) => write!(f, "remove file {}", p.display()),
            UndoStep::RemoveDir(p) => write!(f, "remove directory {}", p.display()),
            UndoStep::RestoreBackup { original, .. } => {
                write!(f, "restore {} from backup", original.display())
            }
        }
    }
}

/// One undo step that could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackFailure {
    pub step: String,
    pub error: String,
}

/// Outcome of replaying an [`UndoLog`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub undone: usize,
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rolled back {} step(s)", self.undone)?;
        if !self.failures.is_empty() {
            let failed: Vec<String> = self
                .failures
                .iter()
                .map(|fail| format!("{} ({})", fail.step, fail.error))
                .collect();
            write!(f, ", {} failed: {}", self.failures.len(), failed.join("; "))?;
        }
        Ok(())
    }
}

/// Ordered record of everything one sync call did to the destination.
#[derive(Debug, Default)]
pub struct UndoLog {
    steps: Vec<UndoStep>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: UndoStep) {
        self.steps.push(step);
    }

    #[cfg(test)]
    pub(crate) fn steps(&self) -> &[UndoStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Create `dir` and any missing ancestors one level at a time, recording
    /// each directory created.
    pub fn create_dir_all(&mut self, dst: &dyn Storage, dir: &Path) -> Result<(), StorageError> {
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(d) = current {
            if d.as_os_str().is_empty() || dst.exists(d)? {
                break;
            }
            missing.push(d);
            current = d.parent();
        }
        for d in missing.into_iter().rev() {
            dst.create_dir(d)?;
            tracing::debug!("created directory: {}", d.display());
            self.push(UndoStep::RemoveDir(d.to_path_buf()));
        }
        Ok(())
    }

    /// Undo every recorded step in reverse order, emptying the log.
    pub fn rollback(&mut self, dst: &dyn Storage) -> RollbackReport {
        let mut report = RollbackReport::default();
        for step in std::mem::take(&mut self.steps).into_iter().rev() {
            match undo(dst, &step) {
                Ok(()) => report.undone += 1,
                Err(err) => {
                    tracing::warn!("rollback step failed: {step}: {err}");
                    report.failures.push(RollbackFailure {
                        step: step.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        tracing::info!("{report}");
        report
    }

    /// Keep what was done: drop the backups of overwritten files and empty
    /// the log.
    pub fn commit(&mut self, dst: &dyn Storage) {
        for step in std::mem::take(&mut self.steps) {
            if let UndoStep::RestoreBackup { backup, .. } = step {
                if let Err(err) = dst.remove_file(&backup) {
                    tracing::warn!("could not remove backup {}: {err}", backup.display());
                }
            }
        }
    }
}

fn undo(dst: &dyn Storage, step: &UndoStep) -> Result<(), StorageError> {
    match step {
        // the copy may have failed before the file was created
        UndoStep::RemoveFile(path) => {
            if dst.exists(path)? {
                dst.remove_file(path)?;
            }
            Ok(())
        }
        UndoStep::RemoveDir(path) => dst.remove_dir(path),
        UndoStep::RestoreBackup { backup, original } => dst.rename(backup, original),
    }
}

/// The hidden sibling `.<name>.bnd-backup` an overwritten file is parked under.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

/// The backup path for overwriting `dest`, refused when a backup from an
/// interrupted run is still there.
pub(crate) fn check_no_stale_backup(dst: &dyn Storage, dest: &Path) -> Result<PathBuf, SyncError> {
    let backup = backup_path(dest);
    if dst.exists(&backup)? {
        return Err(SyncError::StaleBackup {
            path: dest.to_path_buf(),
            backup,
        });
    }
    Ok(backup)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// What a successful [`execute`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub copied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub bytes: u64,
}

/// Run the plan's copies in order, recording every mutation into `log`.
///
/// The collision policy is evaluated again right before each copy, since the
/// destination may have changed since the pre-flight. On the first failure
/// the whole log is rolled back and [`SyncError::Transfer`] is returned.
/// On success the log is left for the caller to commit or roll back.
pub fn execute(
    plan: &CheckedPlan,
    src: &dyn Storage,
    dst: &dyn Storage,
    log: &mut UndoLog,
) -> Result<Execution, SyncError> {
    let mut execution = Execution::default();
    for transfer in &plan.transfers {
        if let Err(cause) = copy_one(transfer, plan.policy, src, dst, log, &mut execution) {
            tracing::warn!(
                "copying {} failed, rolling back: {cause}",
                transfer.transfer.source.display()
            );
            let rollback = log.rollback(dst);
            return Err(SyncError::Transfer {
                source_path: transfer.transfer.source.clone(),
                dest_path: transfer.transfer.dest.clone(),
                cause: Box::new(cause),
                rollback,
            });
        }
    }
    Ok(execution)
}

fn copy_one(
    checked: &CheckedTransfer,
    policy: CollisionPolicy,
    src: &dyn Storage,
    dst: &dyn Storage,
    log: &mut UndoLog,
    execution: &mut Execution,
) -> Result<(), SyncError> {
    let transfer = &checked.transfer;
    let action = if still_identical(checked, src, dst)? {
        Action::Skip
    } else {
        decide(policy, src, transfer, dst)?
    };
    if action == Action::Skip {
        tracing::debug!("skipped: {}", transfer.dest.display());
        execution.skipped.push(transfer.dest.clone());
        return Ok(());
    }

    if let Some(parent) = transfer.dest.parent() {
        log.create_dir_all(dst, parent)?;
    }
    if action == Action::Overwrite {
        let backup = check_no_stale_backup(dst, &transfer.dest)?;
        dst.rename(&transfer.dest, &backup)?;
        log.push(UndoStep::RestoreBackup {
            backup,
            original: transfer.dest.clone(),
        });
    }

    log.push(UndoStep::RemoveFile(transfer.dest.clone()));
    execution.bytes += copy_with_metadata(src, &transfer.source, dst, &transfer.dest)?;
    execution.copied.push(transfer.dest.clone());
    tracing::info!("copied: {}", transfer.dest.display());
    Ok(())
}

/// Whether a pair the pre-flight found identical is provably untouched, so
/// its bytes need not be compared again.
fn still_identical(
    checked: &CheckedTransfer,
    src: &dyn Storage,
    dst: &dyn Storage,
) -> Result<bool, StorageError> {
    let Some((src_stamp, dst_stamp)) = checked.identical_at else {
        return Ok(false);
    };
    let transfer = &checked.transfer;
    if !dst.exists(&transfer.dest)? {
        return Ok(false);
    }
    Ok(FileStamp::of(src, &transfer.source)? == src_stamp
        && FileStamp::of(dst, &transfer.dest)? == dst_stamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan_transfer, preflight, TransferPlan};
    use bnd_core::{DataKind, Entry, FileManifest, LocalStorage};
    use std::cell::Cell;
    use std::fs;
    use std::io::Read;
    use std::time::SystemTime;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        sources: Vec<PathBuf>,
    }

    impl Fixture {
        fn new(files: &[&str]) -> Self {
            let tmp = TempDir::new().unwrap();
            let mut sources = Vec::new();
            for rel in files {
                let path = tmp.path().join("src").join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, format!("new {rel}")).unwrap();
                sources.push(path);
            }
            fs::create_dir_all(tmp.path().join("dst/raw")).unwrap();
            Self { tmp, sources }
        }

        fn dst(&self, rel: &str) -> PathBuf {
            self.tmp.path().join("dst").join(rel)
        }

        fn plan(&self, policy: CollisionPolicy) -> TransferPlan {
            let manifest = FileManifest::new(DataKind::Behavior, self.sources.clone());
            plan_transfer(
                [&manifest],
                &self.tmp.path().join("src"),
                &self.tmp.path().join("dst"),
                policy,
            )
            .unwrap()
        }

        fn checked(&self, policy: CollisionPolicy) -> CheckedPlan {
            let store = LocalStorage::default();
            preflight(&self.plan(policy), &store, &store).unwrap()
        }
    }

    fn tree(root: &Path) -> Vec<String> {
        let mut all: Vec<String> = walkdir(root);
        all.sort();
        all
    }

    fn walkdir(root: &Path) -> Vec<String> {
        let mut out = Vec::new();
        for entry in fs::read_dir(root).unwrap() {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
            if path.is_dir() {
                out.push(format!("{rel}/"));
                out.extend(walkdir(&path).into_iter().map(|c| format!("{rel}/{c}")));
            } else {
                out.push(format!("{rel}={}", fs::read_to_string(&path).unwrap()));
            }
        }
        out
    }

    #[test]
    fn copies_in_order_and_records_created_dirs() {
        let fx = Fixture::new(&["raw/M011/S/a.txt", "raw/M011/S/g0/p0/b.bin"]);
        let store = LocalStorage::default();
        let mut log = UndoLog::new();
        let done = execute(&fx.checked(CollisionPolicy::ErrorIfDifferent), &store, &store, &mut log)
            .unwrap();

        assert_eq!(done.copied, vec![fx.dst("raw/M011/S/a.txt"), fx.dst("raw/M011/S/g0/p0/b.bin")]);
        let created: Vec<_> = log
            .steps()
            .iter()
            .filter_map(|s| match s {
                UndoStep::RemoveDir(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            created,
            vec![
                fx.dst("raw/M011"),
                fx.dst("raw/M011/S"),
                fx.dst("raw/M011/S/g0"),
                fx.dst("raw/M011/S/g0/p0"),
            ]
        );
    }

    #[test]
    fn failure_rolls_back_to_the_prior_tree() {
        let fx = Fixture::new(&["raw/M011/S/a.txt", "raw/M011/S/b.txt", "raw/M011/S/sub/c.txt"]);
        fs::create_dir_all(fx.dst("raw/M011")).unwrap();
        fs::write(fx.dst("raw/M011/keep.txt"), "old").unwrap();
        let before = tree(&fx.tmp.path().join("dst"));

        let plan = fx.checked(CollisionPolicy::Overwrite);
        fs::remove_file(&fx.sources[2]).unwrap();

        let store = LocalStorage::default();
        let mut log = UndoLog::new();
        let err = execute(&plan, &store, &store, &mut log).unwrap_err();
        match &err {
            SyncError::Transfer { source_path, rollback, .. } => {
                assert_eq!(source_path, &fx.sources[2]);
                assert!(rollback.is_clean(), "{rollback}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(log.is_empty());
        assert_eq!(tree(&fx.tmp.path().join("dst")), before);
    }

    #[test]
    fn overwritten_file_is_restored_on_rollback_and_dropped_on_commit() {
        let fx = Fixture::new(&["raw/S/a.txt"]);
        fs::create_dir_all(fx.dst("raw/S")).unwrap();
        fs::write(fx.dst("raw/S/a.txt"), "old").unwrap();
        let store = LocalStorage::default();
        let plan = fx.checked(CollisionPolicy::Overwrite);
        assert_eq!(plan.transfers[0].action, Action::Overwrite);

        let mut log = UndoLog::new();
        execute(&plan, &store, &store, &mut log).unwrap();
        assert_eq!(fs::read_to_string(fx.dst("raw/S/a.txt")).unwrap(), "new raw/S/a.txt");
        assert!(fx.dst("raw/S/.a.txt.bnd-backup").exists());
        log.rollback(&store);
        assert_eq!(fs::read_to_string(fx.dst("raw/S/a.txt")).unwrap(), "old");
        assert!(!fx.dst("raw/S/.a.txt.bnd-backup").exists());

        let mut log = UndoLog::new();
        execute(&plan, &store, &store, &mut log).unwrap();
        log.commit(&store);
        assert_eq!(fs::read_to_string(fx.dst("raw/S/a.txt")).unwrap(), "new raw/S/a.txt");
        assert!(!fx.dst("raw/S/.a.txt.bnd-backup").exists());
    }

    #[test]
    fn rollback_keeps_going_after_a_failed_step() {
        let fx = Fixture::new(&["raw/S/a.txt"]);
        let store = LocalStorage::default();
        let mut log = UndoLog::new();
        execute(&fx.checked(CollisionPolicy::Error), &store, &store, &mut log).unwrap();

        // a foreign file keeps raw/S from being removed
        fs::write(fx.dst("raw/S/foreign.txt"), "x").unwrap();
        let report = log.rollback(&store);
        assert_eq!(report.undone, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].step.starts_with("remove directory"));
        assert!(!fx.dst("raw/S/a.txt").exists());
        assert!(report.to_string().contains("1 failed"));
    }

    #[test]
    fn copy_time_recheck_refuses_a_new_collision() {
        let fx = Fixture::new(&["raw/S/a.txt", "raw/S/b.txt"]);
        let store = LocalStorage::default();
        let plan = fx.checked(CollisionPolicy::Error);
        fs::create_dir_all(fx.dst("raw/S")).unwrap();
        fs::write(fx.dst("raw/S/b.txt"), "raced").unwrap();

        let mut log = UndoLog::new();
        let err = execute(&plan, &store, &store, &mut log).unwrap_err();
        let SyncError::Transfer { cause, .. } = err else {
            panic!("expected a transfer error");
        };
        assert!(matches!(*cause, SyncError::Collision { .. }));
        assert!(!fx.dst("raw/S/a.txt").exists());
        assert_eq!(fs::read_to_string(fx.dst("raw/S/b.txt")).unwrap(), "raced");
    }

    /// Local storage that counts how often a file is opened for reading.
    #[derive(Default)]
    struct CountingStorage {
        inner: LocalStorage,
        reads: Cell<usize>,
    }

    impl Storage for CountingStorage {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn exists(&self, path: &Path) -> Result<bool, StorageError> {
            self.inner.exists(path)
        }
        fn is_dir(&self, path: &Path) -> Result<bool, StorageError> {
            self.inner.is_dir(path)
        }
        fn list_dir(&self, dir: &Path) -> Result<Vec<Entry>, StorageError> {
            self.inner.list_dir(dir)
        }
        fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
            self.inner.walk_files(dir)
        }
        fn open_read<'a>(&'a self, path: &Path) -> Result<Box<dyn Read + 'a>, StorageError> {
            self.reads.set(self.reads.get() + 1);
            self.inner.open_read(path)
        }
        fn modified(&self, path: &Path) -> Result<Option<SystemTime>, StorageError> {
            self.inner.modified(path)
        }
        fn size(&self, path: &Path) -> Result<u64, StorageError> {
            self.inner.size(path)
        }
        fn write_from(
            &self,
            path: &Path,
            reader: &mut dyn Read,
            modified: Option<SystemTime>,
        ) -> Result<u64, StorageError> {
            self.inner.write_from(path, reader, modified)
        }
        fn create_dir(&self, path: &Path) -> Result<(), StorageError> {
            self.inner.create_dir(path)
        }
        fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
            self.inner.remove_file(path)
        }
        fn remove_dir(&self, path: &Path) -> Result<(), StorageError> {
            self.inner.remove_dir(path)
        }
        fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
            self.inner.rename(from, to)
        }
    }

    #[test]
    fn identical_destination_is_not_reread_at_copy_time() {
        let fx = Fixture::new(&["raw/S/a.txt"]);
        fs::create_dir_all(fx.dst("raw/S")).unwrap();
        fs::write(fx.dst("raw/S/a.txt"), "new raw/S/a.txt").unwrap();
        let plan = fx.checked(CollisionPolicy::ErrorIfDifferent);
        assert_eq!(plan.transfers[0].action, Action::Skip);
        assert!(plan.transfers[0].identical_at.is_some());

        let dst = CountingStorage::default();
        let mut log = UndoLog::new();
        let done = execute(&plan, &LocalStorage::default(), &dst, &mut log).unwrap();
        assert_eq!(done.skipped, vec![fx.dst("raw/S/a.txt")]);
        assert_eq!(dst.reads.get(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn destination_changed_after_preflight_is_compared_again() {
        let fx = Fixture::new(&["raw/S/a.txt"]);
        fs::create_dir_all(fx.dst("raw/S")).unwrap();
        fs::write(fx.dst("raw/S/a.txt"), "new raw/S/a.txt").unwrap();
        let plan = fx.checked(CollisionPolicy::ErrorIfDifferent);
        fs::write(fx.dst("raw/S/a.txt"), "edited after the pre-flight").unwrap();

        let store = LocalStorage::default();
        let mut log = UndoLog::new();
        let err = execute(&plan, &store, &store, &mut log).unwrap_err();
        let SyncError::Transfer { cause, .. } = err else {
            panic!("expected a transfer error");
        };
        assert!(matches!(*cause, SyncError::Collision { .. }));
        assert_eq!(
            fs::read_to_string(fx.dst("raw/S/a.txt")).unwrap(),
            "edited after the pre-flight"
        );
    }

    #[test]
    fn stale_backup_is_refused_at_preflight() {
        let fx = Fixture::new(&["raw/S/a.txt"]);
        fs::create_dir_all(fx.dst("raw/S")).unwrap();
        fs::write(fx.dst("raw/S/a.txt"), "old").unwrap();
        fs::write(fx.dst("raw/S/.a.txt.bnd-backup"), "older").unwrap();

        let store = LocalStorage::default();
        let err = preflight(&fx.plan(CollisionPolicy::Overwrite), &store, &store).unwrap_err();
        match err {
            SyncError::StaleBackup { path, backup } => {
                assert_eq!(path, fx.dst("raw/S/a.txt"));
                assert_eq!(backup, fx.dst("raw/S/.a.txt.bnd-backup"));
            }
            other => panic!("expected StaleBackup, got {other:?}"),
        }
    }

    #[test]
    fn stale_backup_appearing_before_the_copy_is_not_replaced() {
        let fx = Fixture::new(&["raw/S/a.txt"]);
        fs::create_dir_all(fx.dst("raw/S")).unwrap();
        fs::write(fx.dst("raw/S/a.txt"), "old").unwrap();
        let plan = fx.checked(CollisionPolicy::Overwrite);
        fs::write(fx.dst("raw/S/.a.txt.bnd-backup"), "older").unwrap();

        let store = LocalStorage::default();
        let mut log = UndoLog::new();
        let err = execute(&plan, &store, &store, &mut log).unwrap_err();
        let SyncError::Transfer { cause, rollback, .. } = err else {
            panic!("expected a transfer error");
        };
        assert!(matches!(*cause, SyncError::StaleBackup { .. }));
        assert!(rollback.is_clean());
        assert_eq!(fs::read_to_string(fx.dst("raw/S/a.txt")).unwrap(), "old");
        assert_eq!(
            fs::read_to_string(fx.dst("raw/S/.a.txt.bnd-backup")).unwrap(),
            "older"
        );
    }
}
