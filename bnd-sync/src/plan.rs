//! Sync planner: source-to-destination path mapping and the collision
//! pre-flight.
//!
//! Planning is pure. [`plan_transfer`] only does path arithmetic and
//! [`preflight`] only reads, so a failure in either leaves both roots exactly
//! as they were.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use bnd_core::{contents_equal, DataKind, FileManifest, FileStamp, Storage};
use serde::Serialize;

use crate::error::SyncError;
use crate::executor::check_no_stale_backup;

// ---------------------------------------------------------------------------
// Collision policy
// ---------------------------------------------------------------------------

/// What to do when a planned destination path already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    Overwrite,
    Skip,
    Error,
    /// Fail only if the existing file differs byte-for-byte from the source.
    #[default]
    ErrorIfDifferent,
}

impl CollisionPolicy {
    pub const ALL: [CollisionPolicy; 4] = [
        CollisionPolicy::Overwrite,
        CollisionPolicy::Skip,
        CollisionPolicy::Error,
        CollisionPolicy::ErrorIfDifferent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CollisionPolicy::Overwrite => "overwrite",
            CollisionPolicy::Skip => "skip",
            CollisionPolicy::Error => "error",
            CollisionPolicy::ErrorIfDifferent => "error-if-different",
        }
    }

    pub(crate) fn collision_detail(self) -> &'static str {
        match self {
            CollisionPolicy::ErrorIfDifferent => " and is different",
            _ => "",
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown collision policy '{s}', expected one of: overwrite, skip, error, error-if-different"
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// How one file will be transferred, as decided against the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Destination absent.
    Copy,
    /// Destination present; replaced under [`CollisionPolicy::Overwrite`].
    Overwrite,
    /// Destination present and left alone (policy `skip`, or identical
    /// content under `error-if-different`).
    Skip,
}

/// One `(source, destination)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub kind: DataKind,
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Every pair of one sync call plus the policy in effect. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferPlan {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub policy: CollisionPolicy,
    pub transfers: Vec<Transfer>,
}

impl TransferPlan {
    /// Planned destination paths of one kind.
    pub fn dests_of(&self, kind: DataKind) -> BTreeSet<PathBuf> {
        self.transfers
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.dest.clone())
            .collect()
    }

    /// Kinds with at least one planned file, in order.
    pub fn kinds(&self) -> Vec<DataKind> {
        let kinds: BTreeSet<DataKind> = self.transfers.iter().map(|t| t.kind).collect();
        kinds.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// `dest_root + relative(path, source_root)`.
///
/// Fails if `path` is not under `source_root` or climbs out of it with `..`.
pub fn map_path(path: &Path, source_root: &Path, dest_root: &Path) -> Result<PathBuf, SyncError> {
    let outside = || SyncError::PathOutsideRoot {
        path: path.to_path_buf(),
        root: source_root.to_path_buf(),
    };
    let relative = path.strip_prefix(source_root).map_err(|_| outside())?;
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(outside());
    }
    Ok(dest_root.join(relative))
}

/// Map every file of `manifests` onto `dest_root`, in manifest order.
///
/// A file listed by more than one manifest is planned once, under the first.
pub fn plan_transfer<'a>(
    manifests: impl IntoIterator<Item = &'a FileManifest>,
    source_root: &Path,
    dest_root: &Path,
    policy: CollisionPolicy,
) -> Result<TransferPlan, SyncError> {
    let mut seen = BTreeSet::new();
    let mut transfers = Vec::new();
    for manifest in manifests {
        for source in manifest.files() {
            if !seen.insert(source.clone()) {
                continue;
            }
            transfers.push(Transfer {
                kind: manifest.kind,
                dest: map_path(source, source_root, dest_root)?,
                source: source.clone(),
            });
        }
    }
    Ok(TransferPlan {
        source_root: source_root.to_path_buf(),
        dest_root: dest_root.to_path_buf(),
        policy,
        transfers,
    })
}

// ---------------------------------------------------------------------------
// Pre-flight
// ---------------------------------------------------------------------------

/// A transfer together with the action the pre-flight decided on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedTransfer {
    #[serde(flatten)]
    pub transfer: Transfer,
    pub action: Action,
    /// `(source, destination)` stamps of a pair found identical under
    /// `error-if-different`. The executor trusts that verdict while both
    /// stamps are unchanged.
    #[serde(skip)]
    pub identical_at: Option<(FileStamp, FileStamp)>,
}

/// A plan whose every destination passed the collision policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedPlan {
    pub policy: CollisionPolicy,
    pub transfers: Vec<CheckedTransfer>,
}

impl CheckedPlan {
    pub fn count(&self, action: Action) -> usize {
        self.transfers.iter().filter(|t| t.action == action).count()
    }
}

/// Decide what `policy` allows for one pair, reading both sides only.
pub fn decide(
    policy: CollisionPolicy,
    src: &dyn Storage,
    transfer: &Transfer,
    dst: &dyn Storage,
) -> Result<Action, SyncError> {
    if !dst.exists(&transfer.dest)? {
        return Ok(Action::Copy);
    }
    match policy {
        CollisionPolicy::Overwrite => Ok(Action::Overwrite),
        CollisionPolicy::Skip => Ok(Action::Skip),
        CollisionPolicy::Error => Err(SyncError::Collision {
            path: transfer.dest.clone(),
            policy,
        }),
        CollisionPolicy::ErrorIfDifferent => {
            if contents_equal(src, &transfer.source, dst, &transfer.dest)? {
                tracing::debug!(path = %transfer.dest.display(), "identical, skipping");
                Ok(Action::Skip)
            } else {
                Err(SyncError::Collision {
                    path: transfer.dest.clone(),
                    policy,
                })
            }
        }
    }
}

/// Evaluate the plan's policy for every destination without writing
/// anything. The first refused destination aborts the whole plan.
pub fn preflight(
    plan: &TransferPlan,
    src: &dyn Storage,
    dst: &dyn Storage,
) -> Result<CheckedPlan, SyncError> {
    let mut transfers = Vec::with_capacity(plan.transfers.len());
    for transfer in &plan.transfers {
        let action = decide(plan.policy, src, transfer, dst)?;
        if action == Action::Overwrite {
            check_no_stale_backup(dst, &transfer.dest)?;
        }
        let identical_at = if action == Action::Skip && plan.policy == CollisionPolicy::ErrorIfDifferent {
            Some((
                FileStamp::of(src, &transfer.source)?,
                FileStamp::of(dst, &transfer.dest)?,
            ))
        } else {
            None
        };
        transfers.push(CheckedTransfer {
            transfer: transfer.clone(),
            action,
            identical_at,
        });
    }
    Ok(CheckedPlan {
        policy: plan.policy,
        transfers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnd_core::LocalStorage;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case("overwrite", CollisionPolicy::Overwrite)]
    #[case("skip", CollisionPolicy::Skip)]
    #[case("error", CollisionPolicy::Error)]
    #[case("error-if-different", CollisionPolicy::ErrorIfDifferent)]
    #[case("error_if_different", CollisionPolicy::ErrorIfDifferent)]
    #[case(" Overwrite ", CollisionPolicy::Overwrite)]
    fn policy_parses(#[case] input: &str, #[case] expected: CollisionPolicy) {
        assert_eq!(input.parse::<CollisionPolicy>().unwrap(), expected);
    }

    #[test]
    fn unknown_policy_lists_the_choices() {
        let err = "replace".parse::<CollisionPolicy>().unwrap_err();
        assert!(err.contains("error-if-different"), "{err}");
    }

    #[test]
    fn map_path_rebases_onto_destination() {
        let dest = map_path(
            Path::new("/local/raw/M011/M011_2023_04_04_16_00/a.txt"),
            Path::new("/local"),
            Path::new("/mnt/remote"),
        )
        .unwrap();
        assert_eq!(
            dest,
            PathBuf::from("/mnt/remote/raw/M011/M011_2023_04_04_16_00/a.txt")
        );
    }

    #[rstest]
    #[case("/elsewhere/raw/M011/a.txt")]
    #[case("/local/../etc/passwd")]
    #[case("/localdata/raw/a.txt")]
    fn map_path_rejects_paths_outside_root(#[case] path: &str) {
        let err = map_path(Path::new(path), Path::new("/local"), Path::new("/remote")).unwrap_err();
        assert!(matches!(err, SyncError::PathOutsideRoot { .. }), "[{path}] {err}");
    }

    #[test]
    fn plan_keeps_manifest_order_and_dedups() {
        let a = FileManifest::new(
            DataKind::Behavior,
            vec![PathBuf::from("/s/raw/x/b"), PathBuf::from("/s/raw/x/a")],
        );
        let b = FileManifest::new(DataKind::Extra, vec![PathBuf::from("/s/raw/x/a")]);
        let plan = plan_transfer([&a, &b], Path::new("/s"), Path::new("/d"), CollisionPolicy::Skip)
            .unwrap();
        let dests: Vec<_> = plan.transfers.iter().map(|t| t.dest.clone()).collect();
        assert_eq!(dests, vec![PathBuf::from("/d/raw/x/a"), PathBuf::from("/d/raw/x/b")]);
        assert_eq!(plan.kinds(), vec![DataKind::Behavior]);
    }

    fn one_file_plan(tmp: &TempDir, src: &[u8], dst: Option<&[u8]>, policy: CollisionPolicy) -> TransferPlan {
        let source = tmp.path().join("src/raw/f.bin");
        let dest = tmp.path().join("dst/raw/f.bin");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, src).unwrap();
        if let Some(bytes) = dst {
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::write(&dest, bytes).unwrap();
        }
        let manifest = FileManifest::new(DataKind::Ephys, vec![source]);
        plan_transfer([&manifest], &tmp.path().join("src"), &tmp.path().join("dst"), policy).unwrap()
    }

    #[rstest]
    #[case(CollisionPolicy::Overwrite, None, Some(Action::Copy))]
    #[case(CollisionPolicy::Error, None, Some(Action::Copy))]
    #[case(CollisionPolicy::Overwrite, Some(&b"old"[..]), Some(Action::Overwrite))]
    #[case(CollisionPolicy::Skip, Some(&b"old"[..]), Some(Action::Skip))]
    #[case(CollisionPolicy::Error, Some(&b"new"[..]), None)]
    #[case(CollisionPolicy::ErrorIfDifferent, Some(&b"new"[..]), Some(Action::Skip))]
    #[case(CollisionPolicy::ErrorIfDifferent, Some(&b"neW"[..]), None)]
    fn preflight_applies_policy(
        #[case] policy: CollisionPolicy,
        #[case] existing: Option<&[u8]>,
        #[case] expected: Option<Action>,
    ) {
        let tmp = TempDir::new().unwrap();
        let plan = one_file_plan(&tmp, b"new", existing, policy);
        let store = LocalStorage::default();
        match (preflight(&plan, &store, &store), expected) {
            (Ok(checked), Some(action)) => assert_eq!(checked.transfers[0].action, action),
            (Err(SyncError::Collision { path, .. }), None) => {
                assert_eq!(path, tmp.path().join("dst/raw/f.bin"))
            }
            (other, _) => panic!("{policy}: unexpected {other:?}"),
        }
    }

    #[test]
    fn collision_message_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let plan = one_file_plan(&tmp, b"a", Some(b"b"), CollisionPolicy::ErrorIfDifferent);
        let store = LocalStorage::default();
        let msg = preflight(&plan, &store, &store).unwrap_err().to_string();
        assert!(msg.starts_with("destination file already exists and is different"), "{msg}");
        assert!(msg.contains("f.bin"), "{msg}");
    }
}
