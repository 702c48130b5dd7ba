//! Rename passes that bring loosely-named files into convention before
//! validation.
//!
//! Both passes plan every step first and check the plan for collisions, so a
//! failing pass leaves the tree untouched. Re-running a pass on a tree it has
//! already fixed plans zero steps.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use bnd_core::naming;
use bnd_core::Storage;
use serde::Serialize;

use crate::error::RenameError;
use crate::extra;
use crate::session::SessionContext;
use crate::video::{self, VideoDiagnosis};

// ---------------------------------------------------------------------------
// Plan and report
// ---------------------------------------------------------------------------

/// One filesystem mutation of a rename pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RenameStep {
    CreateDir { path: PathBuf },
    Move { from: PathBuf, to: PathBuf },
}

impl fmt::Display for RenameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameStep::CreateDir { path } => write!(f, "mkdir {}", path.display()),
            RenameStep::Move { from, to } => write!(f, "{} -> {}", from.display(), to.display()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub steps: Vec<RenameStep>,
    /// `false` for dry runs.
    pub applied: bool,
}

impl RenameReport {
    /// Nothing needed renaming.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

fn apply(storage: &dyn Storage, steps: &[RenameStep]) -> Result<(), RenameError> {
    for step in steps {
        tracing::info!("{step}");
        match step {
            RenameStep::CreateDir { path } => storage.create_dir(path)?,
            RenameStep::Move { from, to } => storage.rename(from, to)?,
        }
    }
    Ok(())
}

fn finish(
    ctx: &SessionContext<'_>,
    steps: Vec<RenameStep>,
    dry_run: bool,
) -> Result<RenameReport, RenameError> {
    if dry_run || steps.is_empty() {
        if steps.is_empty() {
            tracing::info!("{} looks good, no renaming needed", ctx.path.display());
        }
        return Ok(RenameReport {
            steps,
            applied: false,
        });
    }
    apply(ctx.storage, &steps)?;
    Ok(RenameReport {
        steps,
        applied: true,
    })
}

// ---------------------------------------------------------------------------
// Extra files
// ---------------------------------------------------------------------------

/// Prefix whitelisted root files and extension-matched files below the root
/// with the session name.
pub fn rename_extra_files(ctx: &SessionContext<'_>, dry_run: bool) -> Result<RenameReport, RenameError> {
    let steps = plan_extra_renames(ctx)?;
    finish(ctx, steps, dry_run)
}

pub fn plan_extra_renames(ctx: &SessionContext<'_>) -> Result<Vec<RenameStep>, RenameError> {
    let mut candidates = Vec::new();
    for name in &ctx.rules.extra.whitelisted_in_root {
        let path = ctx.path.join(name);
        if ctx.storage.exists(&path)? && !ctx.storage.is_dir(&path)? {
            candidates.push(path);
        }
    }
    candidates.extend(extra::with_extensions_below_root(ctx)?);

    let mut steps = Vec::new();
    let mut targets = BTreeSet::new();
    for from in candidates {
        let Some(name) = from.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(ctx.name()) {
            continue;
        }
        let to = from.with_file_name(naming::prefix_with_session(ctx.name(), name));
        if ctx.storage.exists(&to)? {
            return Err(RenameError::FileExists {
                path: to,
                source_path: from,
            });
        }
        if !targets.insert(to.clone()) {
            return Err(RenameError::DuplicateTarget { path: to });
        }
        steps.push(RenameStep::Move { from, to });
    }
    Ok(steps)
}

// ---------------------------------------------------------------------------
// Videos
// ---------------------------------------------------------------------------

/// Move the video files into `{session}_cameras` and name them
/// `{session}_camera_{id}`, then require the result to validate.
pub fn rename_videos(ctx: &SessionContext<'_>, dry_run: bool) -> Result<RenameReport, RenameError> {
    let steps = plan_video_renames(ctx)?;
    let report = finish(ctx, steps, dry_run)?;
    if report.applied {
        match video::diagnose(ctx)? {
            VideoDiagnosis::Valid(_) => {}
            other => {
                return Err(RenameError::StillInvalid {
                    path: ctx.path.clone(),
                    source: Box::new(still_invalid(ctx, other)),
                })
            }
        }
    }
    Ok(report)
}

fn still_invalid(ctx: &SessionContext<'_>, diagnosis: VideoDiagnosis) -> crate::ValidationError {
    use crate::error::StructureError;
    let folder = video::canonical_folder(ctx);
    match diagnosis {
        VideoDiagnosis::WrongFilenames { files } => StructureError::BadVideoFilename {
            path: files.into_iter().next().unwrap_or(folder),
            expected_prefix: naming::video_file_prefix(ctx.name()),
        }
        .into(),
        _ => StructureError::FileInUnexpectedLocation {
            path: ctx.path.clone(),
            what: ctx.rules.conventions.video.extension.clone(),
            expected_dir: folder,
        }
        .into(),
    }
}

/// Plan the full remediation for the current video diagnosis.
pub fn plan_video_renames(ctx: &SessionContext<'_>) -> Result<Vec<RenameStep>, RenameError> {
    let folder = video::canonical_folder(ctx);
    match video::diagnose(ctx)? {
        VideoDiagnosis::Valid(_) | VideoDiagnosis::Missing => Ok(Vec::new()),
        VideoDiagnosis::WrongFilenames { files } => {
            let existing = names_in(ctx.storage, &folder)?;
            rename_in_folder(ctx, &folder, &folder, &files, &existing)
        }
        VideoDiagnosis::WrongLocation {
            found,
            videos,
            sidecar,
        } => {
            if ctx.storage.exists(&folder)? {
                return Err(RenameError::FileExists {
                    path: folder,
                    source_path: found,
                });
            }

            if found == ctx.path {
                // loose files in the session root: gather them in a new folder
                let mut steps = vec![RenameStep::CreateDir {
                    path: folder.clone(),
                }];
                let mut targets = BTreeSet::new();
                for from in videos {
                    let name = canonical_video_name(ctx, &from)?;
                    let to = folder.join(name);
                    if !targets.insert(to.clone()) {
                        return Err(RenameError::DuplicateTarget { path: to });
                    }
                    steps.push(RenameStep::Move { from, to });
                }
                if let Some(from) = sidecar {
                    let to = folder.join(&ctx.rules.conventions.video.sidecar);
                    steps.push(RenameStep::Move { from, to });
                }
                Ok(steps)
            } else {
                let mut steps = vec![RenameStep::Move {
                    from: found.clone(),
                    to: folder.clone(),
                }];
                let existing = names_in(ctx.storage, &found)?;
                let prefix = naming::video_file_prefix(ctx.name());
                let misnamed: Vec<PathBuf> = videos
                    .into_iter()
                    .filter(|p| !file_name(p).starts_with(&prefix))
                    .collect();
                steps.extend(rename_in_folder(ctx, &found, &folder, &misnamed, &existing)?);
                Ok(steps)
            }
        }
    }
}

/// In-place renames of `files` (currently in `current_dir`) as they will be
/// named inside `final_dir`. `existing` holds the names already in the folder.
fn rename_in_folder(
    ctx: &SessionContext<'_>,
    current_dir: &Path,
    final_dir: &Path,
    files: &[PathBuf],
    existing: &BTreeSet<String>,
) -> Result<Vec<RenameStep>, RenameError> {
    let mut steps = Vec::new();
    let mut targets = BTreeSet::new();
    for path in files {
        let old = file_name(path);
        let new = canonical_video_name(ctx, path)?;
        if new == old {
            continue;
        }
        if existing.contains(&new) {
            return Err(RenameError::FileExists {
                path: current_dir.join(&new),
                source_path: path.clone(),
            });
        }
        if !targets.insert(new.clone()) {
            return Err(RenameError::DuplicateTarget {
                path: final_dir.join(new),
            });
        }
        steps.push(RenameStep::Move {
            from: final_dir.join(old),
            to: final_dir.join(new),
        });
    }
    Ok(steps)
}

/// `{session}_camera_{id}{ext}`, with the id taken from the trailing `_N` of
/// the current stem.
fn canonical_video_name(ctx: &SessionContext<'_>, path: &Path) -> Result<String, RenameError> {
    let extension = &ctx.rules.conventions.video.extension;
    let name = file_name(path);
    name.strip_suffix(extension.as_str())
        .and_then(naming::camera_id_from_stem)
        .map(|id| naming::video_file(ctx.name(), id, extension))
        .ok_or_else(|| RenameError::UnparseableCameraId {
            path: path.to_path_buf(),
        })
}

fn names_in(storage: &dyn Storage, dir: &Path) -> Result<BTreeSet<String>, RenameError> {
    Ok(storage.list_dir(dir)?.into_iter().map(|e| e.name).collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRules;
    use crate::testutil::{add, build, open, SESSION};
    use bnd_core::LocalStorage;
    use rstest::rstest;

    #[rstest]
    #[case("wrong_filenames", &[
        "M011_2023_04_04_16_00_cameras/Camera_0.avi",
        "M011_2023_04_04_16_00_cameras/Camera_1.avi",
        "M011_2023_04_04_16_00_cameras/metadata.csv",
    ])]
    #[case("wrong_folder", &[
        "M011_2023_04_04_16_00_camera/M011_2023_04_04_16_00_camera_0.avi",
        "M011_2023_04_04_16_00_camera/metadata.csv",
    ])]
    #[case("old_naming", &[
        "cameras/Camera_0.avi",
        "cameras/Camera_1.avi",
        "cameras/metadata.csv",
    ])]
    #[case("in_root", &["Camera_0.avi", "Camera_1.avi", "metadata.csv"])]
    #[case("in_root_partly_named", &[
        "M011_2023_04_04_16_00_camera_0.avi",
        "Camera_1.avi",
        "metadata.csv",
    ])]
    fn video_remediation_is_valid_and_idempotent(#[case] label: &str, #[case] files: &[&str]) {
        let (_tmp, path) = build(files);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);

        assert!(
            !matches!(video::diagnose(&ctx), Ok(VideoDiagnosis::Valid(_))),
            "[{label}] fixture must start invalid"
        );

        let report = rename_videos(&ctx, false).unwrap_or_else(|e| panic!("[{label}] {e}"));
        assert!(report.applied && !report.is_noop(), "[{label}]");
        assert!(
            matches!(video::diagnose(&ctx), Ok(VideoDiagnosis::Valid(_))),
            "[{label}] must be valid after renaming"
        );

        let again = rename_videos(&ctx, false).expect("second run");
        assert!(again.is_noop(), "[{label}] second run must do nothing");
    }

    #[test]
    fn video_dry_run_changes_nothing() {
        let (_tmp, path) = build(&["Camera_0.avi", "metadata.csv"]);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);

        let report = rename_videos(&ctx, true).expect("dry run");
        assert!(!report.applied);
        assert_eq!(
            report.steps,
            vec![
                RenameStep::CreateDir {
                    path: path.join("M011_2023_04_04_16_00_cameras")
                },
                RenameStep::Move {
                    from: path.join("Camera_0.avi"),
                    to: path.join("M011_2023_04_04_16_00_cameras/M011_2023_04_04_16_00_camera_0.avi"),
                },
                RenameStep::Move {
                    from: path.join("metadata.csv"),
                    to: path.join("M011_2023_04_04_16_00_cameras/metadata.csv"),
                },
            ]
        );
        assert!(path.join("Camera_0.avi").exists());
        assert!(!path.join("M011_2023_04_04_16_00_cameras").exists());
    }

    #[test]
    fn video_without_camera_id_is_rejected_before_any_change() {
        let (_tmp, path) = build(&["cameras/front.avi", "cameras/metadata.csv"]);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);

        let err = rename_videos(&ctx, false).unwrap_err();
        assert!(matches!(err, RenameError::UnparseableCameraId { .. }), "got: {err}");
        assert!(path.join("cameras/front.avi").exists());
    }

    #[test]
    fn extra_files_are_prefixed() {
        let (_tmp, path) = build(&[
            "comment.txt",
            "traj_plan.txt",
            "M011_2023_04_04_16_00_g1/trajectory.txt",
            "M011_2023_04_04_16_00_g1/M011_2023_04_04_16_00_channel_map.txt",
        ]);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);

        let report = rename_extra_files(&ctx, false).expect("rename");
        assert_eq!(report.steps.len(), 3);
        for rel in [
            "M011_2023_04_04_16_00_comment.txt",
            "M011_2023_04_04_16_00_traj_plan.txt",
            "M011_2023_04_04_16_00_g1/M011_2023_04_04_16_00_trajectory.txt",
            "M011_2023_04_04_16_00_g1/M011_2023_04_04_16_00_channel_map.txt",
        ] {
            assert!(path.join(rel).exists(), "{rel}");
        }
        assert!(!path.join("comment.txt").exists());

        assert!(rename_extra_files(&ctx, false).expect("again").is_noop());
    }

    #[test]
    fn existing_prefixed_target_aborts_whole_pass() {
        let (_tmp, path) = build(&["traj_plan.txt"]);
        let prefixed = format!("{SESSION}_comment.txt");
        add(&path, &["comment.txt", prefixed.as_str()]);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);

        let err = rename_extra_files(&ctx, false).unwrap_err();
        match err {
            RenameError::FileExists { path: target, .. } => {
                assert!(target.ends_with("M011_2023_04_04_16_00_comment.txt"))
            }
            other => panic!("expected FileExists, got {other:?}"),
        }
        // planning failed, so traj_plan.txt was not renamed either
        assert!(path.join("traj_plan.txt").exists());
    }
}
