//! Video data: one `{session}_cameras` folder holding the camera files and a
//! single sidecar metadata file.
//!
//! The check is expressed as a typed [`VideoDiagnosis`] so the rename pass can
//! tell "right content, wrong location" from "right location, wrong names"
//! without inspecting error text.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bnd_core::naming::{self, is_hidden};
use bnd_core::{DataKind, FileManifest};

use crate::error::{StructureError, ValidationError};
use crate::report::Warning;
use crate::schema::Validator;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoSchema;

/// What the video check found, for states that have a remedy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoDiagnosis {
    Valid(FileManifest),
    /// No video files, no sidecar and no video folder anywhere.
    Missing,
    /// All video files and the sidecar sit together in `found`, which is not
    /// the canonical folder (it may be the session root itself).
    WrongLocation {
        found: PathBuf,
        videos: Vec<PathBuf>,
        sidecar: Option<PathBuf>,
    },
    /// The canonical folder is right but these files lack the session prefix.
    WrongFilenames { files: Vec<PathBuf> },
}

impl Validator for VideoSchema {
    fn validate(
        &self,
        ctx: &SessionContext<'_>,
        _warnings: &mut Vec<Warning>,
    ) -> Result<FileManifest, ValidationError> {
        let folder = canonical_folder(ctx);
        match diagnose(ctx)? {
            VideoDiagnosis::Valid(manifest) => Ok(manifest),
            VideoDiagnosis::Missing => Err(ValidationError::MissingData {
                kind: DataKind::Video,
                path: ctx.path.clone(),
            }),
            VideoDiagnosis::WrongLocation { videos, sidecar, .. } => {
                let path = videos.into_iter().next().or(sidecar).unwrap_or(folder.clone());
                Err(StructureError::FileInUnexpectedLocation {
                    path,
                    what: ctx.rules.conventions.video.extension.clone(),
                    expected_dir: folder,
                }
                .into())
            }
            VideoDiagnosis::WrongFilenames { files } => Err(StructureError::BadVideoFilename {
                path: files.into_iter().next().unwrap_or(folder),
                expected_prefix: naming::video_file_prefix(ctx.name()),
            }
            .into()),
        }
    }
}

/// `<session>/{session}_cameras`
pub fn canonical_folder(ctx: &SessionContext<'_>) -> PathBuf {
    ctx.path.join(naming::video_folder(ctx.name()))
}

/// Classify the session's video data.
///
/// Errors are returned for states with no automatic remedy: videos spread
/// over several folders, a missing or duplicated sidecar, an empty canonical
/// folder.
pub fn diagnose(ctx: &SessionContext<'_>) -> Result<VideoDiagnosis, ValidationError> {
    let conventions = &ctx.rules.conventions.video;
    let folder = canonical_folder(ctx);

    let mut videos = Vec::new();
    let mut sidecars = Vec::new();
    for path in ctx.storage.walk_files(&ctx.path)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_hidden(name) {
            continue;
        }
        if name.ends_with(&conventions.extension) {
            videos.push(path);
        } else if name == conventions.sidecar {
            sidecars.push(path);
        }
    }

    let stray = |p: &PathBuf| p.parent() != Some(folder.as_path());
    if videos.iter().chain(&sidecars).any(stray) {
        return diagnose_stray(ctx, &folder, videos, sidecars);
    }

    if !ctx.storage.is_dir(&folder)? {
        return Ok(VideoDiagnosis::Missing);
    }
    if videos.is_empty() {
        return Err(StructureError::MissingVideoFiles {
            dir: folder,
            extension: conventions.extension.clone(),
        }
        .into());
    }
    check_sidecar(ctx, &folder)?;

    let prefix = naming::video_file_prefix(ctx.name());
    let misnamed: Vec<PathBuf> = videos
        .iter()
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .cloned()
        .collect();
    if !misnamed.is_empty() {
        return Ok(VideoDiagnosis::WrongFilenames { files: misnamed });
    }

    videos.extend(sidecars);
    Ok(VideoDiagnosis::Valid(FileManifest::new(DataKind::Video, videos)))
}

/// Video data exists outside the canonical folder.
fn diagnose_stray(
    ctx: &SessionContext<'_>,
    folder: &Path,
    videos: Vec<PathBuf>,
    mut sidecars: Vec<PathBuf>,
) -> Result<VideoDiagnosis, ValidationError> {
    let conventions = &ctx.rules.conventions.video;
    let parents: BTreeSet<PathBuf> = videos
        .iter()
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();

    let found = match parents.len() {
        0 => {
            // a sidecar without any video
            let path = sidecars.swap_remove(0);
            return Err(StructureError::FileInUnexpectedLocation {
                path,
                what: conventions.sidecar.clone(),
                expected_dir: folder.to_path_buf(),
            }
            .into());
        }
        1 => parents.into_iter().next().unwrap_or_default(),
        _ => {
            return Err(StructureError::MultipleVideoFolders {
                folders: parents.into_iter().collect(),
            }
            .into())
        }
    };

    if found == folder {
        // videos are in place, so the stray one is the sidecar
        let path = sidecars
            .into_iter()
            .find(|p| p.parent() != Some(folder))
            .unwrap_or_else(|| folder.to_path_buf());
        return Err(StructureError::FileInUnexpectedLocation {
            path,
            what: conventions.sidecar.clone(),
            expected_dir: folder.to_path_buf(),
        }
        .into());
    }

    if let Some(misplaced) = sidecars.iter().find(|p| p.parent() != Some(found.as_path())) {
        return Err(StructureError::FileInUnexpectedLocation {
            path: misplaced.clone(),
            what: conventions.sidecar.clone(),
            expected_dir: found,
        }
        .into());
    }
    if sidecars.len() != 1 {
        return Err(StructureError::BadSidecar {
            dir: found,
            expected: conventions.sidecar.clone(),
            found: Vec::new(),
        }
        .into());
    }

    Ok(VideoDiagnosis::WrongLocation {
        found,
        videos,
        sidecar: sidecars.pop(),
    })
}

/// After removing the videos, exactly the sidecar must remain in the folder.
fn check_sidecar(ctx: &SessionContext<'_>, folder: &Path) -> Result<(), ValidationError> {
    let conventions = &ctx.rules.conventions.video;
    let others: Vec<String> = ctx
        .storage
        .list_dir(folder)?
        .into_iter()
        .filter(|e| !is_hidden(&e.name))
        .filter(|e| e.is_dir || !e.name.ends_with(&conventions.extension))
        .map(|e| e.name)
        .collect();
    if others.len() != 1 || others[0] != conventions.sidecar {
        return Err(StructureError::BadSidecar {
            dir: folder.to_path_buf(),
            expected: conventions.sidecar.clone(),
            found: others,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRules;
    use crate::testutil::{build, open, VALID_VIDEO};
    use bnd_core::LocalStorage;
    use rstest::rstest;

    fn diagnose_tree(files: &[&str]) -> Result<VideoDiagnosis, ValidationError> {
        let (_tmp, path) = build(files);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);
        diagnose(&ctx)
    }

    #[test]
    fn canonical_tree_is_valid() {
        match diagnose_tree(VALID_VIDEO).expect("diagnose") {
            VideoDiagnosis::Valid(manifest) => assert_eq!(manifest.len(), 3),
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[test]
    fn absent_videos_are_missing() {
        assert_eq!(
            diagnose_tree(&["M011_2023_04_04_16_00_adaptation.txt"]).unwrap(),
            VideoDiagnosis::Missing
        );
    }

    #[test]
    fn missing_videos_validate_as_missing_data() {
        let (_tmp, path) = build(&[]);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);
        let err = VideoSchema.validate(&ctx, &mut Vec::new()).unwrap_err();
        assert!(err.is_missing_data(), "got: {err}");
    }

    #[rstest]
    #[case("wrong_folder", &["cameras/Camera_0.avi", "cameras/metadata.csv"], "cameras")]
    #[case("in_root", &["Camera_0.avi", "Camera_1.avi", "metadata.csv"], "")]
    fn wrong_location(#[case] label: &str, #[case] files: &[&str], #[case] dir: &str) {
        match diagnose_tree(files).expect("diagnose") {
            VideoDiagnosis::WrongLocation { found, sidecar, .. } => {
                assert!(found.ends_with(format!("M011_2023_04_04_16_00/{dir}").trim_end_matches('/')), "[{label}] {found:?}");
                assert!(sidecar.is_some(), "[{label}]");
            }
            other => panic!("[{label}] expected WrongLocation, got {other:?}"),
        }
    }

    #[test]
    fn wrong_location_validates_as_unexpected_location() {
        let (_tmp, path) = build(&["cameras/Camera_0.avi", "cameras/metadata.csv"]);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);
        let err = VideoSchema.validate(&ctx, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("unexpected location"), "got: {err}");
        assert!(err.to_string().contains(".avi"), "got: {err}");
    }

    #[test]
    fn wrong_filenames_in_canonical_folder() {
        let diagnosis = diagnose_tree(&[
            "M011_2023_04_04_16_00_cameras/Camera_0.avi",
            "M011_2023_04_04_16_00_cameras/M011_2023_04_04_16_00_camera_1.avi",
            "M011_2023_04_04_16_00_cameras/metadata.csv",
        ])
        .expect("diagnose");
        match diagnosis {
            VideoDiagnosis::WrongFilenames { files } => {
                assert_eq!(files.len(), 1);
                assert!(files[0].ends_with("Camera_0.avi"));
            }
            other => panic!("expected WrongFilenames, got {other:?}"),
        }
    }

    #[test]
    fn empty_canonical_folder_has_no_videos() {
        let err = diagnose_tree(&["M011_2023_04_04_16_00_cameras/metadata.csv"]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Structure(StructureError::MissingVideoFiles { .. })
        ));
    }

    #[rstest]
    #[case("no_sidecar", &["M011_2023_04_04_16_00_cameras/M011_2023_04_04_16_00_camera_0.avi"])]
    #[case("extra_file", &[
        "M011_2023_04_04_16_00_cameras/M011_2023_04_04_16_00_camera_0.avi",
        "M011_2023_04_04_16_00_cameras/metadata.csv",
        "M011_2023_04_04_16_00_cameras/notes.json",
    ])]
    fn sidecar_must_be_alone(#[case] label: &str, #[case] files: &[&str]) {
        let err = diagnose_tree(files).unwrap_err();
        assert!(
            matches!(err, ValidationError::Structure(StructureError::BadSidecar { .. })),
            "[{label}] got: {err}"
        );
    }

    #[test]
    fn stray_video_next_to_canonical_folder() {
        let mut files = VALID_VIDEO.to_vec();
        files.push("old/Camera_9.avi");
        let err = diagnose_tree(&files).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Structure(StructureError::MultipleVideoFolders { .. })
        ));
    }

    #[test]
    fn stray_sidecar_is_rejected() {
        let mut files = VALID_VIDEO.to_vec();
        files.push("metadata.csv");
        let err = diagnose_tree(&files).unwrap_err();
        match err {
            ValidationError::Structure(StructureError::FileInUnexpectedLocation { path, .. }) => {
                assert!(path.ends_with("M011_2023_04_04_16_00/metadata.csv"))
            }
            other => panic!("expected FileInUnexpectedLocation, got {other:?}"),
        }
    }
}
