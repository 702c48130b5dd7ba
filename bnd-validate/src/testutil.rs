//! Fixture trees for unit tests.

use std::fs;
use std::path::{Path, PathBuf};

use bnd_core::{Storage, SubjectName};
use tempfile::TempDir;

use crate::session::{SessionContext, SessionRules};

pub const SUBJECT: &str = "M011";
pub const SESSION: &str = "M011_2023_04_04_16_00";

pub const VALID_BEHAVIOR: &[&str] = &[
    "M011_2023_04_04_16_00_adaptation.txt",
    "M011_2023_04_04_16_00_MotSen1-X.pca",
    "M011_2023_04_04_16_00_MotSen1-Y.pca",
    "run_task-task_files/task.py",
];

pub const VALID_EPHYS: &[&str] = &[
    "M011_2023_04_04_16_00_g0/M011_2023_04_04_16_00_g0_imec0/M011_2023_04_04_16_00_g0_t0.imec0.lf.meta",
    "M011_2023_04_04_16_00_g0/M011_2023_04_04_16_00_g0_imec0/M011_2023_04_04_16_00_g0_t0.imec0.lf.bin",
    "M011_2023_04_04_16_00_g0/M011_2023_04_04_16_00_g0_imec0/M011_2023_04_04_16_00_g0_t0.imec0.ap.meta",
    "M011_2023_04_04_16_00_g0/M011_2023_04_04_16_00_g0_imec0/M011_2023_04_04_16_00_g0_t0.imec0.ap.bin",
];

pub const VALID_VIDEO: &[&str] = &[
    "M011_2023_04_04_16_00_cameras/M011_2023_04_04_16_00_camera_0.avi",
    "M011_2023_04_04_16_00_cameras/M011_2023_04_04_16_00_camera_1.avi",
    "M011_2023_04_04_16_00_cameras/metadata.csv",
];

/// Create `<tmp>/raw/M011/M011_2023_04_04_16_00` holding `files` (relative
/// paths; a trailing `/` makes an empty directory). Every file's content is
/// its own relative path.
pub fn build(files: &[&str]) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let session = tmp.path().join("raw").join(SUBJECT).join(SESSION);
    fs::create_dir_all(&session).expect("mkdir session");
    add(&session, files);
    (tmp, session)
}

pub fn add(session: &Path, files: &[&str]) {
    for rel in files {
        let path = session.join(rel);
        if rel.ends_with('/') {
            fs::create_dir_all(&path).expect("mkdir");
        } else {
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir parent");
            fs::write(&path, rel.as_bytes()).expect("write");
        }
    }
}

pub fn open<'a>(
    storage: &'a dyn Storage,
    path: &Path,
    rules: &'a SessionRules,
) -> SessionContext<'a> {
    SessionContext::open(storage, path, &SubjectName::from(SUBJECT), rules).expect("open session")
}
