//! Config error-message, atomic-write-safety, and init integration tests.
//! Storage: ~/.bnd/config.yaml

use assert_fs::prelude::*;
use bnd_core::{config, ConfigError};
use predicates::prelude::predicate;
use std::fs;
use std::path::PathBuf;

fn write_config(home: &assert_fs::TempDir, body: &[u8]) {
    let dir = config::config_dir_at(home.path());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(config::config_path_at(home.path()), body).expect("write");
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_points_at_init() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.yaml"), "got: {msg}");
    assert!(msg.contains("bnd init"), "got: {msg}");
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, b": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_without_required_roots_is_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, b"local_path: /data/local\n");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("remote_path"), "got: {err}");
}

#[test]
fn overridden_conventions_are_loaded() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        b"local_path: /l\nremote_path: /r\nextensions_to_rename_and_upload: ['.txt', '.json']\nconventions:\n  video:\n    extension: .mp4\n    sidecar: metadata.csv\n",
    );

    let cfg = config::load_at(home.path()).expect("load");
    assert_eq!(cfg.extra_rules().extensions, vec![".txt", ".json"]);
    assert_eq!(cfg.conventions.video.extension, ".mp4");
    assert_eq!(cfg.conventions.behavior.script_folder, "run_task-task_files");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = config::Config::new(PathBuf::from("/l"), PathBuf::from("/r"));
    config::save_at(home.path(), &cfg).expect("save");

    let path = config::config_path_at(home.path());
    let original = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_file_name("config.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original, fs::read(&path).expect("read after crash"));
    assert_eq!(config::load_at(home.path()).expect("load"), cfg);
}

// ---------------------------------------------------------------------------
// 3. Init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_with_0600() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path(), PathBuf::from("/l"), PathBuf::from("/r"), false).expect("init");

    home.child(".bnd/config.yaml").assert(predicate::path::exists());
    home.child(".bnd/config.yaml")
        .assert(predicate::str::contains("treadmill-calibration"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = config::config_path_at(home.path());
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}
