//! User configuration stored as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.bnd/            (mode 0700)
//!   config.yaml      (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Conventions, ExtraFileRules, ProcessingLevel};

/// Root-level configuration. Only the two storage roots are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Local storage root, containing `raw/` and `processed/`.
    pub local_path: PathBuf,
    /// Remote storage root (usually a network mount), same layout.
    pub remote_path: PathBuf,
    /// Directories at subject level that are not subjects.
    #[serde(default = "default_ignored_subject_level_dirs")]
    pub ignored_subject_level_dirs: Vec<String>,
    #[serde(default = "default_whitelisted_files_in_root")]
    pub whitelisted_files_in_root: Vec<String>,
    #[serde(default = "default_extensions_to_rename_and_upload")]
    pub extensions_to_rename_and_upload: Vec<String>,
    #[serde(default)]
    pub conventions: Conventions,
}

impl Config {
    /// A config with default conventions for the given roots.
    pub fn new(local_path: PathBuf, remote_path: PathBuf) -> Self {
        Self {
            local_path,
            remote_path,
            ignored_subject_level_dirs: default_ignored_subject_level_dirs(),
            whitelisted_files_in_root: default_whitelisted_files_in_root(),
            extensions_to_rename_and_upload: default_extensions_to_rename_and_upload(),
            conventions: Conventions::default(),
        }
    }

    /// The extra-file rules to thread into validator and renamer calls.
    pub fn extra_rules(&self) -> ExtraFileRules {
        ExtraFileRules {
            whitelisted_in_root: self.whitelisted_files_in_root.clone(),
            extensions: self.extensions_to_rename_and_upload.clone(),
        }
    }

    /// `<local_path>/<level>/<subject>`
    pub fn local_subject_dir(&self, level: ProcessingLevel, subject: &str) -> PathBuf {
        self.local_path.join(level.dir_name()).join(subject)
    }

    /// `<remote_path>/<level>/<subject>`
    pub fn remote_subject_dir(&self, level: ProcessingLevel, subject: &str) -> PathBuf {
        self.remote_path.join(level.dir_name()).join(subject)
    }
}

fn default_ignored_subject_level_dirs() -> Vec<String> {
    vec!["treadmill-calibration".to_string()]
}

fn default_whitelisted_files_in_root() -> Vec<String> {
    ExtraFileRules::default().whitelisted_in_root
}

fn default_extensions_to_rename_and_upload() -> Vec<String> {
    ExtraFileRules::default().extensions
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.bnd/`: pure, no I/O.
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".bnd")
}

/// `<home>/.bnd/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.bnd/config.yaml`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    tracing::debug!("wrote {}", path.display());
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Create the config file for the given roots.
///
/// Idempotent unless `overwrite`: an existing file is loaded and returned
/// unchanged.
pub fn init_at(
    home: &Path,
    local_path: PathBuf,
    remote_path: PathBuf,
    overwrite: bool,
) -> Result<Config, ConfigError> {
    if config_path_at(home).exists() && !overwrite {
        return load_at(home);
    }
    let config = Config::new(local_path, remote_path);
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(local_path: PathBuf, remote_path: PathBuf, overwrite: bool) -> Result<Config, ConfigError> {
    init_at(&home()?, local_path, remote_path, overwrite)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
