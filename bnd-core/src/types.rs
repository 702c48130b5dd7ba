//! Domain types for experimental-session data.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Everything here is derived from the filesystem on demand; nothing is persisted
//! except [`Conventions`], which is part of the config file.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::NamingError;
use crate::naming;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A short subject code such as `M017`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectName(pub String);

impl SubjectName {
    /// Checked constructor: rejects empty names and names containing path separators.
    pub fn parse(s: &str) -> Result<Self, NamingError> {
        if s.is_empty() || s.contains(&['/', '\\'][..]) || s == "." || s == ".." {
            return Err(NamingError::InvalidSubject(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SubjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The identity of a session: `(subject, timestamp)`.
///
/// Its folder name is the single canonical serialization of that identity, so
/// two values are equal exactly when their folder names are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionName {
    name: String,
    subject: SubjectName,
    timestamp: NaiveDateTime,
}

impl SessionName {
    /// Build a session name. Seconds and sub-second precision are dropped, since
    /// the folder name only carries minutes.
    pub fn new(subject: SubjectName, timestamp: NaiveDateTime) -> Self {
        let timestamp = timestamp
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(timestamp);
        let name = naming::format_session(subject.as_str(), timestamp);
        Self {
            name,
            subject,
            timestamp,
        }
    }

    /// Parse a folder name, requiring it to be the canonical form for `subject`.
    pub fn parse(name: &str, subject: &SubjectName) -> Result<Self, NamingError> {
        let timestamp = naming::parse_session(name, subject.as_str())?;
        Ok(Self {
            name: name.to_owned(),
            subject: subject.clone(),
            timestamp,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The top-level tree a session lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingLevel {
    #[default]
    Raw,
    Processed,
}

impl ProcessingLevel {
    pub fn dir_name(self) -> &'static str {
        match self {
            ProcessingLevel::Raw => "raw",
            ProcessingLevel::Processed => "processed",
        }
    }
}

impl fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for ProcessingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "processed" => Ok(Self::Processed),
            other => Err(format!(
                "invalid value for processing level '{other}'; expected: raw, processed"
            )),
        }
    }
}

/// One kind of data in a session. `Extra` is always resolved and cannot be
/// requested on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Behavior,
    Ephys,
    Video,
    Extra,
}

impl DataKind {
    /// Kinds a caller may ask to validate or transfer.
    pub const SELECTABLE: [DataKind; 3] = [DataKind::Behavior, DataKind::Ephys, DataKind::Video];
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Behavior => write!(f, "behavior"),
            DataKind::Ephys => write!(f, "ephys"),
            DataKind::Video => write!(f, "video"),
            DataKind::Extra => write!(f, "extra"),
        }
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "behavior" | "behaviour" => Ok(Self::Behavior),
            "ephys" => Ok(Self::Ephys),
            "video" | "videos" => Ok(Self::Video),
            other => Err(format!(
                "unknown data kind '{other}'; expected: behavior, ephys, video"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// The flat, ordered list of files that make up one data kind of one session.
///
/// Produced fresh by every validation call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileManifest {
    pub kind: DataKind,
    files: Vec<PathBuf>,
}

impl FileManifest {
    /// Build a manifest; files are sorted and de-duplicated.
    pub fn new(kind: DataKind, mut files: Vec<PathBuf>) -> Self {
        files.sort();
        files.dedup();
        Self { kind, files }
    }

    pub fn empty(kind: DataKind) -> Self {
        Self {
            kind,
            files: Vec::new(),
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.binary_search_by(|p| p.as_path().cmp(path)).is_ok()
    }

    pub fn to_set(&self) -> BTreeSet<PathBuf> {
        self.files.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Conventions
// ---------------------------------------------------------------------------

/// Which loosely-named files count as "extra" files of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFileRules {
    /// Filenames allowed in the session root (bare or session-prefixed).
    pub whitelisted_in_root: Vec<String>,
    /// Extensions picked up anywhere below the session root.
    pub extensions: Vec<String>,
}

impl Default for ExtraFileRules {
    fn default() -> Self {
        Self {
            whitelisted_in_root: vec![
                "comment.txt".to_string(),
                "traj_plan.txt".to_string(),
                "trajectory.txt".to_string(),
                "channel_map.txt".to_string(),
            ],
            extensions: vec![".txt".to_string()],
        }
    }
}

/// One behavioral file type: its extension, the regex its name must end with
/// after the session name, and how many are expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorFileRule {
    pub extension: String,
    pub suffix_pattern: String,
    pub expected_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorConventions {
    pub files: Vec<BehaviorFileRule>,
    pub script_folder: String,
    pub script_extension: String,
}

impl Default for BehaviorConventions {
    fn default() -> Self {
        Self {
            files: vec![
                BehaviorFileRule {
                    extension: ".txt".to_string(),
                    suffix_pattern: r"\.txt".to_string(),
                    expected_count: 1,
                },
                BehaviorFileRule {
                    extension: ".pca".to_string(),
                    suffix_pattern: r"_MotSen\d-(X|Y)\.pca".to_string(),
                    expected_count: 2,
                },
            ],
            script_folder: "run_task-task_files".to_string(),
            script_extension: ".py".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConventions {
    pub extension: String,
    pub sidecar: String,
}

impl Default for VideoConventions {
    fn default() -> Self {
        Self {
            extension: ".avi".to_string(),
            sidecar: "metadata.csv".to_string(),
        }
    }
}

/// File conventions for the per-kind schemas. Defaults follow the lab layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Conventions {
    #[serde(default)]
    pub behavior: BehaviorConventions,
    #[serde(default)]
    pub video: VideoConventions,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
