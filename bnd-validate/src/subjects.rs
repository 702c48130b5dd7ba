//! Subject-level queries and batch validation.

use std::path::{Path, PathBuf};

use bnd_core::naming::is_hidden;
use bnd_core::{DataKind, SessionName, Storage, StorageError, SubjectName};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ValidationError;
use crate::report::ValidationReport;
use crate::session::{validate_session, SessionRules};

/// A folder whose name is a valid session of its subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFolder {
    pub session: SessionName,
    pub path: PathBuf,
}

/// Session folders of one subject, split by whether their name parses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionListing {
    pub valid: Vec<SessionFolder>,
    pub invalid: Vec<PathBuf>,
}

/// List the folders in `subject_dir`, sorted by name.
pub fn list_subject_sessions(
    storage: &dyn Storage,
    subject_dir: &Path,
    subject: &SubjectName,
) -> Result<SessionListing, StorageError> {
    let mut listing = SessionListing::default();
    for entry in storage.list_dir(subject_dir)? {
        if !entry.is_dir || is_hidden(&entry.name) {
            continue;
        }
        match SessionName::parse(&entry.name, subject) {
            Ok(session) => listing.valid.push(SessionFolder {
                session,
                path: entry.path,
            }),
            Err(err) => {
                tracing::debug!(path = %entry.path.display(), "not a session folder: {err}");
                listing.invalid.push(entry.path);
            }
        }
    }
    Ok(listing)
}

/// The valid session with the latest timestamp.
pub fn last_session(
    storage: &dyn Storage,
    subject_dir: &Path,
    subject: &SubjectName,
) -> Result<SessionFolder, ValidationError> {
    list_subject_sessions(storage, subject_dir, subject)?
        .valid
        .into_iter()
        .max_by_key(|f| f.session.timestamp())
        .ok_or_else(|| ValidationError::NoSessions {
            subject: subject.to_string(),
            path: subject_dir.to_path_buf(),
        })
}

/// `(subject, session)` pairs of every valid session recorded on `day`, over
/// all subject folders in `level_dir`.
pub fn sessions_on_day(
    storage: &dyn Storage,
    level_dir: &Path,
    day: NaiveDate,
    ignored_subject_dirs: &[String],
) -> Result<Vec<(SubjectName, SessionName)>, StorageError> {
    let mut found = Vec::new();
    for entry in storage.list_dir(level_dir)? {
        if !entry.is_dir || is_hidden(&entry.name) || ignored_subject_dirs.contains(&entry.name) {
            continue;
        }
        let subject = SubjectName::from(entry.name.as_str());
        for folder in list_subject_sessions(storage, &entry.path, &subject)?.valid {
            if folder.session.timestamp().date() == day {
                found.push((subject.clone(), folder.session));
            }
        }
    }
    Ok(found)
}

/// Outcome of validating one entry of a subject folder.
#[derive(Debug)]
pub struct SessionOutcome {
    pub name: String,
    pub path: PathBuf,
    pub result: Result<ValidationReport, ValidationError>,
}

/// Summary row of a [`SessionOutcome`], for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub name: String,
    pub path: PathBuf,
    pub valid: bool,
    pub files: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl SessionOutcome {
    pub fn summary(&self) -> OutcomeSummary {
        let (valid, files, warnings, error) = match &self.result {
            Ok(report) => (
                true,
                report.file_count(),
                report.warnings.iter().map(ToString::to_string).collect(),
                None,
            ),
            Err(err) => (false, 0, Vec::new(), Some(err.to_string())),
        };
        OutcomeSummary {
            name: self.name.clone(),
            path: self.path.clone(),
            valid,
            files,
            warnings,
            error,
        }
    }
}

/// Validate every entry of `subject_dir` as a session.
///
/// Failures are isolated per session: one bad session never stops the
/// remaining ones. Hidden entries and `.profile` files are skipped.
pub fn validate_subject_sessions(
    storage: &dyn Storage,
    subject_dir: &Path,
    subject: &SubjectName,
    kinds: &[DataKind],
    rules: &SessionRules,
) -> Result<Vec<SessionOutcome>, StorageError> {
    let mut outcomes = Vec::new();
    for entry in storage.list_dir(subject_dir)? {
        if is_hidden(&entry.name) || entry.name.ends_with(".profile") {
            continue;
        }
        let result = validate_session(storage, &entry.path, subject, kinds, rules);
        if let Err(err) = &result {
            tracing::warn!(session = %entry.name, "invalid session: {err}");
        }
        outcomes.push(SessionOutcome {
            name: entry.name,
            path: entry.path,
            result,
        });
    }
    Ok(outcomes)
}
