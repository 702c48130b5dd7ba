//! Electrophysiology recordings: `{session}_g{N}` folders holding one
//! `{recording}_imec{d}` folder per probe, each with exactly four data files.
//!
//! A recording folder is either absent or fully well-formed. Hidden files and
//! files carrying a configured extra-file extension (probe trajectories and
//! channel maps are written next to the recording) are left out of both
//! checks; they belong to the extra-file resolution, not to this manifest.
//! With no extra-file extensions configured both checks are fully strict.

use std::collections::BTreeSet;
use std::path::PathBuf;

use bnd_core::naming::{self, is_hidden};
use bnd_core::{DataKind, FileManifest};

use crate::error::{StructureError, ValidationError};
use crate::report::Warning;
use crate::schema::Validator;
use crate::session::{warn, SessionContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EphysSchema;

/// A recording folder that follows the naming grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub path: PathBuf,
    pub name: String,
    pub index: u32,
}

impl Validator for EphysSchema {
    fn validate(
        &self,
        ctx: &SessionContext<'_>,
        warnings: &mut Vec<Warning>,
    ) -> Result<FileManifest, ValidationError> {
        let recordings = find_recordings(ctx)?;
        if recordings.len() > 1 {
            warn(
                warnings,
                Warning::MultipleRecordings {
                    session: ctx.path.clone(),
                    count: recordings.len(),
                },
            );
        }

        let mut files = Vec::new();
        for recording in &recordings {
            files.extend(validate_recording(ctx, recording)?);
        }
        check_no_orphaned_data(ctx, &files)?;
        Ok(FileManifest::new(DataKind::Ephys, files))
    }
}

/// Folders in the session root that end in `_g<N>`, each required to be a
/// recording of this very session.
pub fn find_recordings(ctx: &SessionContext<'_>) -> Result<Vec<Recording>, ValidationError> {
    let mut recordings = Vec::new();
    for entry in ctx.storage.list_dir(&ctx.path)? {
        if !entry.is_dir || !looks_like_recording(&entry.name) {
            continue;
        }
        let index = naming::parse_recording(&entry.name, ctx.name())?;
        recordings.push(Recording {
            path: entry.path,
            name: entry.name,
            index,
        });
    }
    Ok(recordings)
}

fn looks_like_recording(name: &str) -> bool {
    name.rsplit_once("_g")
        .is_some_and(|(_, digits)| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn validate_recording(
    ctx: &SessionContext<'_>,
    recording: &Recording,
) -> Result<Vec<PathBuf>, ValidationError> {
    let mut files = Vec::new();
    for entry in ctx.storage.list_dir(&recording.path)? {
        if is_hidden(&entry.name) || (!entry.is_dir && ctx.has_extra_extension(&entry.name)) {
            continue;
        }
        if !entry.is_dir {
            return Err(StructureError::UnexpectedEntry {
                path: entry.path,
                expected: format!("only probe folders named {}_imec<d>", recording.name),
            }
            .into());
        }
        let probe = naming::parse_probe_folder(&entry.name, &recording.name).map_err(|source| {
            StructureError::BadProbeFolder {
                path: entry.path.clone(),
                source,
            }
        })?;
        files.extend(validate_probe(ctx, recording, &entry.path, probe)?);
    }
    Ok(files)
}

/// The probe folder's data files must be exactly the four expected names.
fn validate_probe(
    ctx: &SessionContext<'_>,
    recording: &Recording,
    dir: &std::path::Path,
    probe: u8,
) -> Result<Vec<PathBuf>, ValidationError> {
    let mut found = BTreeSet::new();
    for entry in ctx.storage.list_dir(dir)? {
        if is_hidden(&entry.name) {
            continue;
        }
        if entry.is_dir {
            return Err(StructureError::UnexpectedEntry {
                path: entry.path,
                expected: "only data files inside a probe folder".to_owned(),
            }
            .into());
        }
        if ctx.has_extra_extension(&entry.name) && !naming::is_probe_data_file(&entry.name) {
            continue;
        }
        found.insert(entry.name);
    }

    let expected: BTreeSet<String> = naming::probe_data_files(&recording.name, probe)
        .into_iter()
        .collect();
    if found != expected {
        return Err(StructureError::ProbeFilesMismatch {
            dir: dir.to_path_buf(),
            missing: expected.difference(&found).cloned().collect(),
            unexpected: found.difference(&expected).cloned().collect(),
        }
        .into());
    }
    Ok(expected.iter().map(|name| dir.join(name)).collect())
}

/// Every raw probe data file in the session tree must be one of the files
/// the folder-based scan accepted.
fn check_no_orphaned_data(ctx: &SessionContext<'_>, accepted: &[PathBuf]) -> Result<(), ValidationError> {
    let accepted: BTreeSet<&PathBuf> = accepted.iter().collect();
    for path in ctx.storage.walk_files(&ctx.path)? {
        let is_data = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(naming::is_probe_data_file);
        if is_data && !accepted.contains(&path) {
            let recording = format!("{}_g<N>", ctx.name());
            return Err(StructureError::FileInUnexpectedLocation {
                path,
                what: "raw ephys".to_owned(),
                expected_dir: ctx.path.join(&recording).join(format!("{recording}_imec<d>")),
            }
            .into());
        }
    }
    Ok(())
}
