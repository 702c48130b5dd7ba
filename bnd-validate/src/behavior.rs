//! Behavioral data: the task log, the motion-sensor files and the optional
//! task-script folder, all in the session root.

use bnd_core::naming::is_hidden;
use bnd_core::{BehaviorFileRule, DataKind, FileManifest};
use regex::Regex;

use crate::error::{StructureError, ValidationError};
use crate::report::Warning;
use crate::schema::Validator;
use crate::session::{warn, SessionContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorSchema;

impl Validator for BehaviorSchema {
    fn validate(
        &self,
        ctx: &SessionContext<'_>,
        warnings: &mut Vec<Warning>,
    ) -> Result<FileManifest, ValidationError> {
        let conventions = &ctx.rules.conventions.behavior;
        let root_files: Vec<_> = ctx
            .storage
            .list_dir(&ctx.path)?
            .into_iter()
            .filter(|e| !e.is_dir && !is_hidden(&e.name))
            .collect();

        let mut files = Vec::new();
        for rule in &conventions.files {
            let pattern = filename_pattern(ctx.name(), rule)?;
            let mut found = 0;
            for entry in root_files.iter().filter(|e| e.name.ends_with(&rule.extension)) {
                if ctx.is_whitelisted_root_file(&entry.name) {
                    continue;
                }
                if !pattern.is_match(&entry.name) {
                    return Err(StructureError::UnexpectedFilename {
                        path: entry.path.clone(),
                        expected: pattern.as_str().to_owned(),
                    }
                    .into());
                }
                found += 1;
                files.push(entry.path.clone());
            }
            if found != rule.expected_count {
                return Err(StructureError::WrongFileCount {
                    dir: ctx.path.clone(),
                    extension: rule.extension.clone(),
                    expected: rule.expected_count,
                    found,
                }
                .into());
            }
        }

        let script_dir = ctx.path.join(&conventions.script_folder);
        if ctx.storage.is_dir(&script_dir)? {
            let scripts: Vec<_> = ctx
                .storage
                .list_dir(&script_dir)?
                .into_iter()
                .filter(|e| !e.is_dir && e.name.ends_with(&conventions.script_extension))
                .collect();
            match scripts.len() {
                0 => {
                    return Err(StructureError::MissingScript {
                        dir: script_dir,
                        extension: conventions.script_extension.clone(),
                    }
                    .into())
                }
                1 => files.push(scripts[0].path.clone()),
                n => {
                    return Err(StructureError::TooManyScripts {
                        dir: script_dir,
                        extension: conventions.script_extension.clone(),
                        found: n,
                    }
                    .into())
                }
            }
        } else if ctx.warn_if_absent {
            warn(warnings, Warning::NoTaskScriptFolder { path: script_dir });
        }

        Ok(FileManifest::new(DataKind::Behavior, files))
    }
}

/// `^{session}.*{suffix}$`
fn filename_pattern(session: &str, rule: &BehaviorFileRule) -> Result<Regex, ValidationError> {
    let pattern = format!("^{}.*{}$", regex::escape(session), rule.suffix_pattern);
    Regex::new(&pattern).map_err(|source| ValidationError::Pattern { pattern, source })
}
