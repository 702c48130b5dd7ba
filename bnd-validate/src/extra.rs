//! Extra files: whitelisted names in the session root, plus any file with an
//! allowed extension below the root.
//!
//! Root and non-root files are found by separate rules so that nothing is
//! counted twice.

use std::path::PathBuf;

use bnd_core::naming::{self, is_hidden};
use bnd_core::{DataKind, FileManifest, StorageError};

use crate::error::ValidationError;
use crate::report::Warning;
use crate::schema::Validator;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtraSchema;

impl Validator for ExtraSchema {
    fn validate(
        &self,
        ctx: &SessionContext<'_>,
        _warnings: &mut Vec<Warning>,
    ) -> Result<FileManifest, ValidationError> {
        let mut files = whitelisted_in_root(ctx)?;
        files.extend(with_extensions_below_root(ctx)?);
        Ok(FileManifest::new(DataKind::Extra, files))
    }
}

/// Whitelisted root files, under their bare or their session-prefixed name.
pub fn whitelisted_in_root(ctx: &SessionContext<'_>) -> Result<Vec<PathBuf>, StorageError> {
    let mut found = Vec::new();
    for name in &ctx.rules.extra.whitelisted_in_root {
        for candidate in [name.clone(), naming::prefix_with_session(ctx.name(), name)] {
            let path = ctx.path.join(candidate);
            if ctx.storage.exists(&path)? && !ctx.storage.is_dir(&path)? {
                found.push(path);
            }
        }
    }
    Ok(found)
}

/// Files with an allowed extension anywhere below the session root, but not
/// in the root itself.
pub fn with_extensions_below_root(ctx: &SessionContext<'_>) -> Result<Vec<PathBuf>, StorageError> {
    Ok(ctx
        .storage
        .walk_files(&ctx.path)?
        .into_iter()
        .filter(|p| p.parent() != Some(ctx.path.as_path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !is_hidden(n) && ctx.has_extra_extension(n))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRules;
    use crate::testutil::{build, open};
    use bnd_core::LocalStorage;

    fn resolve(files: &[&str]) -> Vec<String> {
        let (_tmp, path) = build(files);
        let rules = SessionRules::default();
        let storage = LocalStorage::default();
        let ctx = open(&storage, &path, &rules);
        let manifest = ExtraSchema.validate(&ctx, &mut Vec::new()).expect("resolve");
        manifest
            .files()
            .iter()
            .map(|p| p.strip_prefix(&path).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn bare_and_prefixed_root_files_are_found() {
        let found = resolve(&[
            "comment.txt",
            "M011_2023_04_04_16_00_traj_plan.txt",
            "unlisted.txt",
        ]);
        assert_eq!(
            found,
            vec!["M011_2023_04_04_16_00_traj_plan.txt", "comment.txt"]
        );
    }

    #[test]
    fn extension_files_below_root_are_found_once() {
        let found = resolve(&[
            "M011_2023_04_04_16_00_g1/trajectory.txt",
            "M011_2023_04_04_16_00_g1/sub/channel_map.txt",
            "M011_2023_04_04_16_00_g1/.hidden.txt",
            "M011_2023_04_04_16_00_adaptation.txt",
        ]);
        assert_eq!(
            found,
            vec![
                "M011_2023_04_04_16_00_g1/sub/channel_map.txt",
                "M011_2023_04_04_16_00_g1/trajectory.txt",
            ]
        );
    }

    #[test]
    fn empty_session_has_no_extras() {
        assert!(resolve(&[]).is_empty());
    }
}
