//! Session-level entry point of the structure validator.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bnd_core::naming;
use bnd_core::{Config, Conventions, DataKind, ExtraFileRules, SessionName, Storage, SubjectName};

use crate::error::ValidationError;
use crate::report::{ValidationReport, Warning};
use crate::schema::{Schema, Validator};

/// Conventions and extra-file rules, threaded explicitly into every
/// validator and renamer call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRules {
    pub conventions: Conventions,
    pub extra: ExtraFileRules,
}

impl SessionRules {
    pub fn from_config(config: &Config) -> Self {
        Self {
            conventions: config.conventions.clone(),
            extra: config.extra_rules(),
        }
    }
}

/// Everything a [`Validator`] needs to look at one session.
pub struct SessionContext<'a> {
    pub storage: &'a dyn Storage,
    pub path: PathBuf,
    pub session: SessionName,
    pub rules: &'a SessionRules,
    /// Whether absent optional data should be reported as a warning.
    pub warn_if_absent: bool,
}

impl<'a> SessionContext<'a> {
    /// Check that `path` is an existing folder named after a session of
    /// `subject`.
    pub fn open(
        storage: &'a dyn Storage,
        path: &Path,
        subject: &SubjectName,
        rules: &'a SessionRules,
    ) -> Result<Self, ValidationError> {
        let session = session_from_path(path, subject)?;
        if !storage.is_dir(path)? {
            return Err(ValidationError::SessionNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            storage,
            path: path.to_path_buf(),
            session,
            rules,
            warn_if_absent: true,
        })
    }

    pub fn name(&self) -> &str {
        self.session.as_str()
    }

    /// Whether `file_name` carries one of the extra-file extensions.
    pub fn has_extra_extension(&self, file_name: &str) -> bool {
        self.rules
            .extra
            .extensions
            .iter()
            .any(|ext| file_name.ends_with(ext.as_str()))
    }

    /// Whether `file_name` is a whitelisted root file, bare or session-prefixed.
    pub fn is_whitelisted_root_file(&self, file_name: &str) -> bool {
        self.rules.extra.whitelisted_in_root.iter().any(|w| {
            file_name == w || file_name == naming::prefix_with_session(self.name(), w)
        })
    }
}

/// Parse the session identity from the last component of `path`.
pub fn session_from_path(path: &Path, subject: &SubjectName) -> Result<SessionName, ValidationError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ValidationError::NoFolderName {
            path: path.to_path_buf(),
        })?;
    Ok(SessionName::parse(name, subject)?)
}

/// Validate the requested `kinds` of the session at `path` and resolve its
/// extra files.
///
/// Kinds are checked in a fixed order and the first failure is returned.
/// `Extra` is always resolved whether or not it is requested.
pub fn validate_session(
    storage: &dyn Storage,
    path: &Path,
    subject: &SubjectName,
    kinds: &[DataKind],
    rules: &SessionRules,
) -> Result<ValidationReport, ValidationError> {
    let ctx = SessionContext::open(storage, path, subject, rules)?;
    validate_kinds(&ctx, kinds)
}

/// [`validate_session`] over an already-opened context.
pub fn validate_kinds(
    ctx: &SessionContext<'_>,
    kinds: &[DataKind],
) -> Result<ValidationReport, ValidationError> {
    let mut requested: BTreeSet<DataKind> = kinds.iter().copied().collect();
    requested.insert(DataKind::Extra);

    let mut report = ValidationReport::default();
    for kind in requested {
        let manifest = Schema::for_kind(kind).validate(ctx, &mut report.warnings)?;
        tracing::debug!(
            session = ctx.name(),
            kind = %kind,
            files = manifest.len(),
            "validated"
        );
        report.manifests.insert(kind, manifest);
    }
    Ok(report)
}

/// Push `warning` onto `warnings` and log it.
pub(crate) fn warn(warnings: &mut Vec<Warning>, warning: Warning) {
    tracing::warn!("{warning}");
    warnings.push(warning);
}
