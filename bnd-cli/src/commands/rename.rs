//! `bnd rename-videos` and `bnd rename-extra-files`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use bnd_core::{LocalStorage, SubjectName};
use bnd_validate::{rename_extra_files, rename_videos, RenameReport, SessionContext};

use super::{resolve, session_rules};

/// Move a session's videos into `<session>_cameras/` under canonical names.
#[derive(Args, Debug)]
pub struct RenameVideosArgs {
    /// Path to the session folder.
    pub path: PathBuf,

    /// Subject the session belongs to.
    pub subject: String,

    /// Print the renames without applying them.
    #[arg(long)]
    pub dry_run: bool,
}

impl RenameVideosArgs {
    pub fn run(self) -> Result<()> {
        let rules = session_rules()?;
        let path = resolve(&self.path)?;
        let subject = SubjectName::parse(&self.subject)?;
        let storage = LocalStorage::default();
        let ctx = SessionContext::open(&storage, &path, &subject, &rules)?;

        let report = rename_videos(&ctx, self.dry_run)
            .with_context(|| format!("failed to rename videos in {}", path.display()))?;
        print_report(&report, self.dry_run);
        Ok(())
    }
}

/// Prefix the extra files of a session with the session name.
#[derive(Args, Debug)]
pub struct RenameExtraFilesArgs {
    /// Path to the session folder.
    pub path: PathBuf,

    /// Subject the session belongs to. Defaults to the parent folder's name.
    #[arg(long)]
    pub subject: Option<String>,

    /// Print the renames without applying them.
    #[arg(long)]
    pub dry_run: bool,
}

impl RenameExtraFilesArgs {
    pub fn run(self) -> Result<()> {
        let rules = session_rules()?;
        let path = resolve(&self.path)?;
        let subject = match &self.subject {
            Some(name) => SubjectName::parse(name)?,
            None => subject_from_parent(&path)?,
        };
        let storage = LocalStorage::default();
        let ctx = SessionContext::open(&storage, &path, &subject, &rules)?;

        let report = rename_extra_files(&ctx, self.dry_run)
            .with_context(|| format!("failed to rename extra files in {}", path.display()))?;
        print_report(&report, self.dry_run);
        Ok(())
    }
}

fn subject_from_parent(path: &std::path::Path) -> Result<SubjectName> {
    let name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .with_context(|| format!("cannot infer the subject of {}; pass --subject", path.display()))?;
    Ok(SubjectName::parse(name)?)
}

fn print_report(report: &RenameReport, dry_run: bool) {
    if report.is_noop() {
        println!("{} Nothing to rename.", "✓".green().bold());
        return;
    }
    let prefix = if dry_run { "[dry-run] " } else { "" };
    for step in &report.steps {
        println!("{prefix}{} {step}", "✎".cyan());
    }
    if report.applied {
        println!("{} {} step(s) applied.", "✓".green().bold(), report.steps.len());
    }
}
