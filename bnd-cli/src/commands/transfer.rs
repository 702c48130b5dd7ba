//! `bnd up` and `bnd dl`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use bnd_core::{LocalStorage, ProcessingLevel, SubjectName};
use bnd_sync::{
    download_session, upload_session, Action, CollisionPolicy, Endpoint, IntegrityPolicy,
    SyncOptions, SyncReport,
};
use bnd_validate::SessionRules;

use super::{load_config, print_json, print_warnings, resolve, KindArgs};

// ---------------------------------------------------------------------------
// Args
// ---------------------------------------------------------------------------

/// Upload a local raw session.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Path to the session folder under the local `raw/<subject>/`.
    pub path: PathBuf,

    /// Subject the session belongs to.
    pub subject: String,

    #[command(flatten)]
    pub kinds: KindArgs,

    /// Do not transfer extra files.
    #[arg(long)]
    pub no_extra: bool,

    /// Rename videos into convention before uploading.
    #[arg(long)]
    pub rename_videos: bool,

    /// Prefix extra files with the session name before uploading.
    #[arg(long)]
    pub rename_extra: bool,

    /// What to do when a destination file exists:
    /// overwrite, skip, error or error-if-different.
    #[arg(long, default_value = "error-if-different")]
    pub policy: CollisionPolicy,

    /// Keep or roll back a copy whose destination fails verification.
    #[arg(long, default_value = "keep")]
    pub on_integrity_failure: IntegrityPolicy,

    /// Validate and plan, but copy nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Download a raw session from the remote root.
#[derive(Args, Debug)]
pub struct DlArgs {
    /// Session folder name, e.g. `M011_2023_04_04_16_00`.
    pub session: String,

    /// Subject the session belongs to.
    pub subject: String,

    #[command(flatten)]
    pub kinds: KindArgs,

    /// Do not transfer extra files.
    #[arg(long)]
    pub no_extra: bool,

    /// What to do when a destination file exists.
    #[arg(long, default_value = "error-if-different")]
    pub policy: CollisionPolicy,

    /// Keep or roll back a copy whose destination fails verification.
    #[arg(long, default_value = "keep")]
    pub on_integrity_failure: IntegrityPolicy,

    /// Validate and plan, but copy nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

impl UpArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let rules = SessionRules::from_config(&config);
        let local_root = resolve(&config.local_path)?;
        let remote_root = resolve(&config.remote_path)?;
        let session_path = resolve(&self.path)?;
        let subject = SubjectName::parse(&self.subject)?;

        let options = SyncOptions {
            kinds: self.kinds.kinds()?,
            include_extra: !self.no_extra,
            rename_videos: self.rename_videos,
            rename_extra: self.rename_extra,
            policy: self.policy,
            integrity: self.on_integrity_failure,
            dry_run: self.dry_run,
        };

        let local = LocalStorage::new("local");
        let remote = LocalStorage::new("remote");
        let report = upload_session(
            Endpoint::new(&local, &local_root),
            Endpoint::new(&remote, &remote_root),
            &session_path,
            &subject,
            &rules,
            &options,
        )
        .with_context(|| format!("upload of {} failed", session_path.display()))?;

        if self.json {
            return print_json(&report);
        }
        print_report(&report, "uploaded");
        Ok(())
    }
}

impl DlArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let rules = SessionRules::from_config(&config);
        let local_root = resolve(&config.local_path)?;
        let remote_root = resolve(&config.remote_path)?;
        let subject = SubjectName::parse(&self.subject)?;
        let session_path = remote_root
            .join(ProcessingLevel::Raw.dir_name())
            .join(subject.as_str())
            .join(&self.session);

        let options = SyncOptions {
            kinds: self.kinds.kinds()?,
            include_extra: !self.no_extra,
            policy: self.policy,
            integrity: self.on_integrity_failure,
            dry_run: self.dry_run,
            ..SyncOptions::default()
        };

        let local = LocalStorage::new("local");
        let remote = LocalStorage::new("remote");
        let report = download_session(
            Endpoint::new(&remote, &remote_root),
            Endpoint::new(&local, &local_root),
            &session_path,
            &subject,
            &rules,
            &options,
        )
        .with_context(|| format!("download of {} failed", self.session))?;

        if self.json {
            return print_json(&report);
        }
        print_report(&report, "downloaded");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &SyncReport, verb: &str) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    for rename in &report.renames {
        for step in &rename.steps {
            println!("{prefix}{} {step}", "✎".cyan());
        }
    }
    for checked in &report.plan.transfers {
        let symbol = match checked.action {
            Action::Copy => "+".green(),
            Action::Overwrite => "~".yellow(),
            Action::Skip => "·".dimmed(),
        };
        let shown = relative_to(&checked.transfer.dest, &report.dest);
        println!("{prefix}{symbol} {} ({})", shown.display(), checked.transfer.kind);
    }
    print_warnings(&report.warnings);

    let plan = &report.plan;
    if report.pending_renames {
        println!(
            "{prefix}{}: transfer plan depends on the renames above; rerun without --dry-run to apply them",
            report.session
        );
    } else if report.dry_run {
        println!(
            "{prefix}{}: {} to copy, {} to overwrite, {} to skip",
            report.session,
            plan.count(Action::Copy),
            plan.count(Action::Overwrite),
            plan.count(Action::Skip),
        );
    } else if plan.transfers.is_empty() {
        println!("Nothing to transfer for {}.", report.session);
    } else {
        println!(
            "{} {} {verb}: {} file(s) copied, {} skipped, {} byte(s)",
            "✓".green().bold(),
            report.session,
            report.copied,
            report.skipped,
            report.bytes,
        );
    }
}

fn relative_to<'a>(path: &'a Path, base: &Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}
