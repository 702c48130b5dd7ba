//! `bnd validate-session` and `bnd validate-sessions`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use bnd_core::{LocalStorage, ProcessingLevel, SubjectName};
use bnd_validate::{validate_session, validate_subject_sessions, OutcomeSummary, SessionRules, ValidationReport};

use super::{load_config, print_json, print_warnings, resolve, session_rules, KindArgs};

// ---------------------------------------------------------------------------
// validate-session
// ---------------------------------------------------------------------------

/// Validate one session folder.
#[derive(Args, Debug)]
pub struct ValidateSessionArgs {
    /// Path to the session folder, relative or absolute.
    pub path: PathBuf,

    /// Subject the session belongs to.
    pub subject: String,

    #[command(flatten)]
    pub kinds: KindArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ValidateSessionArgs {
    pub fn run(self) -> Result<()> {
        let kinds = self.kinds.kinds()?;
        let rules = session_rules()?;
        let path = resolve(&self.path)?;
        let subject = SubjectName::parse(&self.subject)?;

        let report = validate_session(&LocalStorage::default(), &path, &subject, &kinds, &rules)
            .with_context(|| format!("session {} is invalid", path.display()))?;

        if self.json {
            return print_json(&report);
        }
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!("{} {name} looks good", "✓".green().bold());
        print_manifest_counts(&report);
        print_warnings(&report.warnings);
        Ok(())
    }
}

fn print_manifest_counts(report: &ValidationReport) {
    for (kind, manifest) in &report.manifests {
        println!("  {:<9} {} file(s)", kind.to_string(), manifest.len());
    }
}

// ---------------------------------------------------------------------------
// validate-sessions
// ---------------------------------------------------------------------------

/// Validate every local raw session of a subject.
#[derive(Args, Debug)]
pub struct ValidateSessionsArgs {
    /// Subject whose sessions to validate.
    pub subject: String,

    #[command(flatten)]
    pub kinds: KindArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "session")]
    session: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "detail")]
    detail: String,
}

impl ValidateSessionsArgs {
    pub fn run(self) -> Result<()> {
        let kinds = self.kinds.kinds()?;
        let config = load_config()?;
        let rules = SessionRules::from_config(&config);
        let subject = SubjectName::parse(&self.subject)?;
        let subject_dir = config.local_subject_dir(ProcessingLevel::Raw, subject.as_str());

        let outcomes = validate_subject_sessions(
            &LocalStorage::default(),
            &subject_dir,
            &subject,
            &kinds,
            &rules,
        )
        .with_context(|| format!("failed to list sessions in {}", subject_dir.display()))?;
        let summaries: Vec<OutcomeSummary> = outcomes.iter().map(|o| o.summary()).collect();
        let invalid = summaries.iter().filter(|s| !s.valid).count();

        if self.json {
            print_json(&summaries)?;
        } else {
            print_table(&subject, &summaries, invalid);
        }
        if invalid > 0 {
            bail!("{invalid} of {} session(s) of {subject} are invalid", summaries.len());
        }
        Ok(())
    }
}

fn print_table(subject: &SubjectName, summaries: &[OutcomeSummary], invalid: usize) {
    if summaries.is_empty() {
        println!("No sessions found for {subject}.");
        return;
    }
    let rows: Vec<SessionRow> = summaries
        .iter()
        .map(|s| SessionRow {
            session: s.name.clone(),
            status: if s.valid {
                "VALID".green().bold().to_string()
            } else {
                "INVALID".red().bold().to_string()
            },
            files: s.files,
            detail: s
                .error
                .clone()
                .unwrap_or_else(|| s.warnings.join("; ")),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!(
        "{subject}: {} of {} session(s) valid",
        summaries.len() - invalid,
        summaries.len()
    );
}
