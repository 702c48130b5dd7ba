//! `bnd last-session` and `bnd sessions-on-day`.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;

use bnd_core::{Config, LocalStorage, ProcessingLevel, SubjectName};
use bnd_validate::{last_session, sessions_on_day};

use super::{load_config, print_json};

/// Show the latest raw session of a subject.
#[derive(Args, Debug)]
pub struct LastSessionArgs {
    /// Subject to look up.
    pub subject: String,

    /// Look at the remote root instead of the local one.
    #[arg(long)]
    pub remote: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct SessionLine {
    subject: String,
    session: String,
}

fn root(config: &Config, remote: bool) -> &Path {
    if remote {
        &config.remote_path
    } else {
        &config.local_path
    }
}

impl LastSessionArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let subject = SubjectName::parse(&self.subject)?;
        let subject_dir = if self.remote {
            config.remote_subject_dir(ProcessingLevel::Raw, subject.as_str())
        } else {
            config.local_subject_dir(ProcessingLevel::Raw, subject.as_str())
        };

        let folder = last_session(&LocalStorage::default(), &subject_dir, &subject)?;
        if self.json {
            return print_json(&SessionLine {
                subject: subject.to_string(),
                session: folder.session.to_string(),
            });
        }
        println!("{}", folder.session);
        Ok(())
    }
}

/// List every raw session, over all subjects, recorded on one day.
#[derive(Args, Debug)]
pub struct SessionsOnDayArgs {
    /// Day in `YYYY-MM-DD` form.
    pub day: NaiveDate,

    /// Look at the remote root instead of the local one.
    #[arg(long)]
    pub remote: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SessionsOnDayArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        let level_dir = root(&config, self.remote).join(ProcessingLevel::Raw.dir_name());

        let found = sessions_on_day(
            &LocalStorage::default(),
            &level_dir,
            self.day,
            &config.ignored_subject_level_dirs,
        )
        .with_context(|| format!("failed to list sessions in {}", level_dir.display()))?;

        if self.json {
            let lines: Vec<SessionLine> = found
                .iter()
                .map(|(subject, session)| SessionLine {
                    subject: subject.to_string(),
                    session: session.to_string(),
                })
                .collect();
            return print_json(&lines);
        }
        if found.is_empty() {
            println!("No sessions on {}.", self.day);
        }
        for (subject, session) in &found {
            println!("{subject}\t{session}");
        }
        Ok(())
    }
}
