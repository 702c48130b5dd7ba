//! Subcommands and the argument groups they share.

pub mod config;
pub mod query;
pub mod rename;
pub mod transfer;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use bnd_core::{Config, ConfigError, DataKind};
use bnd_validate::{SessionRules, Warning};

/// `--ignore-behavior` / `--ignore-ephys` / `--ignore-videos`.
#[derive(Args, Debug, Clone, Copy)]
pub struct KindArgs {
    /// Do not check (or transfer) behavioral data.
    #[arg(long)]
    pub ignore_behavior: bool,

    /// Do not check (or transfer) ephys data.
    #[arg(long)]
    pub ignore_ephys: bool,

    /// Do not check (or transfer) videos.
    #[arg(long)]
    pub ignore_videos: bool,
}

impl KindArgs {
    /// The selected kinds; at least one is required.
    pub fn kinds(&self) -> Result<Vec<DataKind>> {
        let kinds: Vec<DataKind> = [
            (DataKind::Behavior, self.ignore_behavior),
            (DataKind::Ephys, self.ignore_ephys),
            (DataKind::Video, self.ignore_videos),
        ]
        .into_iter()
        .filter(|(_, ignored)| !ignored)
        .map(|(kind, _)| kind)
        .collect();
        if kinds.is_empty() {
            bail!("at least one data kind must be checked");
        }
        Ok(kinds)
    }
}

pub(crate) fn load_config() -> Result<Config> {
    bnd_core::config::load().context("failed to load configuration")
}

/// Conventions from the configuration, or the defaults when there is none
/// yet. Commands that only look at one folder work without `bnd init`.
pub(crate) fn session_rules() -> Result<SessionRules> {
    match bnd_core::config::load() {
        Ok(config) => Ok(SessionRules::from_config(&config)),
        Err(ConfigError::NotFound { .. }) => Ok(SessionRules::default()),
        Err(err) => Err(err).context("failed to load configuration"),
    }
}

/// Absolute, symlink-resolved form of an existing path.
pub(crate) fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", path.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}

pub(crate) fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        println!("  {} {warning}", "!".yellow().bold());
    }
}
