//! `bnd init` and `bnd show-config`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{load_config, print_json};

/// Create the configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Local storage root (contains `raw/` and `processed/`).
    #[arg(long)]
    pub local: PathBuf,

    /// Remote storage root, usually a network mount.
    #[arg(long)]
    pub remote: PathBuf,

    /// Replace an existing configuration.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let existed = bnd_core::config::config_path_at(&home).exists();
        let config = bnd_core::config::init_at(&home, self.local, self.remote, self.force)
            .context("failed to write configuration")?;

        if existed && !self.force {
            println!("Configuration already exists (use --force to replace it).");
        } else {
            println!("✓ Wrote {}", bnd_core::config::config_path_at(&home).display());
        }
        println!("  local:  {}", config.local_path.display());
        println!("  remote: {}", config.remote_path.display());
        Ok(())
    }
}

/// Print the configuration.
#[derive(Args, Debug)]
pub struct ShowConfigArgs {
    /// Emit JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

impl ShowConfigArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config()?;
        if self.json {
            return print_json(&config);
        }
        print!(
            "{}",
            serde_yaml::to_string(&config).context("failed to serialize configuration")?
        );
        Ok(())
    }
}
