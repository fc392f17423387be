//! Command-line interface.
//!
//! Two subcommands share the fetch pipeline: `install` runs it against a
//! Puppetfile in the current environment root, `deploy <env>` first clones
//! the configured control repositories and then installs every environment
//! that carries a Puppetfile.
//!
//! The process exit code is the number of modules that failed terminally,
//! so `0` means a fully deployed environment.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod deploy;
pub mod install;

pub use deploy::DeployCommand;
pub use install::InstallCommand;

#[derive(Parser)]
#[command(
    name = "pupdeploy",
    version,
    about = "Deploy Puppet environments from a Puppetfile",
    long_about = "Deploy Puppet environments from a Puppetfile.\n\n\
        Modules come from the Puppet Forge, git repositories or GitHub\n\
        release tarballs, are fetched through a content-addressed archive\n\
        cache, and transitive dependencies declared in each module's\n\
        metadata.json are installed automatically."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the modules declared in a Puppetfile
    Install(InstallCommand),
    /// Clone configured control repositories for an environment, then install
    Deploy(DeployCommand),
}

impl Cli {
    /// Run the selected subcommand and return the process exit code.
    pub async fn execute(self) -> Result<i32> {
        let failures = match self.command {
            Commands::Install(cmd) => cmd.execute().await?,
            Commands::Deploy(cmd) => cmd.execute().await?,
        };
        Ok(i32::try_from(failures).unwrap_or(i32::MAX))
    }
}

/// Reject worker counts the pool cannot run with.
fn validate_workers(workers: usize) -> Result<usize> {
    if workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }
    Ok(workers)
}
