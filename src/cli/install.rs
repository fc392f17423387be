//! The `install` subcommand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::pipeline::{self, PipelineOptions, DEFAULT_CACHE_DIR, DEFAULT_WORKERS};

/// Install the modules declared in a Puppetfile into the current
/// environment root.
#[derive(Debug, Args)]
pub struct InstallCommand {
    /// Path to the Puppetfile
    ///
    /// Defaults to `Puppetfile` in the environment root.
    #[arg(long, value_name = "PATH")]
    pub puppetfile: Option<PathBuf>,

    /// Number of parallel download workers
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Do not install transitive dependencies from metadata.json
    #[arg(long)]
    pub no_deps: bool,

    /// Directory for cached module archives
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cachedir: PathBuf,
}

impl InstallCommand {
    pub async fn execute(self) -> Result<usize> {
        let workers = super::validate_workers(self.workers)?;
        let env_root = std::env::current_dir().context("cannot determine working directory")?;

        let mut options = PipelineOptions::new(&env_root);
        if let Some(puppetfile) = self.puppetfile {
            options.puppetfile = puppetfile;
        }
        options.cache_dir = self.cachedir;
        options.workers = workers;
        options.download_deps = !self.no_deps;

        let failures = pipeline::run(options).await?;
        report(failures);
        Ok(failures)
    }
}

pub(crate) fn report(failures: usize) {
    if failures == 0 {
        println!("{} environment deployed", "ok:".green().bold());
    } else {
        eprintln!(
            "{} {failures} module{} failed to deploy",
            "error:".red().bold(),
            if failures == 1 { "" } else { "s" }
        );
    }
}
