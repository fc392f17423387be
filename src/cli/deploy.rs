//! The `deploy` subcommand.
//!
//! Provisions one named environment from every configured control
//! repository (the environment is a branch of the control repo), then runs
//! the install pipeline in each environment that carries a Puppetfile.

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{DeployConfig, DEFAULT_CONFIG_FILE};
use crate::git::GitCommand;
use crate::pipeline::{self, PipelineOptions, DEFAULT_CACHE_DIR, DEFAULT_WORKERS};

#[derive(Debug, Args)]
pub struct DeployCommand {
    /// Environment to deploy (a branch of each control repository)
    pub environment: String,

    /// Deployment configuration file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: std::path::PathBuf,

    /// Number of parallel download workers
    #[arg(long, value_name = "N", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Do not install transitive dependencies from metadata.json
    #[arg(long)]
    pub no_deps: bool,
}

impl DeployCommand {
    pub async fn execute(self) -> Result<usize> {
        let workers = super::validate_workers(self.workers)?;
        let config = DeployConfig::load(&self.config)?;
        let cache_dir = config
            .cachedir
            .clone()
            .unwrap_or_else(|| DEFAULT_CACHE_DIR.into());

        let mut failures = 0;
        for (name, source) in &config.sources {
            let env_root = source.basedir.join(&self.environment);

            // A previous deployment of the same environment is replaced
            // wholesale; module content is rebuilt from the cache anyway.
            if tokio::fs::try_exists(&env_root).await.unwrap_or(false) {
                tokio::fs::remove_dir_all(&env_root).await.with_context(|| {
                    format!("cannot remove existing environment {}", env_root.display())
                })?;
            }
            if let Some(parent) = env_root.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("cannot create base directory {}", parent.display()))?;
            }

            tracing::info!(
                target: "pupdeploy::deploy",
                "cloning {} environment {} from {}",
                name,
                self.environment,
                source.remote
            );
            GitCommand::new()
                .args([
                    "clone",
                    "--quiet",
                    "--branch",
                    self.environment.as_str(),
                    source.remote.as_str(),
                ])
                .args([env_root.to_string_lossy().into_owned()])
                .run()
                .await
                .with_context(|| {
                    format!(
                        "failed downloading environment {} from source {name}",
                        self.environment
                    )
                })?;

            let puppetfile = env_root.join("Puppetfile");
            if !tokio::fs::try_exists(&puppetfile).await.unwrap_or(false) {
                tracing::info!(
                    target: "pupdeploy::deploy",
                    "source {name} has no Puppetfile, nothing to install"
                );
                continue;
            }

            let mut options = PipelineOptions::new(&env_root);
            options.cache_dir = cache_dir.clone();
            options.workers = workers;
            options.download_deps = !self.no_deps;
            failures += pipeline::run(options).await?;
        }

        super::install::report(failures);
        Ok(failures)
    }
}
