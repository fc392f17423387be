//! Thin wrapper around the system `git` command.
//!
//! Like Cargo, pupdeploy shells out to the user's `git` binary instead of
//! linking a git library. This keeps authentication (SSH agents, credential
//! helpers, instaweb proxies) working exactly as it does on the command
//! line, at the cost of requiring git in `PATH`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result};
use tokio::process::Command;

/// Builder for a single git invocation.
///
/// ```no_run
/// # use pupdeploy::git::GitCommand;
/// # async fn example() -> anyhow::Result<()> {
/// GitCommand::new()
///     .args(["clone", "--branch", "production", "https://example.test/control.git", "envs/production"])
///     .run()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

/// Outcome of a git invocation that was allowed to fail.
#[derive(Debug)]
pub struct GitOutput {
    pub status_success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    async fn spawn(&self) -> Result<Output> {
        let mut cmd = Command::new("git");
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        // Never prompt for credentials from a worker task.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.kill_on_drop(true);

        tracing::debug!(target: "pupdeploy::git", "git {}", self.args.join(" "));

        cmd.output()
            .await
            .with_context(|| format!("failed to spawn git {}", self.args.join(" ")))
    }

    /// Run the command, returning its captured output without judging the
    /// exit status. Callers that need to classify failures (retryable clone
    /// vs. terminal checkout) inspect [`GitOutput`] themselves.
    pub async fn output(self) -> Result<GitOutput> {
        let out = self.spawn().await?;
        Ok(GitOutput {
            status_success: out.status.success(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    /// Run the command and fail unless it exits zero.
    pub async fn run(self) -> Result<()> {
        let args = self.args.join(" ");
        let out = self.spawn().await?;
        if out.status.success() {
            Ok(())
        } else {
            anyhow::bail!(
                "git {} failed: {}",
                args,
                String::from_utf8_lossy(&out.stderr).trim()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let out = GitCommand::new()
            .args(["rev-parse", "--verify", "no-such-ref-zzz"])
            .current_dir(std::env::temp_dir())
            .output()
            .await
            .unwrap();
        assert!(!out.status_success);
    }

    #[tokio::test]
    async fn version_runs() {
        GitCommand::new().args(["--version"]).run().await.unwrap();
    }
}
