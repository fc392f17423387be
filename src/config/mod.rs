//! Deployment configuration (`deploy.toml`).
//!
//! The `deploy` subcommand provisions environments from one or more control
//! repositories before running the install pipeline. The file maps source
//! names to a remote and a base directory, with an optional cache override:
//!
//! ```toml
//! cachedir = "/var/cache/pupdeploy"
//!
//! [sources.main]
//! remote = "https://git.example.test/puppet/control.git"
//! basedir = "environments"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default configuration file name, looked up in the invocation directory.
pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Overrides the default archive cache location.
    #[serde(default)]
    pub cachedir: Option<PathBuf>,

    /// Control repositories to deploy environments from.
    pub sources: BTreeMap<String, Source>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    /// Git URL of the control repository. Environments are branches.
    pub remote: String,

    /// Parent directory the environment is cloned under.
    pub basedir: PathBuf,
}

impl DeployConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        if config.sources.is_empty() {
            anyhow::bail!("{} declares no sources", path.display());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sources_and_cachedir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(
            &path,
            r#"
cachedir = "/var/cache/pupdeploy"

[sources.main]
remote = "https://git.example.test/control.git"
basedir = "environments"

[sources.site]
remote = "https://git.example.test/site.git"
basedir = "site-environments"
"#,
        )
        .unwrap();

        let config = DeployConfig::load(&path).unwrap();
        assert_eq!(config.cachedir.as_deref(), Some(Path::new("/var/cache/pupdeploy")));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(
            config.sources["main"].basedir,
            PathBuf::from("environments")
        );
    }

    #[test]
    fn empty_sources_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(&path, "[sources]\n").unwrap();
        assert!(DeployConfig::load(&path).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(
            &path,
            "cachedri = \"typo\"\n\n[sources.main]\nremote = \"r\"\nbasedir = \"b\"\n",
        )
        .unwrap();
        assert!(DeployConfig::load(&path).is_err());
    }
}
