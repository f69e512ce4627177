use crate::repo::Repo;

use anyhow::{bail, Context, Result};
use clap::Parser;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Deserialize, Serialize, Debug)]
pub struct Config {
    pub arch: String,
    #[serde(default = "default_cache")]
    pub cache: PathBuf,
    /// Packages requested by name
    #[serde(default)]
    pub packages: Vec<String>,
    /// Tasks whose members are all requested
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Additional files to keep in the cache, such as installer images
    #[serde(default)]
    pub extra_urls: Vec<String>,
    #[serde(rename = "repo", default)]
    pub repos: Vec<RepoConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RepoConfig {
    pub base: String,
    pub suite: String,
    /// May be empty for flat repositories
    #[serde(default)]
    pub component: String,
    pub arch: Option<String>,
}

#[inline]
fn default_cache() -> PathBuf {
    PathBuf::from("/var/cache/provisioner")
}

lazy_static! {
    static ref NAME: Regex = Regex::new("^[a-z0-9][a-z0-9+.-]*$").unwrap();
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .context(format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&data).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn check_sanity(&self) -> Result<()> {
        if !NAME.is_match(&self.arch) {
            bail!("Invalid architecture {}", self.arch);
        }
        if self.repos.is_empty() {
            bail!("No repository configured");
        }
        if self.packages.is_empty() && self.tasks.is_empty() {
            bail!("Nothing to sync, add packages or tasks to the config");
        }
        for name in &self.packages {
            if !NAME.is_match(name) {
                bail!("Invalid package name {}", name);
            }
        }

        for repo in &self.repos {
            Url::parse(&repo.base).context(format!("Invalid repository base {}", repo.base))?;
            if repo.suite.trim_matches('/').is_empty() {
                bail!("Repository {} has no suite", repo.base);
            }
            if repo.component.is_empty() && !repo.suite.contains('/') {
                bail!(
                    "Repository {} {} needs a component unless it is a flat repository",
                    repo.base,
                    repo.suite
                );
            }
            if let Some(arch) = &repo.arch {
                if !NAME.is_match(arch) {
                    bail!("Invalid architecture {} for repository {}", arch, repo.base);
                }
            }
        }
        for url in &self.extra_urls {
            Url::parse(url).context(format!("Invalid extra URL {}", url))?;
        }

        Ok(())
    }

    /// Configured repositories, falling back to the global architecture
    pub fn repos(&self) -> Vec<Arc<Repo>> {
        self.repos
            .iter()
            .map(|repo| {
                Arc::new(Repo {
                    base: repo.base.trim_end_matches('/').to_string(),
                    suite: repo.suite.clone(),
                    component: repo.component.clone(),
                    arch: repo.arch.clone().unwrap_or_else(|| self.arch.clone()),
                })
            })
            .collect()
    }
}

#[derive(Parser)]
#[clap(about, version, author)]
pub struct Opts {
    #[clap(
        long,
        default_value = "/etc/provisioner/apt-sync.toml",
        help = "Path to the config file"
    )]
    pub config: PathBuf,
    #[clap(short, long, help = "Download files again even if they are cached")]
    pub force: bool,
    #[clap(long, help = "Resolve dependencies without downloading packages")]
    pub resolve_only: bool,
    #[clap(long, help = "Write the resolved package list to this file as TOML")]
    pub manifest: Option<PathBuf>,
    #[clap(short, long, help = "Print additional debug information")]
    pub verbose: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG: &str = r#"
arch = "amd64"
packages = ["ubuntu-minimal", "docker-ce"]
tasks = ["server"]
extra_urls = ["https://releases.ubuntu.com/noble/ubuntu-24.04-live-server-amd64.iso"]

[[repo]]
base = "https://archive.ubuntu.com/ubuntu/"
suite = "noble"
component = "main"

[[repo]]
base = "https://download.docker.com/linux/ubuntu"
suite = "noble"
component = "stable"
arch = "arm64"

[[repo]]
base = "https://pkgs.k8s.io"
suite = "core:/stable:/v1.34/deb/"
"#;

    #[test]
    fn parse_config() {
        let config: Config = toml::from_str(CONFIG).unwrap();
        assert_eq!(config.cache, PathBuf::from("/var/cache/provisioner"));
        assert_eq!(config.packages, vec!["ubuntu-minimal", "docker-ce"]);
        config.check_sanity().unwrap();

        let repos = config.repos();
        assert_eq!(repos.len(), 3);
        assert_eq!(repos[0].base, "https://archive.ubuntu.com/ubuntu");
        assert_eq!(repos[0].arch, "amd64");
        assert_eq!(repos[1].arch, "arm64");
        assert_eq!(repos[2].component, "");
    }

    #[test]
    fn insane_configs() {
        let check = |s: &str| toml::from_str::<Config>(s).unwrap().check_sanity();
        let repo = "[[repo]]\nbase = \"https://example.org\"\nsuite = \"noble\"\ncomponent = \"main\"\n";

        assert!(check(&format!("arch = \"amd64\"\npackages = [\"a\"]\n{}", repo)).is_ok());
        assert!(check("arch = \"amd64\"\npackages = [\"a\"]\n").is_err());
        assert!(check(&format!("arch = \"amd64\"\n{}", repo)).is_err());
        assert!(check(&format!("arch = \"AMD 64\"\npackages = [\"a\"]\n{}", repo)).is_err());
        assert!(check(&format!("arch = \"amd64\"\npackages = [\"a b\"]\n{}", repo)).is_err());
        assert!(check(
            "arch = \"amd64\"\ntasks = [\"server\"]\n[[repo]]\nbase = \"not a url\"\nsuite = \"noble\"\ncomponent = \"main\"\n"
        )
        .is_err());
        assert!(check(
            "arch = \"amd64\"\ntasks = [\"server\"]\n[[repo]]\nbase = \"https://example.org\"\nsuite = \"noble\"\n"
        )
        .is_err());
        assert!(check(&format!(
            "arch = \"amd64\"\npackages = [\"a\"]\nextra_urls = [\"nope\"]\n{}",
            repo
        ))
        .is_err());
    }

    #[test]
    fn config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apt-sync.toml");
        assert!(Config::from_file(&path).is_err());
        std::fs::write(&path, CONFIG).unwrap();
        assert_eq!(Config::from_file(&path).unwrap().repos.len(), 3);
        std::fs::write(&path, "arch = 1").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn command_line() {
        let opts = Opts::try_parse_from(["apt-sync"]).unwrap();
        assert_eq!(opts.config, PathBuf::from("/etc/provisioner/apt-sync.toml"));
        assert!(!opts.force && !opts.resolve_only && !opts.verbose);
        assert!(opts.manifest.is_none());

        let opts = Opts::try_parse_from([
            "apt-sync",
            "--config",
            "sync.toml",
            "-f",
            "--resolve-only",
            "--manifest",
            "out.toml",
            "-v",
        ])
        .unwrap();
        assert_eq!(opts.config, PathBuf::from("sync.toml"));
        assert!(opts.force && opts.resolve_only && opts.verbose);
        assert_eq!(opts.manifest, Some(PathBuf::from("out.toml")));
    }
}
