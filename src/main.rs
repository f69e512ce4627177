mod cli;
mod config;
mod repo;
mod solver;
mod types;
mod utils;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::{Config, Opts};
use lazy_static::lazy_static;
use serde::Serialize;
use solver::{AvailablePackages, ManifestEntry, RequiredPackages};
use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};
use utils::{
    cache::Cache,
    downloader::{DownloadJob, Downloader},
    lock,
};

// Initialize writer
lazy_static! {
    static ref WRITER: cli::Writer = cli::Writer::new();
}
// Print debug messages
static VERBOSE: AtomicBool = AtomicBool::new(false);
// Whether this process holds the cache lock
static LOCKED: AtomicBool = AtomicBool::new(false);

/// Exit codes:
/// 1 => program screwed up
/// 2 => user cancelled operation
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opts = Opts::parse();
    VERBOSE.store(opts.verbose, Ordering::Relaxed);

    if let Err(err) = try_main(&opts).await {
        error!("{}", err.to_string());
        err.chain().skip(1).for_each(|cause| {
            due_to!("{}", cause);
        });
        std::process::exit(1);
    }
}

async fn try_main(opts: &Opts) -> Result<()> {
    let config = Config::from_file(&opts.config)?;
    config.check_sanity().context("Invalid config")?;

    lock::ensure_unlocked(&config.cache)?;
    lock::lock(&config.cache)?;
    let res = sync(opts, &config).await;
    if LOCKED.load(Ordering::Relaxed) {
        lock::unlock(&config.cache)?;
    }

    res
}

async fn sync(opts: &Opts, config: &Config) -> Result<()> {
    let cache = Cache::new(config.cache.clone());
    let downloader = Downloader::new();

    let mut available = AvailablePackages::new(&config.arch);
    for repo in config.repos() {
        repo.sync_metadata(&downloader, &cache, opts.force)
            .await
            .context(format!("Failed to synchronize {}", repo))?;
        let packages = repo.packages(&cache)?;
        debug!("{} packages listed by {}", packages.len(), repo);
        available.add_packages(packages);
    }
    if available.is_empty() {
        bail!("No package available for architecture {}", available.arch());
    }
    info!(
        "{} packages available for {}",
        available.len(),
        available.arch()
    );

    info!("Resolving dependencies...");
    let mut required = RequiredPackages::new();
    required.add(&available, &config.packages)?;
    for task in &config.tasks {
        required.add_task(&available, task)?;
    }
    required
        .add_dependencies(&available)
        .context("Failed to resolve dependencies")?;
    success!("{} packages required", required.len());

    if let Some(path) = &opts.manifest {
        write_manifest(path, &required.manifest())?;
    }
    if opts.resolve_only {
        let names: Vec<&str> = required.iter().map(|pkg| pkg.name.as_str()).collect();
        WRITER.write_chunks("", &names)?;
        return Ok(());
    }

    let mut jobs = Vec::new();
    for pkg in required.iter() {
        let url = pkg.url();
        jobs.push(DownloadJob {
            path: cache.local_path(&url)?,
            description: Some(format!("{} {}", pkg.name, pkg.version)),
            size: pkg.size,
            checksum: pkg.sha256.clone(),
            optional: false,
            url,
        });
    }
    for url in &config.extra_urls {
        jobs.push(DownloadJob::new(url.clone(), cache.local_path(url)?));
    }
    info!("Downloading packages...");
    downloader
        .fetch(jobs, opts.force)
        .await
        .context("Failed to download packages")?;

    let removed = cache.clean().context("Failed to clean cache")?;
    debug!("{} stale files removed from cache", removed);
    success!("Cache at {} is up to date", cache.root().display());

    Ok(())
}

#[derive(Serialize)]
struct Manifest<'a> {
    package: &'a [ManifestEntry],
}

fn write_manifest(path: &Path, entries: &[ManifestEntry]) -> Result<()> {
    let content = toml::to_string(&Manifest { package: entries })?;
    std::fs::write(path, content)
        .context(format!("Failed to write manifest {}", path.display()))?;
    msg!("", "Manifest written to {}", path.display());

    Ok(())
}
