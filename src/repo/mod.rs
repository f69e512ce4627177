use crate::{
    debug, info,
    types::{Package, Release},
    utils::{
        cache::Cache,
        debcontrol::read_records,
        downloader::{DownloadJob, Downloader},
    },
};
use anyhow::{format_err, Context, Result};
use flate2::read::GzDecoder;
use rayon::prelude::*;
use std::{fmt, fs::File, path::PathBuf, sync::Arc};

/// Coordinates of one APT repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub base: String,
    /// Either a suite name such as `noble`, or a path for flat repositories
    pub suite: String,
    pub component: String,
    pub arch: String,
}

impl Repo {
    /// Directory holding the Release files, relative to base
    fn suite_dir(&self) -> String {
        if self.suite.contains('/') {
            self.suite.trim_matches('/').to_string()
        } else {
            format!("dists/{}", self.suite)
        }
    }

    /// URL of a file below the suite directory
    pub fn suite_url(&self, path: &str) -> String {
        let path = join(&[&self.suite_dir(), path]);
        format!("{}/{}", self.base.trim_end_matches('/'), path)
    }

    /// Whether an entry of the Release index is worth fetching for this repository.
    pub fn wants(&self, path: &str) -> bool {
        let (dir, file) = match path.rfind('/') {
            Some(i) => path.split_at(i + 1),
            None => ("", path),
        };

        if !dir.is_empty() && !dir.starts_with(&format!("{}/", self.component)) {
            return false;
        }
        if dir.contains("/binary-") && !dir.contains(&format!("/binary-{}", self.arch)) {
            return false;
        }
        if dir.ends_with("/source/") {
            return false;
        }
        for prefix in ["Commands-", "Components-", "Contents-"] {
            if file.starts_with(prefix) && !file.starts_with(&format!("{}{}", prefix, self.arch)) {
                return false;
            }
        }
        if file.starts_with("Translation-")
            && file != "Translation-en"
            && !file.starts_with("Translation-en.")
        {
            return false;
        }

        !file.starts_with("icons-")
    }

    /// Download the Release files and every index they list that this repository wants.
    pub async fn sync_metadata(
        &self,
        downloader: &Downloader,
        cache: &Cache,
        force: bool,
    ) -> Result<()> {
        info!("Synchronizing metadata for {}...", self);
        let mut jobs = Vec::new();
        for file in ["InRelease", "Release.gpg", "Release"] {
            let url = self.suite_url(file);
            let mut job = DownloadJob::new(url.clone(), cache.local_path(&url)?);
            job.optional = true;
            jobs.push(job);
        }
        downloader.fetch(jobs, force).await?;

        let release = self.release(cache)?;
        let mut jobs = Vec::new();
        for entry in release.sha256.iter().filter(|entry| self.wants(&entry.path)) {
            let url = self.suite_url(&entry.path);
            jobs.push(DownloadJob {
                path: cache.local_path(&url)?,
                description: Some(entry.path.clone()),
                size: Some(entry.size),
                checksum: Some(entry.checksum.clone()),
                optional: true,
                url,
            });
        }
        debug!("{} of {} index files wanted", jobs.len(), release.sha256.len());
        downloader
            .fetch(jobs, force)
            .await
            .context(format!("Failed to fetch metadata for {}", self))?;

        Ok(())
    }

    pub fn release(&self, cache: &Cache) -> Result<Release> {
        let path = cache.local_path(&self.suite_url("Release"))?;
        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read Release for {}", self))?;
        Release::parse(&content).context(format!("Failed to parse Release for {}", self))
    }

    fn packages_path(&self, cache: &Cache) -> Result<PathBuf> {
        let candidates = [
            join(&[&self.component, "Packages.gz"]),
            join(&[&self.component, &format!("binary-{}", self.arch), "Packages.gz"]),
        ];
        for candidate in &candidates {
            let path = cache.local_path(&self.suite_url(candidate))?;
            if path.is_file() {
                return Ok(path);
            }
        }

        Err(format_err!("No Packages index found for {}", self))
    }

    /// Parse the cached Packages index of this repository.
    pub fn packages(self: &Arc<Self>, cache: &Cache) -> Result<Vec<Package>> {
        let path = self.packages_path(cache)?;
        debug!("Parsing {}", path.display());
        let file = File::open(&path).context(format!("Failed to open {}", path.display()))?;
        let records = read_records(GzDecoder::new(file))
            .context(format!("Failed to read {}", path.display()))?;

        let packages = records
            .par_iter()
            .map(|record| Package::from_record(record, self.clone()))
            .collect::<Result<Vec<_>, _>>()
            .context(format!("Bad package record in {}", path.display()))?;
        Ok(packages)
    }
}

/// Join path fragments with single slashes
fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.base, self.suite)?;
        if !self.component.is_empty() {
            write!(f, "/{}", self.component)?;
        }
        write!(f, " [{}]", self.arch)
    }
}
