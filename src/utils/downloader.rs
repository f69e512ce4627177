use crate::{debug, msg, types::Checksum};

use anyhow::{bail, format_err, Context, Result};
use futures_util::future::select_all;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::{fs::File, io::AsyncWriteExt};

#[derive(Clone, Debug)]
pub struct DownloadJob {
    pub url: String,
    /// Final location on disk, usually handed out by the cache
    pub path: PathBuf,
    pub description: Option<String>,
    pub size: Option<u64>,
    pub checksum: Option<Checksum>,
    /// A 404 or 403 answer is not an error for optional files
    pub optional: bool,
}

impl DownloadJob {
    pub fn new(url: String, path: PathBuf) -> Self {
        DownloadJob {
            url,
            path,
            description: None,
            size: None,
            checksum: None,
            optional: false,
        }
    }
}

pub struct Downloader {
    client: Client,
    max_concurrent: usize,
    max_retry: usize,
}

enum Fetched {
    Downloaded(String, PathBuf),
    Cached(String, PathBuf),
    Missing(String),
}

impl Downloader {
    pub fn new() -> Self {
        Downloader {
            client: Client::new(),
            max_concurrent: 5,
            max_retry: 3,
        }
    }

    /// Ignores proxy settings from the environment so tests reach localhost
    #[cfg(test)]
    pub fn without_proxy() -> Self {
        Downloader {
            client: Client::builder().no_proxy().build().unwrap(),
            ..Downloader::new()
        }
    }

    /// Download all jobs concurrently while showing progress bars.
    ///
    /// Files already on disk are kept unless `force` is set, as long as they
    /// match the expected checksum. Returns the local path of every file that
    /// is available afterwards, keyed by URL.
    pub async fn fetch(
        &self,
        mut to_download: Vec<DownloadJob>,
        force: bool,
    ) -> Result<HashMap<String, PathBuf>> {
        let total = to_download.len();
        let mut position = (0, total, total.to_string().len());
        let mut res = HashMap::new();
        let mut handles = Vec::with_capacity(self.max_concurrent);
        let (mut downloaded, mut cached) = (0, 0);

        msg!("", "Fetching {} files...", total);
        let multibar = MultiProgress::new();
        let bar_template = {
            let max_len = crate::WRITER.get_max_len();
            if max_len < 90 {
                " {wide_msg} {total_bytes:>10} {binary_bytes_per_sec:>12} {eta:>4} {percent:>3}%"
            } else {
                " {msg:<48} {total_bytes:>10} {binary_bytes_per_sec:>12} {eta:>4} [{wide_bar:.white/black}] {percent:>3}%"
            }
        };
        let barsty = ProgressStyle::with_template(bar_template)?.progress_chars("=>-");

        // Jobs are popped from the back
        to_download.reverse();
        loop {
            while handles.len() < self.max_concurrent {
                let job = match to_download.pop() {
                    Some(job) => job,
                    None => break,
                };
                let client = self.client.clone();
                let bar = multibar.insert(0, ProgressBar::new(job.size.unwrap_or(0)));
                bar.set_style(barsty.clone());
                position.0 += 1;
                handles.push(tokio::spawn(async move {
                    try_download_file(client, job, force, 0, position, bar).await
                }));
            }
            if handles.is_empty() {
                break;
            }

            // Wait for any of them to stop
            let (download_res, _, remaining) = select_all(handles).await;
            handles = remaining;
            match download_res? {
                Ok(Fetched::Downloaded(url, path)) => {
                    downloaded += 1;
                    res.insert(url, path);
                }
                Ok(Fetched::Cached(url, path)) => {
                    cached += 1;
                    res.insert(url, path);
                }
                Ok(Fetched::Missing(url)) => {
                    debug!("Optional file {} is not available", url);
                }
                Err(err) => {
                    // First attempt plus max_retry retries
                    if err.retry <= self.max_retry {
                        debug!("Retrying {}: {:#}", err.job.url, err.error);
                        let client = self.client.clone();
                        handles.push(tokio::spawn(async move {
                            try_download_file(client, err.job, force, err.retry, err.pos, err.bar)
                                .await
                        }));
                    } else {
                        return Err(err.error);
                    }
                }
            }
        }

        debug!("{} files downloaded, {} already up to date", downloaded, cached);
        Ok(res)
    }
}

struct DownloadError {
    error: anyhow::Error,
    job: DownloadJob,
    retry: usize,
    pos: (usize, usize, usize),
    bar: ProgressBar,
}

async fn try_download_file(
    client: Client,
    job: DownloadJob,
    force: bool,
    retry: usize,
    pos: (usize, usize, usize),
    bar: ProgressBar,
) -> Result<Fetched, DownloadError> {
    match download_file(&client, job.clone(), force, pos, bar.clone()).await {
        Ok(res) => Ok(res),
        Err(error) => Err({
            bar.reset();
            DownloadError {
                error,
                job,
                retry: retry + 1,
                pos,
                bar,
            }
        }),
    }
}

/// A cached file counts as valid if it exists and matches the checksum, when one is known.
async fn is_cached(job: &DownloadJob) -> Result<bool> {
    if !job.path.is_file() {
        return Ok(false);
    }
    match job.checksum.clone() {
        Some(checksum) => {
            let path = job.path.clone();
            Ok(tokio::task::spawn_blocking(move || checksum.cmp_file(&path)).await??)
        }
        None => Ok(true),
    }
}

fn part_path(path: &Path) -> Result<PathBuf> {
    let filename = path
        .file_name()
        .ok_or_else(|| format_err!("{} doesn't contain filename", path.display()))?;
    let mut part = filename.to_os_string();
    part.push(".part");
    Ok(path.with_file_name(part))
}

async fn download_file(
    client: &Client,
    job: DownloadJob,
    force: bool,
    pos: (usize, usize, usize),
    bar: ProgressBar,
) -> Result<Fetched> {
    let msg = match &job.description {
        Some(description) => description.clone(),
        None => job
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| job.url.clone()),
    };

    if !force && is_cached(&job).await? {
        bar.finish_and_clear();
        bar.println(format!(
            "{}{} (not modified)",
            crate::cli::gen_prefix(&console::style("SKIP").dim().to_string()),
            &msg
        ));
        return Ok(Fetched::Cached(job.url, job.path));
    }

    let mut resp = client.get(&job.url).send().await?;
    if job.optional && matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
        bar.finish_and_clear();
        return Ok(Fetched::Missing(job.url));
    }
    resp.error_for_status_ref()?;
    let len = job.size.or_else(|| resp.content_length()).unwrap_or(0);

    // Prepare progress bar
    let mut progress_text = format!("({:0width$}/{}) {}", pos.0, pos.1, msg, width = pos.2);
    if console::measure_text_width(&progress_text) > 48 {
        progress_text = console::truncate_str(&progress_text, 45, "...").to_string();
    }
    bar.set_message(progress_text);
    bar.set_length(len);
    bar.set_position(0);
    bar.reset();

    if let Some(parent) = job.path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(format!("Failed to create {}", parent.display()))?;
    }
    let part = part_path(&job.path)?;
    let mut f = File::create(&part)
        .await
        .context(format!("Failed to create {}", part.display()))?;

    // Download!
    let written = async {
        let mut validator = job.checksum.as_ref().map(|c| c.get_validator());
        let mut received = 0;
        while let Some(chunk) = resp.chunk().await? {
            f.write_all(&chunk).await?;
            received += chunk.len() as u64;
            bar.inc(chunk.len() as u64);
            if let Some(ref mut validator) = validator {
                validator.update(&chunk);
            }
        }
        f.flush().await?;

        if let Some(len) = job.size {
            if received != len {
                bail!(
                    "Bad file size when downloading {}. Mirror may be syncing. Try again later.",
                    job.url
                );
            }
        }
        if let Some(validator) = validator {
            // finish() returns false if validate failed
            if !validator.finish() {
                bail!("Checksum mismatch for {}", job.url);
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = written {
        tokio::fs::remove_file(&part).await.ok();
        return Err(e);
    }
    tokio::fs::rename(&part, &job.path)
        .await
        .context(format!("Failed to move {} into place", part.display()))?;

    bar.finish_and_clear();
    bar.println(format!(
        "{}{}",
        crate::cli::gen_prefix(&console::style("DONE").dim().to_string()),
        &msg
    ));
    Ok(Fetched::Downloaded(job.url, job.path))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::test_server::TestServer;
    use sha2::{Digest, Sha256};

    fn sha256(body: &[u8]) -> Checksum {
        Checksum::from_sha256_str(&hex::encode(Sha256::digest(body))).unwrap()
    }

    #[test]
    fn partial_file_name() {
        assert_eq!(
            part_path(Path::new("/cache/host/pool/a.deb")).unwrap(),
            PathBuf::from("/cache/host/pool/a.deb.part")
        );
        assert!(part_path(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn cached_file_must_match_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello");
        let mut job = DownloadJob::new("https://example.org/hello".to_string(), path.clone());
        assert!(!is_cached(&job).await.unwrap());

        std::fs::write(&path, "hello\n").unwrap();
        assert!(is_cached(&job).await.unwrap());

        job.checksum = Some(
            Checksum::from_sha256_str(
                "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03",
            )
            .unwrap(),
        );
        assert!(is_cached(&job).await.unwrap());

        std::fs::write(&path, "bye\n").unwrap();
        assert!(!is_cached(&job).await.unwrap());
    }

    #[tokio::test]
    async fn nothing_to_fetch() {
        let downloader = Downloader::new();
        assert!(downloader.fetch(Vec::new(), false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_verified_file() {
        let server = TestServer::new()
            .route("/pool/a.deb", 200, "package a")
            .start()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool/a.deb");
        let mut job = DownloadJob::new(server.url("/pool/a.deb"), path.clone());
        job.size = Some(9);
        job.checksum = Some(sha256(b"package a"));

        let res = Downloader::without_proxy()
            .fetch(vec![job], false)
            .await
            .unwrap();
        assert_eq!(res.get(&server.url("/pool/a.deb")), Some(&path));
        assert_eq!(std::fs::read(&path).unwrap(), b"package a");
        assert!(!part_path(&path).unwrap().exists());
    }

    #[tokio::test]
    async fn missing_optional_files() {
        let server = TestServer::new()
            .route("/Release.gpg", 403, "go away")
            .start()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::without_proxy();
        let mut jobs = Vec::new();
        for file in ["InRelease", "Release.gpg"] {
            let mut job = DownloadJob::new(server.url(&format!("/{}", file)), dir.path().join(file));
            job.optional = true;
            jobs.push(job);
        }

        let res = downloader.fetch(jobs, false).await.unwrap();
        assert!(res.is_empty());
        assert_eq!(server.hits("/InRelease"), 1);
        assert_eq!(server.hits("/Release.gpg"), 1);
        assert!(!dir.path().join("InRelease").exists());

        // Required files may not be missing
        let job = DownloadJob::new(server.url("/InRelease"), dir.path().join("InRelease"));
        assert!(downloader.fetch(vec![job], false).await.is_err());
    }

    #[tokio::test]
    async fn corrupted_download_is_discarded() {
        let server = TestServer::new()
            .route("/pool/a.deb", 200, "tampered")
            .route("/pool/b.deb", 200, "short")
            .start()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::without_proxy();

        let path = dir.path().join("a.deb");
        let mut job = DownloadJob::new(server.url("/pool/a.deb"), path.clone());
        job.checksum = Some(sha256(b"package a"));
        let err = downloader.fetch(vec![job], false).await.unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
        assert!(!path.exists());
        assert!(!part_path(&path).unwrap().exists());

        let path = dir.path().join("b.deb");
        let mut job = DownloadJob::new(server.url("/pool/b.deb"), path.clone());
        job.size = Some(100);
        let err = downloader.fetch(vec![job], false).await.unwrap_err();
        assert!(err.to_string().contains("Bad file size"));
        assert!(!path.exists());
        assert!(!part_path(&path).unwrap().exists());
    }

    #[tokio::test]
    async fn retries() {
        let server = TestServer::new()
            .route("/broken", 500, "oops")
            .route("/flaky", 503, "busy")
            .route("/flaky", 200, "finally")
            .start()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::without_proxy();

        let job = DownloadJob::new(server.url("/broken"), dir.path().join("broken"));
        assert!(downloader.fetch(vec![job], false).await.is_err());
        assert_eq!(server.hits("/broken"), 4);

        let job = DownloadJob::new(server.url("/flaky"), dir.path().join("flaky"));
        downloader.fetch(vec![job], false).await.unwrap();
        assert_eq!(server.hits("/flaky"), 2);
        assert_eq!(std::fs::read(dir.path().join("flaky")).unwrap(), b"finally");
    }

    #[tokio::test]
    async fn cached_files_are_skipped_unless_forced() {
        let server = TestServer::new()
            .route("/pool/a.deb", 200, "package a")
            .start()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.deb");
        std::fs::write(&path, "package a").unwrap();
        let mut job = DownloadJob::new(server.url("/pool/a.deb"), path.clone());
        job.checksum = Some(sha256(b"package a"));
        let downloader = Downloader::without_proxy();

        let res = downloader.fetch(vec![job.clone()], false).await.unwrap();
        assert_eq!(res.get(&job.url), Some(&path));
        assert_eq!(server.hits("/pool/a.deb"), 0);

        // A stale copy without checksum is replaced when forced
        job.checksum = None;
        std::fs::write(&path, "old").unwrap();
        downloader.fetch(vec![job.clone()], false).await.unwrap();
        assert_eq!(server.hits("/pool/a.deb"), 0);
        downloader.fetch(vec![job], true).await.unwrap();
        assert_eq!(server.hits("/pool/a.deb"), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"package a");
    }
}
