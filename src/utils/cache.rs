use super::lock::LOCK_FILE;
use crate::debug;

use anyhow::{bail, format_err, Context, Result};
use reqwest::Url;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Maps remote URLs onto files below a local directory.
///
/// `https://host/a/b` lives at `<root>/host/a/b`. Every path handed out is
/// remembered, so whatever was not asked for during a run can be cleaned up.
pub struct Cache {
    root: PathBuf,
    touched: Mutex<HashSet<PathBuf>>,
}

impl Cache {
    pub fn new(root: PathBuf) -> Self {
        Cache {
            root,
            touched: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn local_path(&self, url: &str) -> Result<PathBuf> {
        // Parsing also resolves `.` and `..` segments, so the result stays inside root
        let parsed = Url::parse(url).context(format!("Invalid URL {}", url))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| format_err!("{} doesn't contain a host", url))?;
        let mut path = match parsed.port() {
            Some(port) => self.root.join(format!("{}_{}", host, port)),
            None => self.root.join(host),
        };

        let mut has_file = false;
        for segment in parsed.path_segments().into_iter().flatten() {
            if !segment.is_empty() {
                path.push(segment);
                has_file = true;
            }
        }
        if !has_file {
            bail!("{} doesn't contain filename", url);
        }

        self.touched
            .lock()
            .map_err(|_| format_err!("Cache index is poisoned"))?
            .insert(path.clone());
        Ok(path)
    }

    /// Delete partial downloads and every file that wasn't requested during this run.
    pub fn clean(&self) -> Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let touched = self
            .touched
            .lock()
            .map_err(|_| format_err!("Cache index is poisoned"))?;
        let lock_path = self.root.join(LOCK_FILE);
        clean_dir(&self.root, &|path| {
            path != lock_path && (is_partial(path) || !touched.contains(path))
        })
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "part")
}

fn clean_dir(dir: &Path, should_remove: &dyn Fn(&Path) -> bool) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).context(format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            removed += clean_dir(&path, should_remove)?;
        } else if should_remove(&path) {
            debug!("Removing stale cache file {}", path.display());
            fs::remove_file(&path).context(format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
