use crate::debug;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, io::prelude::*, path::Path, sync::atomic::Ordering};

/// Lock file name inside the cache directory
pub const LOCK_FILE: &str = ".apt-sync.lock";

/// Make sure only one instance syncs into a cache directory at one time

#[derive(Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
}

pub fn ensure_unlocked(root: &Path) -> Result<()> {
    if let Some(pid) = check(root)? {
        bail!(
            "Another instance of apt-sync is currently running at PID {}",
            pid
        );
    }

    Ok(())
}

pub fn check(root: &Path) -> Result<Option<u32>> {
    let lock_path = root.join(LOCK_FILE);
    if lock_path.is_file() {
        let lock_content =
            std::fs::read_to_string(lock_path).context("Failed to read lock file")?;
        let lock_info: LockInfo =
            toml::from_str(&lock_content).context("Failed to parse lock file")?;
        Ok(Some(lock_info.pid))
    } else {
        Ok(None)
    }
}

pub fn lock(root: &Path) -> Result<()> {
    let lock_path = root.join(LOCK_FILE);
    if lock_path.is_file() {
        bail!("Cannot lock because lock file already exists");
    }

    // Set global lock parameter
    crate::LOCKED.store(true, Ordering::Relaxed);

    // Release the lock on SIGINT and SIGTERM, partial downloads are cleaned on the next run
    {
        let root = root.to_owned();
        ctrlc::set_handler(move || {
            if let Err(e) = unlock(&root) {
                crate::error!("Failed to unlock: {}", e);
            }
            std::process::exit(2);
        })
        .context("Error setting SIGINT handler")?;
    }

    if !root.is_dir() {
        fs::create_dir_all(root).context("Failed to create dir for lock file")?;
    }
    let lock_info = LockInfo {
        pid: std::process::id(),
    };
    let lock_content = toml::to_string(&lock_info)?;
    let mut file = fs::File::create(&lock_path).context("Failed to create lock file")?;
    file.write_all(lock_content.as_bytes())
        .context("Failed to write lock content")?;
    Ok(())
}

pub fn unlock(root: &Path) -> Result<()> {
    let lock_path = root.join(LOCK_FILE);
    if lock_path.is_file() {
        fs::remove_file(&lock_path).context("Failed to delete lock file")?;
    } else {
        debug!("Attempt to unlock, but lock file doesn't exist");
    }
    crate::LOCKED.store(false, Ordering::Relaxed);
    Ok(())
}
