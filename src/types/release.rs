use super::Checksum;
use crate::utils::debcontrol::{parse_records, Record};

use anyhow::{bail, format_err, Context, Result};

/// An entry of the `SHA256` index in a `Release` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub checksum: Checksum,
    pub size: u64,
    /// Path relative to the suite directory
    pub path: String,
}

#[derive(Debug, Default)]
pub struct Release {
    pub sha256: Vec<HashEntry>,
}

impl Release {
    pub fn parse(s: &str) -> Result<Self> {
        let records = parse_records(s)?;
        let record = records
            .first()
            .ok_or_else(|| format_err!("Release file is empty"))?;
        Release::from_record(record)
    }

    pub fn from_record(f: &Record) -> Result<Self> {
        let fields: Vec<&str> = f.get("SHA256").unwrap_or_default().split_whitespace().collect();
        if fields.len() % 3 != 0 {
            bail!("Malformed SHA256 index in Release, repository issue?");
        }

        let mut sha256 = Vec::with_capacity(fields.len() / 3);
        for line in fields.chunks(3) {
            sha256.push(HashEntry {
                checksum: Checksum::from_sha256_str(line[0])
                    .context(format!("Bad checksum for {}", line[2]))?,
                size: line[1]
                    .parse()
                    .context(format!("Bad size for {}", line[2]))?,
                path: line[2].to_string(),
            });
        }

        Ok(Release { sha256 })
    }
}
