mod ord;
mod parse;

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// A dpkg style package version: `[epoch:]upstream_version[-debian_revision]`.
///
/// Equality follows the dpkg ordering, so `1.0` and `1.00` (or `1.0-0` and
/// `1.0`) are the same version even though they are spelled differently.
#[derive(Clone, Debug, Default)]
pub struct Version {
    pub epoch: u64,
    pub upstream_version: String,
    pub debian_revision: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid epoch in version {0:?}")]
    InvalidEpoch(String),
    #[error("invalid upstream version {0:?}")]
    InvalidUpstream(String),
    #[error("invalid debian revision {0:?}")]
    InvalidRevision(String),
    #[error("numeric component {0:?} does not fit in 64 bits")]
    Overflow(String),
    #[error("invalid character {0:?} in version")]
    InvalidChar(char),
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.upstream_version)?;
        if !self.debian_revision.is_empty() {
            write!(f, "-{}", self.debian_revision)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
