use super::{Version, VersionError};

use lazy_static::lazy_static;
use regex::Regex;
use std::convert::TryFrom;
use std::str::FromStr;

lazy_static! {
    static ref EPOCH: Regex = Regex::new("^[0-9]+$").unwrap();
    static ref UPSTREAM_VERSION: Regex = Regex::new(r"^[A-Za-z0-9.+~\-]*$").unwrap();
    static ref DEBIAN_REVISION: Regex = Regex::new(r"^[A-Za-z0-9.+~]*$").unwrap();
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (epoch, rest) = match s.split_once(':') {
            Some((epoch, rest)) => {
                if !EPOCH.is_match(epoch) {
                    return Err(VersionError::InvalidEpoch(s.to_string()));
                }
                let epoch = epoch
                    .parse()
                    .map_err(|_| VersionError::Overflow(epoch.to_string()))?;
                (epoch, rest)
            }
            None => (0, s),
        };

        // The revision starts after the last hyphen, so the upstream part may keep its own
        let (upstream_version, debian_revision) = rest.rsplit_once('-').unwrap_or((rest, ""));
        if !DEBIAN_REVISION.is_match(debian_revision) {
            return Err(VersionError::InvalidRevision(debian_revision.to_string()));
        }
        if !UPSTREAM_VERSION.is_match(upstream_version) {
            return Err(VersionError::InvalidUpstream(upstream_version.to_string()));
        }
        check_digit_runs(upstream_version)?;
        check_digit_runs(debian_revision)?;

        Ok(Version {
            epoch,
            upstream_version: upstream_version.to_string(),
            debian_revision: debian_revision.to_string(),
        })
    }
}

impl TryFrom<&str> for Version {
    type Error = VersionError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Ordering parses every digit run as a u64, so refuse anything larger up front.
fn check_digit_runs(s: &str) -> Result<(), VersionError> {
    for run in s.split(|c: char| !c.is_ascii_digit()).filter(|run| !run.is_empty()) {
        run.parse::<u64>()
            .map_err(|_| VersionError::Overflow(run.to_string()))?;
    }
    Ok(())
}
