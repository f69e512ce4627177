use super::{Version, VersionError};
use std::cmp::{max, Ord, Ordering};

/// dpkg version comparison.
/// Check https://www.debian.org/doc/debian-policy/ch-controlfields.html#version
impl Version {
    /// Compare two versions, reporting characters or numbers the algorithm can't rank.
    pub fn try_compare(&self, other: &Self) -> Result<Ordering, VersionError> {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => (),
            ord => return Ok(ord),
        }

        match compare_fragment(&self.upstream_version, &other.upstream_version)? {
            Ordering::Equal => (),
            ord => return Ok(ord),
        }

        compare_fragment(
            or_zero(&self.debian_revision),
            or_zero(&other.debian_revision),
        )
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Parsed versions are already sanitized, only hand-built ones can fail here
        self.try_compare(other)
            .unwrap_or_else(|e| panic!("cannot order {} against {}: {}", self, other, e))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Compare an upstream version or a revision by alternating non-digit and digit runs.
pub(super) fn compare_fragment(mut a: &str, mut b: &str) -> Result<Ordering, VersionError> {
    while !a.is_empty() || !b.is_empty() {
        let (a_letters, a_rest) = cut_prefix(a, false);
        let (b_letters, b_rest) = cut_prefix(b, false);
        match compare_letters(a_letters, b_letters)? {
            Ordering::Equal => (),
            ord => return Ok(ord),
        }

        let (a_digits, a_rest) = cut_prefix(a_rest, true);
        let (b_digits, b_rest) = cut_prefix(b_rest, true);
        match parse_digits(a_digits)?.cmp(&parse_digits(b_digits)?) {
            Ordering::Equal => (),
            ord => return Ok(ord),
        }

        a = a_rest;
        b = b_rest;
    }

    Ok(Ordering::Equal)
}

pub(super) fn compare_letters(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    for i in 0..max(a.len(), b.len()) {
        match order(a.get(i).copied())?.cmp(&order(b.get(i).copied())?) {
            Ordering::Equal => (),
            ord => return Ok(ord),
        }
    }

    Ok(Ordering::Equal)
}

/// Rank of a character inside a non-digit run. `None` is the end of the run.
pub(super) fn order(c: Option<u8>) -> Result<i32, VersionError> {
    match c {
        Some(b'~') => Ok(-1),
        None => Ok(0),
        Some(c @ b'A'..=b'Z') => Ok(i32::from(c - b'A') + 1),
        Some(c @ b'a'..=b'z') => Ok(i32::from(c - b'a') + 27),
        Some(b'+') => Ok(53),
        Some(b'-') => Ok(54),
        Some(b'.') => Ok(55),
        Some(c) => Err(VersionError::InvalidChar(c as char)),
    }
}

/// Split `s` after its leading run of digits (or non-digits).
pub(super) fn cut_prefix(s: &str, digits: bool) -> (&str, &str) {
    let end = s
        .find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(s.len());
    s.split_at(end)
}

fn parse_digits(s: &str) -> Result<u64, VersionError> {
    or_zero(s)
        .parse()
        .map_err(|_| VersionError::Overflow(s.to_string()))
}

fn or_zero(s: &str) -> &str {
    if s.is_empty() {
        "0"
    } else {
        s
    }
}
