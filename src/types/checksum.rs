use anyhow::{bail, Context, Result};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt::Display, fs::File, io, path::Path};

/// A SHA256 digest taken from repository metadata.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Checksum(Vec<u8>);

pub struct ChecksumValidator {
    expected: Vec<u8>,
    hasher: Sha256,
}

impl ChecksumValidator {
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.hasher.update(data);
    }

    pub fn finish(self) -> bool {
        self.expected == self.hasher.finalize().to_vec()
    }
}

impl Checksum {
    pub fn from_sha256_str(s: &str) -> Result<Self> {
        if s.len() != 64 {
            bail!("Malformed Sha256 string: bad length")
        }
        Ok(Checksum(hex::decode(s)?))
    }

    #[cfg(test)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn get_validator(&self) -> ChecksumValidator {
        ChecksumValidator {
            expected: self.0.clone(),
            hasher: Sha256::new(),
        }
    }

    pub fn cmp_read(&self, mut r: impl io::Read) -> Result<bool> {
        let mut hasher = Sha256::new();
        io::copy(&mut r, &mut hasher)?;
        Ok(self.0 == hasher.finalize().to_vec())
    }

    pub fn cmp_file(&self, path: &Path) -> Result<bool> {
        let file = File::open(path).context(format!(
            "Failed to open {} for checking checksum",
            path.display()
        ))?;

        self.cmp_read(file)
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("sha256::")?;
        f.write_str(&hex::encode(&self.0))
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}
