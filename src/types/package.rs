use super::{parse_expressions, parse_provides, Atom, Checksum, Expression, ExpressionError, Version, VersionError};
use crate::{repo::Repo, utils::debcontrol::Record};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// A binary package as described by one paragraph of a `Packages` file.
#[derive(Debug)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub architecture: String,
    pub provides: Vec<Atom>,
    pub pre_depends: Vec<Expression>,
    pub depends: Vec<Expression>,
    pub recommends: Vec<Expression>,
    /// Path relative to the repository base
    pub filename: String,
    pub size: Option<u64>,
    pub sha256: Option<Checksum>,
    pub task: BTreeSet<String>,
    pub repo: Arc<Repo>,
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("package record without {0} field")]
    MissingField(&'static str),
    #[error("invalid version for package {package}")]
    Version {
        package: String,
        #[source]
        source: VersionError,
    },
    #[error("invalid {field} field for package {package}")]
    Relation {
        package: String,
        field: &'static str,
        #[source]
        source: ExpressionError,
    },
    #[error("invalid {field} field for package {package}: {reason}")]
    InvalidField {
        package: String,
        field: &'static str,
        reason: String,
    },
}

/// Read access to a set of packages keyed by name.
pub trait PackageIndex {
    fn get(&self, name: &str) -> Option<&Arc<Package>>;
    /// Iterate all packages, ordered by name
    fn packages(&self) -> Box<dyn Iterator<Item = &Arc<Package>> + '_>;
}

impl PackageIndex for BTreeMap<String, Arc<Package>> {
    fn get(&self, name: &str) -> Option<&Arc<Package>> {
        BTreeMap::get(self, name)
    }

    fn packages(&self) -> Box<dyn Iterator<Item = &Arc<Package>> + '_> {
        Box::new(self.values())
    }
}

impl Package {
    pub fn from_record(f: &Record, repo: Arc<Repo>) -> Result<Self, PackageError> {
        let name = f
            .get("Package")
            .filter(|name| !name.is_empty())
            .ok_or(PackageError::MissingField("Package"))?
            .to_string();
        let version = f
            .get("Version")
            .ok_or(PackageError::MissingField("Version"))?
            .parse::<Version>()
            .map_err(|source| PackageError::Version {
                package: name.clone(),
                source,
            })?;

        let relation = |field: &'static str| {
            parse_expressions(f.get(field).unwrap_or_default()).map_err(|source| {
                PackageError::Relation {
                    package: name.clone(),
                    field,
                    source,
                }
            })
        };
        let pre_depends = relation("Pre-Depends")?;
        let depends = relation("Depends")?;
        let recommends = relation("Recommends")?;
        let provides = parse_provides(f.get("Provides").unwrap_or_default()).map_err(|source| {
            PackageError::Relation {
                package: name.clone(),
                field: "Provides",
                source,
            }
        })?;

        let size = match f.get("Size") {
            Some(size) => Some(size.parse().map_err(|_| PackageError::InvalidField {
                package: name.clone(),
                field: "Size",
                reason: format!("{:?} is not a number", size),
            })?),
            None => None,
        };
        let sha256 = match f.get("SHA256") {
            Some(hex) => Some(Checksum::from_sha256_str(hex).map_err(|e| {
                PackageError::InvalidField {
                    package: name.clone(),
                    field: "SHA256",
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        let task = f
            .get("Task")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Package {
            name,
            version,
            architecture: f.get("Architecture").unwrap_or_default().to_string(),
            provides,
            pre_depends,
            depends,
            recommends,
            filename: f.get("Filename").unwrap_or_default().to_string(),
            size,
            sha256,
            task,
            repo,
        })
    }

    /// Where this package can be downloaded from.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.repo.base.trim_end_matches('/'),
            self.filename.trim_start_matches('/')
        )
    }

    /// `Pre-Depends` followed by `Depends`.
    pub fn mandatory(&self) -> impl Iterator<Item = &Expression> {
        self.pre_depends.iter().chain(self.depends.iter())
    }
}
