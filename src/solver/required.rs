use super::{AvailablePackages, ResolveError};
use crate::{
    debug,
    types::{Checksum, Expression, Package, PackageIndex, Version},
};

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The packages an image needs: explicit requests plus their dependency closure.
#[derive(Debug, Default)]
pub struct RequiredPackages {
    pkgs: BTreeMap<String, Arc<Package>>,
}

/// Outcome of resolving one expression
enum Resolution {
    Satisfied,
    Add(Arc<Package>),
    Unsatisfiable,
    Ambiguous(Vec<String>),
}

/// One line of the resolved package manifest
#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub version: Version,
    pub architecture: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Checksum>,
}

impl RequiredPackages {
    pub fn new() -> Self {
        RequiredPackages::default()
    }

    /// Require packages by exact name.
    pub fn add<S: AsRef<str>>(
        &mut self,
        available: &AvailablePackages,
        names: &[S],
    ) -> Result<(), ResolveError> {
        for name in names {
            let name = name.as_ref();
            let pkg = available
                .get(name)
                .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;
            self.insert(pkg.clone());
        }

        Ok(())
    }

    /// Require every available package belonging to `task`.
    pub fn add_task(
        &mut self,
        available: &AvailablePackages,
        task: &str,
    ) -> Result<usize, ResolveError> {
        let mut count = 0;
        for pkg in available.task(task) {
            self.insert(pkg.clone());
            count += 1;
        }
        if count == 0 {
            return Err(ResolveError::EmptyTask(task.to_string()));
        }
        debug!("Task {} selects {} packages", task, count);

        Ok(count)
    }

    /// Expand the set until every Pre-Depends and Depends of every member is met.
    ///
    /// A Recommends entry that can't be resolved, or resolves to several
    /// candidates, is ignored. Once a recommended package joins the set it is
    /// a member like any other, so its own Depends must be met as well.
    pub fn add_dependencies(&mut self, available: &AvailablePackages) -> Result<(), ResolveError> {
        let mut pass = 0;
        loop {
            pass += 1;
            let mut changed = false;
            // New members are picked up by the next pass
            let snapshot: Vec<Arc<Package>> = self.pkgs.values().cloned().collect();
            for pkg in &snapshot {
                for dep in pkg.mandatory() {
                    match self.resolve(available, dep) {
                        Resolution::Satisfied => (),
                        Resolution::Add(new) => changed |= self.insert(new),
                        Resolution::Unsatisfiable => {
                            return Err(ResolveError::Unsatisfiable {
                                package: pkg.name.clone(),
                                dependency: dep.to_string(),
                            })
                        }
                        Resolution::Ambiguous(candidates) => {
                            return Err(ResolveError::Ambiguous {
                                package: pkg.name.clone(),
                                dependency: dep.to_string(),
                                candidates,
                            })
                        }
                    }
                }

                for dep in &pkg.recommends {
                    match self.resolve(available, dep) {
                        Resolution::Satisfied => (),
                        Resolution::Add(new) => changed |= self.insert(new),
                        Resolution::Unsatisfiable => {
                            debug!("Skipping recommendation {} of {}", dep, pkg.name);
                        }
                        Resolution::Ambiguous(candidates) => {
                            debug!(
                                "Skipping recommendation {} of {}, candidates: {}",
                                dep,
                                pkg.name,
                                candidates.join(", ")
                            );
                        }
                    }
                }
            }

            if !changed {
                debug!("Dependency closure reached after {} passes", pass);
                return Ok(());
            }
        }
    }

    fn resolve(&self, available: &AvailablePackages, dep: &Expression) -> Resolution {
        if dep.find_satisfying_package(self).is_some() {
            return Resolution::Satisfied;
        }

        let mut candidates: Vec<&Arc<Package>> = Vec::new();
        for atom in dep.atoms() {
            if let Some(pkg) = atom.find_satisfying_package(available) {
                if !candidates.iter().any(|c| Arc::ptr_eq(c, pkg)) {
                    candidates.push(pkg);
                }
            }
        }

        match candidates.len() {
            0 => Resolution::Unsatisfiable,
            1 => Resolution::Add(candidates[0].clone()),
            _ => Resolution::Ambiguous(candidates.iter().map(|p| p.name.clone()).collect()),
        }
    }

    /// Returns whether the set actually changed
    fn insert(&mut self, pkg: Arc<Package>) -> bool {
        match self.pkgs.get(&pkg.name) {
            Some(current) if Arc::ptr_eq(current, &pkg) => false,
            _ => {
                self.pkgs.insert(pkg.name.clone(), pkg);
                true
            }
        }
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.pkgs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pkgs.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pkgs.is_empty()
    }

    /// Resolved packages in name order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.pkgs.values()
    }

    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.pkgs
            .values()
            .map(|pkg| ManifestEntry {
                name: pkg.name.clone(),
                version: pkg.version.clone(),
                architecture: pkg.architecture.clone(),
                url: pkg.url(),
                sha256: pkg.sha256.clone(),
            })
            .collect()
    }
}

impl PackageIndex for RequiredPackages {
    fn get(&self, name: &str) -> Option<&Arc<Package>> {
        self.pkgs.get(name)
    }

    fn packages(&self) -> Box<dyn Iterator<Item = &Arc<Package>> + '_> {
        Box::new(self.pkgs.values())
    }
}
