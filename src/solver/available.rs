use crate::{
    debug,
    types::{Package, PackageIndex},
};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Every package installable on the target architecture, newest version per name.
#[derive(Debug)]
pub struct AvailablePackages {
    arch: String,
    pkgs: BTreeMap<String, Arc<Package>>,
}

impl AvailablePackages {
    pub fn new(arch: &str) -> Self {
        AvailablePackages {
            arch: arch.to_string(),
            pkgs: BTreeMap::new(),
        }
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Merge packages of one repository. A name already known is only
    /// replaced by a strictly newer version.
    pub fn add_packages(&mut self, packages: impl IntoIterator<Item = Package>) {
        let (mut added, mut foreign) = (0, 0);
        for pkg in packages {
            if pkg.architecture != "all" && pkg.architecture != self.arch {
                foreign += 1;
                continue;
            }

            let newer = match self.pkgs.get(&pkg.name) {
                Some(current) => pkg.version > current.version,
                None => true,
            };
            if newer {
                self.pkgs.insert(pkg.name.clone(), Arc::new(pkg));
                added += 1;
            }
        }
        debug!(
            "{} packages merged, {} skipped for foreign architecture",
            added, foreign
        );
    }

    /// Packages tagged with `task`, in name order
    pub fn task<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a Arc<Package>> + 'a {
        self.pkgs.values().filter(move |pkg| pkg.task.contains(task))
    }

    pub fn len(&self) -> usize {
        self.pkgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pkgs.is_empty()
    }
}

impl PackageIndex for AvailablePackages {
    fn get(&self, name: &str) -> Option<&Arc<Package>> {
        self.pkgs.get(name)
    }

    fn packages(&self) -> Box<dyn Iterator<Item = &Arc<Package>> + '_> {
        Box::new(self.pkgs.values())
    }
}
