mod checksum;
mod expression;
mod package;
mod release;
mod version;

pub use checksum::Checksum;
pub use expression::{parse_expressions, parse_provides, Atom, Expression, ExpressionError, Relation};
pub use package::{Package, PackageIndex};
pub use release::Release;
pub use version::{Version, VersionError};

#[cfg(test)]
pub fn test_repo() -> std::sync::Arc<crate::repo::Repo> {
    std::sync::Arc::new(crate::repo::Repo {
        base: "https://archive.example.org/ubuntu".to_string(),
        suite: "noble".to_string(),
        component: "main".to_string(),
        arch: "amd64".to_string(),
    })
}

/// Build a package from extra control fields on top of name, version and architecture
#[cfg(test)]
pub fn test_package(name: &str, version: &str, arch: &str, fields: &[(&str, &str)]) -> Package {
    let mut all = vec![("Package", name), ("Version", version), ("Architecture", arch)];
    all.extend_from_slice(fields);
    let record = crate::utils::debcontrol::Record::from_fields(&all);
    Package::from_record(&record, test_repo()).unwrap()
}
