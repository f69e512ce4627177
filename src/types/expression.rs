use super::{Package, PackageIndex, Version, VersionError};
use crate::utils::debcontrol::parse_relation_list;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("failed to match relation {0:?}")]
    Malformed(String),
    #[error("empty relation in {0:?}")]
    Empty(String),
    #[error("invalid version in relation {relation:?}")]
    Version {
        relation: String,
        #[source]
        source: VersionError,
    },
    #[error("provides entry {0:?} lists alternatives")]
    ProvidesAlternatives(String),
    #[error("provides entry {0:?} must use an exact version")]
    ProvidesRelation(String),
}

/// Version relation operators allowed in dependency fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Earlier,
    EarlierEqual,
    Exactly,
    LaterEqual,
    Later,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Earlier => "<<",
            Relation::EarlierEqual => "<=",
            Relation::Exactly => "=",
            Relation::LaterEqual => ">=",
            Relation::Later => ">>",
        }
    }

    /// Whether `candidate` stands in this relation to `wanted`.
    pub fn holds(&self, candidate: &Version, wanted: &Version) -> bool {
        match self {
            Relation::Earlier => candidate < wanted,
            Relation::EarlierEqual => candidate <= wanted,
            Relation::Exactly => candidate == wanted,
            Relation::LaterEqual => candidate >= wanted,
            Relation::Later => candidate > wanted,
        }
    }
}

/// A single `name (op version)` constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Atom {
    pub package: String,
    pub constraint: Option<(Relation, Version)>,
}

/// One comma separated term of a relationship field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Atom(Atom),
    /// `a | b | c`, tried in declared order. Always holds two or more atoms.
    Alternatives(Vec<Atom>),
}

impl Atom {
    #[cfg(test)]
    pub fn new(package: &str) -> Self {
        Atom {
            package: package.to_string(),
            constraint: None,
        }
    }

    #[cfg(test)]
    pub fn with_constraint(package: &str, relation: Relation, version: Version) -> Self {
        Atom {
            package: package.to_string(),
            constraint: Some((relation, version)),
        }
    }

    /// Check if a package (or a provide) called `name` at `version` fulfills this atom.
    /// Anything without a version only fulfills unversioned atoms.
    pub fn is_satisfied_by(&self, name: &str, version: Option<&Version>) -> bool {
        if self.package != name {
            return false;
        }

        match (&self.constraint, version) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((relation, wanted)), Some(candidate)) => relation.holds(candidate, wanted),
        }
    }

    /// The version a provide entry announces, if any.
    pub fn provided_version(&self) -> Option<&Version> {
        self.constraint.as_ref().map(|(_, v)| v)
    }

    pub fn find_satisfying_package<'a, P>(&self, pool: &'a P) -> Option<&'a Arc<Package>>
    where
        P: PackageIndex + ?Sized,
    {
        if let Some(pkg) = pool.get(&self.package) {
            if self.is_satisfied_by(&pkg.name, Some(&pkg.version)) {
                return Some(pkg);
            }
        }

        // TODO: index provides by name, this walks the whole pool
        pool.packages().find(|pkg| {
            pkg.provides
                .iter()
                .any(|provide| self.is_satisfied_by(&provide.package, provide.provided_version()))
        })
    }
}

impl Expression {
    pub fn find_satisfying_package<'a, P>(&self, pool: &'a P) -> Option<&'a Arc<Package>>
    where
        P: PackageIndex + ?Sized,
    {
        match self {
            Expression::Atom(atom) => atom.find_satisfying_package(pool),
            Expression::Alternatives(atoms) => atoms
                .iter()
                .find_map(|atom| atom.find_satisfying_package(pool)),
        }
    }

    pub fn atoms(&self) -> &[Atom] {
        match self {
            Expression::Atom(atom) => std::slice::from_ref(atom),
            Expression::Alternatives(atoms) => atoms,
        }
    }
}

/// Parse a relationship field such as `Depends`. An empty field yields no expressions.
pub fn parse_expressions(field: &str) -> Result<Vec<Expression>, ExpressionError> {
    parse_relation_list(field)
}

/// Parse a `Provides` field. Every entry has to be a plain atom, optionally `(= version)`.
pub fn parse_provides(field: &str) -> Result<Vec<Atom>, ExpressionError> {
    parse_relation_list(field)?
        .into_iter()
        .map(|expr| match expr {
            Expression::Atom(atom) => match atom.constraint {
                None | Some((Relation::Exactly, _)) => Ok(atom),
                Some(_) => Err(ExpressionError::ProvidesRelation(atom.to_string())),
            },
            alternatives => Err(ExpressionError::ProvidesAlternatives(
                alternatives.to_string(),
            )),
        })
        .collect()
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.package)?;
        if let Some((relation, version)) = &self.constraint {
            write!(f, " ({} {})", relation, version)?;
        }
        Ok(())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Atom(atom) => atom.fmt(f),
            Expression::Alternatives(atoms) => {
                for (i, atom) in atoms.iter().enumerate() {
                    if i != 0 {
                        f.write_str(" | ")?;
                    }
                    atom.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::test_package;
    use std::collections::BTreeMap;
    use std::convert::TryFrom;

    fn ver(s: &str) -> Version {
        Version::try_from(s).unwrap()
    }

    fn pool(pkgs: Vec<Package>) -> BTreeMap<String, Arc<Package>> {
        pkgs.into_iter()
            .map(|p| (p.name.clone(), Arc::new(p)))
            .collect()
    }

    #[test]
    fn relation_semantics() {
        let tests = vec![
            (Relation::Earlier, "1.0", "2.0", true),
            (Relation::Earlier, "2.0", "2.0", false),
            (Relation::EarlierEqual, "2.0", "2.0", true),
            (Relation::EarlierEqual, "2.1", "2.0", false),
            (Relation::Exactly, "2.0", "2.00", true),
            (Relation::Exactly, "2.0-1", "2.0", false),
            (Relation::LaterEqual, "2.0", "2.0", true),
            (Relation::LaterEqual, "1.9", "2.0", false),
            (Relation::Later, "2.0~rc1", "1.9", true),
            (Relation::Later, "2.0", "2.0", false),
        ];

        for (relation, candidate, wanted, res) in tests {
            assert_eq!(
                relation.holds(&ver(candidate), &ver(wanted)),
                res,
                "{} {} {}",
                candidate,
                relation,
                wanted
            );
        }
    }

    #[test]
    fn atom_round_trip() {
        for s in ["foo (>= 1.2-3)", "foo", "libc6 (<< 1:2.39)", "a+b.c (= 1.0~rc1)"] {
            let exprs = parse_expressions(s).unwrap();
            assert_eq!(exprs.len(), 1);
            assert_eq!(exprs[0].to_string(), s);
            assert_eq!(parse_expressions(&exprs[0].to_string()).unwrap(), exprs);
        }
    }

    #[test]
    fn find_by_name_then_provides() {
        let pool = pool(vec![
            test_package("b", "1.0", "amd64", &[("Provides", "c (= 3.0), virtual")]),
            test_package("c", "1.0", "amd64", &[]),
        ]);

        let find = |s: &str| {
            parse_expressions(s).unwrap()[0]
                .find_satisfying_package(&pool)
                .map(|p| p.name.clone())
        };

        // Literal name wins when its version fits
        assert_eq!(find("c").as_deref(), Some("c"));
        assert_eq!(find("c (<< 2.0)").as_deref(), Some("c"));
        // Otherwise a versioned provide may step in
        assert_eq!(find("c (>= 2.0)").as_deref(), Some("b"));
        assert_eq!(find("c (>= 4.0)"), None);
        // Unversioned provides only satisfy unversioned relations
        assert_eq!(find("virtual").as_deref(), Some("b"));
        assert_eq!(find("virtual (>= 1)"), None);
        assert_eq!(find("missing | c (>= 2.0)").as_deref(), Some("b"));
        assert_eq!(find("missing | nothing"), None);
    }

    #[test]
    fn alternatives_in_declared_order() {
        let pool = pool(vec![
            test_package("x", "1", "amd64", &[]),
            test_package("y", "1", "amd64", &[]),
        ]);
        let expr = &parse_expressions("y | x").unwrap()[0];
        assert_eq!(expr.atoms().len(), 2);
        assert_eq!(expr.find_satisfying_package(&pool).unwrap().name, "y");
    }

    #[test]
    fn provides_must_be_atomic() {
        assert_eq!(
            parse_provides("a | b"),
            Err(ExpressionError::ProvidesAlternatives("a | b".to_string()))
        );
        assert_eq!(
            parse_provides("a (>= 1)"),
            Err(ExpressionError::ProvidesRelation("a (>= 1)".to_string()))
        );
        let provides = parse_provides("a (= 1), b").unwrap();
        assert_eq!(provides[0].provided_version(), Some(&ver("1")));
        assert_eq!(provides[1].provided_version(), None);
    }
}
