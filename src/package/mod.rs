//! Package data model
//!
//! Packages are produced by fetch callbacks and never mutated afterwards;
//! everything downstream shares them as `Arc<Package>`.

mod name;

use serde::{Deserialize, Serialize};

pub use name::PackageName;

/// One resolvable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Primary identity.
    pub name: PackageName,
    /// Alternate identities that satisfy the same dependency.
    #[serde(default)]
    pub aliases: Vec<PackageName>,
    /// Dependency groups. Alternatives inside a group are OR-ed, groups are AND-ed.
    #[serde(default)]
    pub depends: Vec<Vec<PackageName>>,
}

impl Package {
    pub fn new(name: PackageName) -> Self {
        Self {
            name,
            aliases: Vec::new(),
            depends: Vec::new(),
        }
    }

    /// Add an alias.
    pub fn alias(mut self, alias: PackageName) -> Self {
        self.aliases.push(alias);
        self
    }

    /// Add a dependency group of alternatives.
    pub fn depends_on(mut self, group: Vec<PackageName>) -> Self {
        self.depends.push(group);
        self
    }

    /// Check whether this package, through its name or any alias, satisfies `query`.
    pub fn matches(&self, query: &PackageName) -> bool {
        self.name.matches(query) || self.aliases.iter().any(|alias| alias.matches(query))
    }

    /// The primary name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        std::iter::once(&self.name).chain(self.aliases.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_alias() {
        let pkg = Package::new(PackageName::new("python3").distribution("alpine"))
            .alias(PackageName::new("python").distribution("alpine"));

        assert!(pkg.matches(&PackageName::new("python3")));
        assert!(pkg.matches(&PackageName::new("python")));
        assert!(!pkg.matches(&PackageName::new("python").distribution("debian")));
        assert!(!pkg.matches(&PackageName::new("perl")));
    }

    #[test]
    fn test_names_lists_primary_first() {
        let pkg = Package::new("sh".into()).alias("bash".into()).alias("dash".into());
        let names: Vec<_> = pkg.names().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["sh", "bash", "dash"]);
    }

    #[test]
    fn test_deserialize_minimal_package() {
        let pkg: Package = serde_json::from_str(
            r#"{"name": {"name": "curl"}, "depends": [[{"name": "libcurl"}, {"name": "curl-minimal"}]]}"#,
        )
        .unwrap();

        assert_eq!(pkg.name, PackageName::new("curl"));
        assert!(pkg.aliases.is_empty());
        assert_eq!(pkg.depends.len(), 1);
        assert_eq!(pkg.depends[0][1], PackageName::new("curl-minimal"));
    }
}
