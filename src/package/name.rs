//! Package identity.
//!
//! A [`PackageName`] is the short name of a package plus optional
//! distribution, version and architecture qualifiers. The text form is
//! `[distribution/]name[@version][:architecture]`.
//!
//! Versions may contain `:` (Debian epochs such as `1:8.5.0`). The
//! architecture is whatever follows the last `:`, so a version with a `:`
//! and no architecture is written with a trailing `:` (`curl@1:8.5.0:`).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a package, or a query for one when qualifiers are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageName {
    #[serde(default)]
    pub distribution: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub architecture: String,
}

impl PackageName {
    /// Create an unqualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the distribution qualifier.
    pub fn distribution(mut self, distribution: impl Into<String>) -> Self {
        self.distribution = distribution.into();
        self
    }

    /// Set the version qualifier.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the architecture qualifier.
    pub fn architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    /// The deduplication key used when building installation plans.
    ///
    /// Two names that differ only in their qualifiers share a short name and
    /// are treated as the same installed unit.
    pub fn short_name(&self) -> &str {
        &self.name
    }

    /// Check whether this name satisfies `query`.
    ///
    /// Names must be equal; every qualifier the query sets must be equal too.
    /// Empty qualifiers in the query match anything.
    pub fn matches(&self, query: &PackageName) -> bool {
        fn qualifier(want: &str, have: &str) -> bool {
            want.is_empty() || want == have
        }

        self.name == query.name
            && qualifier(&query.distribution, &self.distribution)
            && qualifier(&query.version, &self.version)
            && qualifier(&query.architecture, &self.architecture)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.distribution.is_empty() {
            write!(f, "{}/", self.distribution)?;
        }
        write!(f, "{}", self.name)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        if !self.architecture.is_empty() {
            write!(f, ":{}", self.architecture)?;
        } else if self.version.contains(':') {
            write!(f, ":")?;
        }
        Ok(())
    }
}

impl FromStr for PackageName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (distribution, rest) = match s.split_once('/') {
            Some((distro, rest)) => (distro, rest),
            None => ("", s),
        };
        let (name, version, architecture) = match rest.split_once('@') {
            Some((name, qualified)) => {
                let (version, arch) = qualified.rsplit_once(':').unwrap_or((qualified, ""));
                (name, version, arch)
            }
            None => {
                let (name, arch) = rest.rsplit_once(':').unwrap_or((rest, ""));
                (name, "", arch)
            }
        };

        if name.is_empty() {
            anyhow::bail!(
                "Invalid package name '{}'. Expected '[distribution/]name[@version][:architecture]'.",
                s
            );
        }

        Ok(PackageName {
            distribution: distribution.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            architecture: architecture.to_string(),
        })
    }
}

impl From<&str> for PackageName {
    fn from(name: &str) -> Self {
        PackageName::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let name: PackageName = "curl".parse().unwrap();
        assert_eq!(name, PackageName::new("curl"));
    }

    #[test]
    fn test_parse_fully_qualified() {
        let name: PackageName = "alpine/curl@8.5.0:x86_64".parse().unwrap();
        assert_eq!(name.distribution, "alpine");
        assert_eq!(name.name, "curl");
        assert_eq!(name.version, "8.5.0");
        assert_eq!(name.architecture, "x86_64");
    }

    #[test]
    fn test_parse_partial_qualifiers() {
        let name: PackageName = "debian/libc6:amd64".parse().unwrap();
        assert_eq!(name.distribution, "debian");
        assert_eq!(name.name, "libc6");
        assert!(name.version.is_empty());
        assert_eq!(name.architecture, "amd64");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<PackageName>().is_err());
        assert!("alpine/".parse::<PackageName>().is_err());
        assert!("@1.0".parse::<PackageName>().is_err());
    }

    #[test]
    fn test_display_round_trips_text_form() {
        for text in [
            "curl",
            "alpine/curl",
            "curl@1.0",
            "alpine/curl@8.5.0:x86_64",
            "debian/curl@1:8.5.0:",
            "debian/curl@1:8.5.0:amd64",
        ] {
            let name: PackageName = text.parse().unwrap();
            assert_eq!(name.to_string(), text);
        }
    }

    #[test]
    fn test_epoch_version_round_trips() {
        for name in [
            PackageName::new("curl").version("1:8.5.0"),
            PackageName::new("curl").version("1:8.5.0").architecture("amd64"),
        ] {
            let parsed: PackageName = name.to_string().parse().unwrap();
            assert_eq!(parsed, name);
        }

        let name: PackageName = "curl@1:8.5.0:".parse().unwrap();
        assert_eq!(name.version, "1:8.5.0");
        assert!(name.architecture.is_empty());
    }

    #[test]
    fn test_short_name_ignores_qualifiers() {
        let a = PackageName::new("bash").distribution("alpine").version("5.2");
        let b = PackageName::new("bash").architecture("aarch64");
        assert_eq!(a.short_name(), b.short_name());
        assert_ne!(a, b);
    }

    #[test]
    fn test_matches_empty_qualifiers_match_anything() {
        let pkg = PackageName::new("bash")
            .distribution("alpine")
            .version("5.2")
            .architecture("x86_64");
        assert!(pkg.matches(&PackageName::new("bash")));
        assert!(pkg.matches(&PackageName::new("bash").distribution("alpine")));
        assert!(!pkg.matches(&PackageName::new("bash").distribution("debian")));
        assert!(!pkg.matches(&PackageName::new("bash").version("5.1")));
        assert!(!pkg.matches(&PackageName::new("zsh")));
    }

    #[test]
    fn test_deserialize_defaults_qualifiers() {
        let name: PackageName = serde_json::from_str(r#"{"name": "curl"}"#).unwrap();
        assert_eq!(name, PackageName::new("curl"));
    }
}
