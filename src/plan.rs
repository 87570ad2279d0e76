//! Installation planning.
//!
//! Resolves a set of requested names into an ordered package list in which
//! every package comes after the packages it depends on.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

use crate::database::PackageDatabase;
use crate::error::DatabaseError;
use crate::package::{Package, PackageName};

/// Package lookup used while planning.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &PackageName, max_results: usize) -> Result<Vec<Arc<Package>>>;
}

#[async_trait]
impl Searcher for PackageDatabase {
    async fn search(&self, query: &PackageName, max_results: usize) -> Result<Vec<Arc<Package>>> {
        PackageDatabase::search(self, query, max_results).await
    }
}

/// Ordered result of planning.
#[derive(Debug, Default)]
pub struct InstallationPlan {
    /// Short names of every package and alias already in the plan.
    installed: HashSet<String>,
    packages: Vec<Arc<Package>>,
}

enum Visit {
    Installed,
    Resolved(Arc<Package>),
}

/// A package whose dependency groups are being resolved.
struct Frame {
    package: Arc<Package>,
    group: usize,
    option: usize,
}

impl Frame {
    fn new(package: Arc<Package>) -> Self {
        Self {
            package,
            group: 0,
            option: 0,
        }
    }

    fn next_group(&mut self) {
        self.group += 1;
        self.option = 0;
    }
}

impl InstallationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packages in installation order.
    pub fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }

    pub fn into_packages(self) -> Vec<Arc<Package>> {
        self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Whether `name` (or a package aliased to it) is already planned.
    pub fn is_installed(&self, name: &PackageName) -> bool {
        self.installed.contains(name.short_name())
    }

    /// Add `query` and everything it depends on.
    ///
    /// A package is marked before its dependencies are resolved, so cycles
    /// terminate, and appended after them. For each dependency group the
    /// options are tried in order; an option that cannot be found moves on
    /// to the next one, any other error aborts.
    pub async fn add<S: Searcher + ?Sized>(&mut self, searcher: &S, query: &PackageName) -> Result<()> {
        let root = match self.visit(searcher, query).await? {
            Visit::Installed => return Ok(()),
            Visit::Resolved(pkg) => pkg,
        };

        let mut stack = vec![Frame::new(root)];

        while let Some(frame) = stack.last_mut() {
            let next = frame
                .package
                .depends
                .get(frame.group)
                .map(|group| group.get(frame.option).cloned().ok_or(group));

            match next {
                None => {
                    if let Some(done) = stack.pop() {
                        debug!("Planned {}", done.package.name);
                        self.packages.push(done.package);
                    }
                }
                Some(Err(group)) => {
                    return Err(DatabaseError::NoCandidate(group.clone()).into());
                }
                Some(Ok(option)) => match self.visit(searcher, &option).await {
                    Ok(Visit::Installed) => frame.next_group(),
                    Ok(Visit::Resolved(pkg)) => {
                        frame.next_group();
                        stack.push(Frame::new(pkg));
                    }
                    Err(e) if DatabaseError::is_not_found(&e) => {
                        debug!("{} not found, trying next alternative", option);
                        frame.option += 1;
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        Ok(())
    }

    /// Look up `query` and mark it (with its aliases) as installed.
    async fn visit<S: Searcher + ?Sized>(&mut self, searcher: &S, query: &PackageName) -> Result<Visit> {
        if self.is_installed(query) {
            return Ok(Visit::Installed);
        }

        let mut results = searcher.search(query, 1).await?;
        let pkg = match results.len() {
            0 => return Err(DatabaseError::NotFound(query.clone()).into()),
            1 => results.remove(0),
            count => {
                return Err(DatabaseError::Ambiguous {
                    query: query.clone(),
                    count,
                }
                .into());
            }
        };

        for name in pkg.names() {
            self.installed.insert(name.short_name().to_string());
        }

        Ok(Visit::Resolved(pkg))
    }
}

/// Plan the installation of `names` and their dependencies.
#[tracing::instrument(skip(searcher))]
pub async fn make_installation_plan<S: Searcher + ?Sized>(
    searcher: &S,
    names: &[PackageName],
) -> Result<InstallationPlan> {
    let mut plan = InstallationPlan::new();
    for name in names {
        plan.add(searcher, name).await?;
    }
    Ok(plan)
}

impl PackageDatabase {
    pub async fn make_installation_plan(&self, names: &[PackageName]) -> Result<InstallationPlan> {
        make_installation_plan(self, names).await
    }
}
