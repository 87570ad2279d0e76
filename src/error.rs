//! Classifiable failures of the package database.
//!
//! Everything else travels as a plain `anyhow::Error` with context attached.
//! Callers that need to tell these apart use `downcast_ref::<DatabaseError>()`.

use thiserror::Error;

use crate::package::PackageName;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// No package matched the query. Recoverable: the planner tries the next alternative.
    #[error("package {0} not found")]
    NotFound(PackageName),

    /// More than one package matched where exactly one was required.
    #[error("package {query} is ambiguous: {count} candidates matched")]
    Ambiguous { query: PackageName, count: usize },

    /// Every alternative of a dependency group was not found.
    #[error("could not find installation candidate among options: {}", format_group(.0))]
    NoCandidate(Vec<PackageName>),

    #[error("no build script fetcher defined for: {0}")]
    UnknownScript(String),

    #[error("fetcher not found: {0}")]
    FetcherNotFound(String),

    #[error("local source {0} is only allowed with --allow-local")]
    LocalSourceDisallowed(String),

    #[error("cache is closed")]
    CacheClosed,
}

impl DatabaseError {
    /// Check whether `error` is a [`DatabaseError::NotFound`].
    pub fn is_not_found(error: &anyhow::Error) -> bool {
        matches!(
            error.downcast_ref::<DatabaseError>(),
            Some(DatabaseError::NotFound(_))
        )
    }
}

fn format_group(group: &[PackageName]) -> String {
    let names: Vec<String> = group.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(" | "))
}
