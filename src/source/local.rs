use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use super::decode_index;
use crate::fetcher::Fetch;
use crate::package::Package;
use crate::runtime::Runtime;

/// A repository index read from the local filesystem.
pub struct FileIndexSource<R: Runtime> {
    runtime: R,
    path: PathBuf,
}

impl<R: Runtime> FileIndexSource<R> {
    pub fn new(runtime: R, path: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            path: path.into(),
        }
    }
}

#[async_trait]
impl<R: Runtime + 'static> Fetch for FileIndexSource<R> {
    fn identity(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self, _key: &str, _force: bool) -> Result<Vec<Package>> {
        let bytes = self
            .runtime
            .read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        decode_index(&self.identity(), &bytes)
    }
}
