//! Build-script fetchers, looked up by name.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback that produces an opaque build script.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn build(&self, args: &[String]) -> Result<serde_json::Value>;
}

/// A request for the build script registered under `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildScript {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BuildScript {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

pub struct ScriptFetcher {
    name: String,
    source: Arc<dyn ScriptSource>,
}

impl ScriptFetcher {
    pub fn new(name: impl Into<String>, source: Arc<dyn ScriptSource>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn build(&self, args: &[String]) -> Result<serde_json::Value> {
        self.source.build(args).await
    }
}
