//! Concrete package sources.
//!
//! Repository indexes are JSON arrays of packages, optionally gzip-compressed
//! when the location ends in `.gz`. Search providers and build scripts are
//! served over HTTP.

mod index;
mod local;
mod script;
mod search;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;

use crate::package::Package;

pub use index::HttpIndexSource;
pub use local::FileIndexSource;
pub use script::HttpScriptSource;
pub use search::HttpSearchProvider;

/// Decode an index body read from `location`.
pub fn decode_index(location: &str, bytes: &[u8]) -> Result<Vec<Package>> {
    if location.ends_with(".gz") {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .with_context(|| format!("Failed to decompress {}", location))?;
        parse_index(location, &json)
    } else {
        parse_index(location, bytes)
    }
}

fn parse_index(location: &str, json: &[u8]) -> Result<Vec<Package>> {
    serde_json::from_slice(json).with_context(|| format!("Invalid package index {}", location))
}
