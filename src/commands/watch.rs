use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::config::{Config, Settings};
use crate::database::PackageDatabase;
use crate::fetcher::FetchStatus;
use crate::runtime::Runtime;

/// Keep every repository refreshed until Ctrl-C.
#[tracing::instrument(skip(runtime))]
pub async fn watch<R: Runtime + Clone + 'static>(
    runtime: R,
    settings: &Settings,
    parallel: usize,
    interval: Duration,
) -> Result<()> {
    let config = Config::new(runtime)?;
    let db = Arc::new(config.open_database(settings)?);

    let handle = db.start_auto_refresh(parallel, interval, settings.options.force_refresh);
    println!(
        "Watching {} repositories with {} workers; press Ctrl-C to stop.",
        db.fetchers().len(),
        handle.workers()
    );

    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            _ = ticker.tick() => info!("{}", summary(&db)),
        }
    }

    handle.shutdown().await;
    println!("{}", summary(&db));
    db.close()
}

fn summary(db: &PackageDatabase) -> String {
    let statuses = db.fetcher_status();
    let failed = statuses
        .iter()
        .filter(|s| s.status == FetchStatus::Failed)
        .count();
    format!(
        "{} packages indexed from {} repositories ({} failing)",
        db.indexed_count(),
        statuses.len(),
        failed
    )
}
