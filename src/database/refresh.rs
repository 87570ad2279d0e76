use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use super::PackageDatabase;
use crate::fetcher::RepositoryFetcher;

// `tokio::time::interval` rejects a zero period.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

struct RefreshRequest {
    fetcher: Arc<RepositoryFetcher>,
    force: bool,
}

/// Owns the scheduler and worker tasks of a running auto-refresh.
///
/// Dropping the handle stops the service, as does [`RefreshHandle::shutdown`].
pub struct RefreshHandle {
    tasks: JoinSet<()>,
    workers: usize,
}

impl RefreshHandle {
    /// Number of worker tasks serving refresh requests.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Stop every task and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
        debug!("Auto-refresh stopped");
    }
}

impl PackageDatabase {
    /// Keep every fetcher up to date in the background.
    ///
    /// The index is cleared, then each fetcher is fetched once (honoring
    /// `force`) and again with force every `interval`. At most
    /// `max_parallel` fetches run at a time; a value of zero is treated as
    /// one. Each success merges that fetcher's packages into the index and
    /// each failure is logged and left for the next tick.
    pub fn start_auto_refresh(
        self: &Arc<Self>,
        max_parallel: usize,
        interval: Duration,
        force: bool,
    ) -> RefreshHandle {
        let workers = max_parallel.max(1);
        let interval = interval.max(MIN_REFRESH_INTERVAL);

        self.index().clear();

        let (tx, rx) = mpsc::channel(workers);
        let rx = Arc::new(Mutex::new(rx));
        let mut tasks = JoinSet::new();

        for fetcher in &self.fetchers {
            tasks.spawn(schedule(Arc::clone(fetcher), tx.clone(), interval, force));
        }
        drop(tx);

        for id in 0..workers {
            tasks.spawn(work(id, Arc::clone(self), Arc::clone(&rx)));
        }

        info!(
            "Auto-refresh started: {} repositories, {} workers, every {}s",
            self.fetchers.len(),
            workers,
            interval.as_secs_f64()
        );

        RefreshHandle { tasks, workers }
    }
}

async fn schedule(
    fetcher: Arc<RepositoryFetcher>,
    tx: mpsc::Sender<RefreshRequest>,
    interval: Duration,
    force: bool,
) {
    let initial = RefreshRequest {
        fetcher: Arc::clone(&fetcher),
        force,
    };
    if tx.send(initial).await.is_err() {
        return;
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let request = RefreshRequest {
            fetcher: Arc::clone(&fetcher),
            force: true,
        };
        if tx.send(request).await.is_err() {
            return;
        }
    }
}

async fn work(
    id: usize,
    db: Arc<PackageDatabase>,
    rx: Arc<Mutex<mpsc::Receiver<RefreshRequest>>>,
) {
    loop {
        let request = rx.lock().await.recv().await;
        let Some(RefreshRequest { fetcher, force }) = request else {
            debug!("Refresh worker {} exiting", id);
            return;
        };

        if let Err(e) = fetcher.fetch_with_key(&db.env, fetcher.key(), force).await {
            warn!("could not update fetcher {}: {:#}", fetcher, e);
            continue;
        }

        db.merge_into_index(&fetcher);
        debug!(
            "Worker {} merged {} packages from {}",
            id,
            fetcher.package_count(),
            fetcher
        );
    }
}
