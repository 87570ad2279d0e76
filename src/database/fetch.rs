use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;
use tokio::task::JoinSet;

use super::PackageDatabase;
use crate::fetcher::{FetchEnvironment, RepositoryFetcher};

impl PackageDatabase {
    /// Fetch every registered repository, then rebuild the index.
    ///
    /// Fetches run concurrently unless `no_parallel` is set. The first
    /// failure is returned as soon as it is observed and the remaining
    /// fetches are cancelled; the index is left as it was.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_all(&self) -> Result<()> {
        let total = self.fetchers.len();
        let force = self.options.force_refresh;
        debug!("Fetching {} repositories (force={})", total, force);

        if self.options.no_parallel {
            for (done, fetcher) in self.fetchers.iter().enumerate() {
                fetch_one(fetcher, &self.env, force).await?;
                info!("[{}/{}] {}", done + 1, total, fetcher);
            }
        } else {
            let mut tasks = JoinSet::new();
            for fetcher in &self.fetchers {
                let fetcher = Arc::clone(fetcher);
                let env = self.env.clone();
                tasks.spawn(async move {
                    let result = fetch_one(&fetcher, &env, force).await;
                    (fetcher, result)
                });
            }

            let mut done = 0;
            // Returning early drops `tasks`, which aborts whatever is still running.
            while let Some(joined) = tasks.join_next().await {
                let (fetcher, result) = joined.context("Fetch task panicked")?;
                result?;
                done += 1;
                info!("[{}/{}] {}", done, total, fetcher);
            }
        }

        self.rebuild_index();
        Ok(())
    }

    /// Replace the index with the packages of every fetcher.
    ///
    /// Fetchers are visited in registration order, so on a name collision
    /// the last registered fetcher wins.
    pub(super) fn rebuild_index(&self) {
        let mut index = self.index();
        index.clear();
        for fetcher in &self.fetchers {
            for pkg in fetcher.packages().iter() {
                index.insert(pkg.name.to_string(), Arc::clone(pkg));
            }
        }
        debug!("Index rebuilt with {} packages", index.len());
    }

    /// Overwrite index entries with the packages of one fetcher.
    ///
    /// Entries of packages the fetcher no longer lists are kept.
    pub(super) fn merge_into_index(&self, fetcher: &RepositoryFetcher) {
        let packages = fetcher.packages();
        let mut index = self.index();
        for pkg in packages.iter() {
            index.insert(pkg.name.to_string(), Arc::clone(pkg));
        }
    }
}

async fn fetch_one(fetcher: &RepositoryFetcher, env: &FetchEnvironment, force: bool) -> Result<()> {
    fetcher
        .fetch_with_key(env, fetcher.key(), force)
        .await
        .with_context(|| format!("failed to load {}", fetcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;
    use crate::fetcher::{FetchStatus, MockFetch};
    use crate::package::Package;
    use crate::test_utils::{StalledSource, StaticSource, pkg, wait_until};
    use std::time::Duration;

    fn failing(identity: &'static str) -> Arc<MockFetch> {
        let mut source = MockFetch::new();
        source.expect_identity().return_const(identity.to_string());
        source
            .expect_fetch()
            .returning(|_, _| Err(anyhow::anyhow!("mirror unreachable")));
        Arc::new(source)
    }

    fn hanging(identity: &'static str) -> Arc<MockFetch> {
        let mut source = MockFetch::new();
        source.expect_identity().return_const(identity.to_string());
        source.expect_fetch().returning(|_, _| {
            // Blocks the worker thread, long enough to outlive the test.
            std::thread::sleep(Duration::from_millis(200));
            Ok(vec![])
        });
        Arc::new(source)
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_all_builds_index() {
        let mut db = PackageDatabase::new(DatabaseOptions::default());
        db.add_repository_fetcher("", StaticSource::arc("a", vec![pkg("foo", &[])]));
        db.add_repository_fetcher("", StaticSource::arc("b", vec![pkg("bar", &[])]));

        db.fetch_all().await.unwrap();

        assert_eq!(db.indexed_count(), 2);
        assert!(db.get("foo").is_some());
        assert!(db.get("bar").is_some());
        for fetcher in db.fetchers() {
            assert_eq!(fetcher.status(), FetchStatus::Fresh);
        }
    }

    #[tokio::test]
    async fn test_fetch_all_last_fetcher_wins_on_collision() {
        let mut db = PackageDatabase::new(DatabaseOptions::default());
        db.add_repository_fetcher("", StaticSource::arc("a", vec![pkg("foo", &[])]));
        let second =
            db.add_repository_fetcher("", StaticSource::arc("b", vec![pkg("foo", &[&["bar"]])]));

        db.fetch_all().await.unwrap();

        let indexed = db.get("foo").unwrap();
        assert!(Arc::ptr_eq(&indexed, &second.packages()[0]));
    }

    #[tokio::test]
    async fn test_fetch_all_with_no_fetchers() {
        let db = PackageDatabase::new(DatabaseOptions::default());
        db.fetch_all().await.unwrap();
        assert_eq!(db.indexed_count(), 0);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
    async fn test_fetch_all_returns_first_error() {
        let mut db = PackageDatabase::new(DatabaseOptions::default());
        db.add_repository_fetcher("", hanging("slow"));
        db.add_repository_fetcher("", failing("broken"));

        let err = db.fetch_all().await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("failed to load broken"), "{}", message);
        assert!(message.contains("mirror unreachable"), "{}", message);
        assert_eq!(db.indexed_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_all_failure_settles_cancelled_fetches() {
        let mut db = PackageDatabase::new(DatabaseOptions::default());
        let stalled = db.add_repository_fetcher("", StalledSource::arc("stalled"));
        db.add_repository_fetcher("", failing("broken"));

        assert!(db.fetch_all().await.is_err());

        // The abort lands when the runtime next polls the cancelled task.
        wait_until(|| stalled.status() != FetchStatus::Fetching).await;
        assert_eq!(stalled.status(), FetchStatus::Failed);
        assert_eq!(stalled.package_count(), 0);
        assert!(stalled.last_updated().is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_failure_keeps_previous_index() {
        let mut db = PackageDatabase::new(DatabaseOptions {
            no_parallel: true,
            ..Default::default()
        });
        db.add_repository_fetcher("", StaticSource::arc("a", vec![pkg("foo", &[])]));
        db.fetch_all().await.unwrap();

        db.add_repository_fetcher("", failing("broken"));
        assert!(db.fetch_all().await.is_err());

        assert_eq!(db.indexed_count(), 1);
        assert!(db.get("foo").is_some());
        assert_eq!(db.fetchers()[1].status(), FetchStatus::Failed);
    }

    #[tokio::test]
    async fn test_fetch_all_sequential_stops_at_first_error() {
        let mut untouched = MockFetch::new();
        untouched.expect_identity().return_const("later".to_string());
        untouched.expect_fetch().never();

        let mut db = PackageDatabase::new(DatabaseOptions {
            no_parallel: true,
            ..Default::default()
        });
        db.add_repository_fetcher("", StaticSource::arc("a", vec![pkg("foo", &[])]));
        db.add_repository_fetcher("", failing("broken"));
        db.add_repository_fetcher("", Arc::new(untouched));

        let err = db.fetch_all().await.unwrap_err();
        assert!(format!("{:#}", err).contains("failed to load broken"));
        assert_eq!(db.fetchers()[0].status(), FetchStatus::Fresh);
        assert_eq!(db.fetchers()[2].status(), FetchStatus::Unfetched);
    }

    #[tokio::test]
    async fn test_force_refresh_is_passed_to_sources() {
        let mut source = MockFetch::new();
        source.expect_identity().return_const("src".to_string());
        source
            .expect_fetch()
            .withf(|_, force| *force)
            .times(1)
            .returning(|_, _| Ok(vec![Package::new("foo".into())]));

        let mut db = PackageDatabase::new(DatabaseOptions {
            force_refresh: true,
            ..Default::default()
        });
        db.add_repository_fetcher("", Arc::new(source));
        db.fetch_all().await.unwrap();
        assert_eq!(db.count(), 1);
    }
}
