use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::{self, Write};

use crate::{
    database::PackageDatabase,
    fetcher::FetcherStatus,
    package::PackageName,
    runtime::Runtime,
    script::BuildScript,
};

pub mod config;
mod watch;

pub use watch::watch;

use config::{Config, Settings};

/// Open the database described by `settings` and fetch every repository.
#[tracing::instrument(skip(runtime))]
pub async fn load<R: Runtime + Clone + 'static>(runtime: R, settings: &Settings) -> Result<PackageDatabase> {
    let config = Config::new(runtime)?;
    let db = config.open_database(settings)?;
    let fetched = db.fetch_all().await;
    if fetched.is_err() {
        close_after(&db, fetched)?;
    }
    debug!("Loaded {} packages", db.count());
    Ok(db)
}

/// Fetch every repository and report per-repository results.
#[tracing::instrument(skip(runtime))]
pub async fn fetch<R: Runtime + Clone + 'static>(runtime: R, settings: &Settings) -> Result<()> {
    let db = load(runtime, settings).await?;
    for status in db.fetcher_status() {
        println!("{}", status);
    }
    println!("{} packages", db.count());
    db.close()
}

#[tracing::instrument(skip(runtime))]
pub async fn search<R: Runtime + Clone + 'static>(
    runtime: R,
    settings: &Settings,
    query: &str,
    limit: usize,
) -> Result<()> {
    let query: PackageName = query.parse()?;
    let db = load(runtime, settings).await?;
    let result = write_search(&db, &query, limit, &mut io::stdout().lock()).await;
    close_after(&db, result)
}

#[tracing::instrument(skip(runtime))]
pub async fn plan<R: Runtime + Clone + 'static>(
    runtime: R,
    settings: &Settings,
    names: &[String],
) -> Result<()> {
    let names = names
        .iter()
        .map(|name| name.parse())
        .collect::<Result<Vec<PackageName>>>()?;
    let db = load(runtime, settings).await?;
    let result = write_plan(&db, &names, &mut io::stdout().lock()).await;
    close_after(&db, result)
}

/// Stream every name and alias as JSON lines.
#[tracing::instrument(skip(runtime))]
pub async fn names<R: Runtime + Clone + 'static>(runtime: R, settings: &Settings) -> Result<()> {
    let db = load(runtime, settings).await?;
    let result = db.write_names(io::stdout().lock());
    close_after(&db, result)
}

#[tracing::instrument(skip(runtime))]
pub async fn status<R: Runtime + Clone + 'static>(
    runtime: R,
    settings: &Settings,
    json: bool,
) -> Result<()> {
    let db = load(runtime, settings).await?;
    let statuses = db.fetcher_status();
    let result = print_status(&mut io::stdout().lock(), &statuses, json);
    close_after(&db, result)
}

/// Run a registered build script and print its result as JSON.
///
/// Repositories are not fetched.
#[tracing::instrument(skip(runtime))]
pub async fn script<R: Runtime + Clone + 'static>(
    runtime: R,
    settings: &Settings,
    name: &str,
    args: &[String],
) -> Result<()> {
    let config = Config::new(runtime)?;
    let db = config.open_database(settings)?;
    let script = BuildScript::new(name, args.to_vec());
    let result = write_script(&db, &script, &mut io::stdout().lock()).await;
    close_after(&db, result)
}

/// Close `db` whatever `result` is, returning the first error.
fn close_after<T>(db: &PackageDatabase, result: Result<T>) -> Result<T> {
    let closed = db.close();
    if result.is_err()
        && let Err(e) = &closed
    {
        warn!("Failed to close the database: {:#}", e);
    }
    let value = result?;
    closed?;
    Ok(value)
}

async fn write_search<W: Write>(
    db: &PackageDatabase,
    query: &PackageName,
    limit: usize,
    w: &mut W,
) -> Result<()> {
    let results = db.search(query, limit).await?;
    if results.is_empty() {
        writeln!(w, "No packages match {}.", query)?;
    }
    for pkg in results {
        writeln!(w, "{}", pkg.name)?;
    }
    Ok(())
}

async fn write_plan<W: Write>(db: &PackageDatabase, names: &[PackageName], w: &mut W) -> Result<()> {
    let plan = db
        .make_installation_plan(names)
        .await
        .context("Failed to plan installation")?;
    info!("Planned {} packages", plan.len());
    for pkg in plan.packages() {
        writeln!(w, "{}", pkg.name)?;
    }
    Ok(())
}

async fn write_script<W: Write>(db: &PackageDatabase, script: &BuildScript, w: &mut W) -> Result<()> {
    let value = db.get_build_script(script).await?;
    serde_json::to_writer_pretty(&mut *w, &value)?;
    writeln!(w)?;
    Ok(())
}

fn print_status<W: Write>(w: &mut W, statuses: &[FetcherStatus], json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *w, statuses)?;
        writeln!(w)?;
    } else {
        for status in statuses {
            writeln!(w, "{}", status)?;
        }
    }
    Ok(())
}
