use anyhow::Result;
use clap::Parser;
use pkgdb::commands::{self, config::Settings};
use pkgdb::database::DatabaseOptions;
use std::path::PathBuf;
use std::time::Duration;

/// pkgdb - package metadata database
///
/// Fetches package indexes from the repositories listed in a manifest,
/// searches them and computes installation plans.
///
/// If the PKGDB_TOKEN environment variable is set, it is sent as a bearer
/// token with every HTTP request.
///
/// Examples:
///   pkgdb search alpine/curl
///   pkgdb plan curl jq
#[derive(Parser, Debug)]
#[command(author, version = env!("PKGDB_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository manifest (also via PKGDB_MANIFEST)
    #[arg(
        long,
        short = 'm',
        env = "PKGDB_MANIFEST",
        value_name = "PATH",
        default_value = "pkgdb.json",
        global = true
    )]
    manifest: PathBuf,

    /// Cache directory (defaults to the platform cache dir; also via PKGDB_CACHE_DIR)
    #[arg(long, env = "PKGDB_CACHE_DIR", value_name = "PATH", global = true)]
    cache_dir: Option<PathBuf>,

    /// How long a cached index stays fresh, in seconds
    #[arg(long, value_name = "SECS", global = true)]
    cache_ttl: Option<u64>,

    /// Ignore fresh cache entries
    #[arg(long, global = true)]
    force_refresh: bool,

    /// Fetch repositories one at a time
    #[arg(long, global = true)]
    no_parallel: bool,

    /// Accept repositories read from the local filesystem
    #[arg(long, global = true)]
    allow_local: bool,

    /// Log progress to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Fetch every repository and report their status
    Fetch,

    /// Search for packages
    Search(SearchArgs),

    /// Print the installation order for packages and their dependencies
    Plan(PlanArgs),

    /// Print every package name and alias as JSON lines
    Names,

    /// Print per-repository status
    Status(StatusArgs),

    /// Keep repositories refreshed in the background until Ctrl-C
    Watch(WatchArgs),

    /// Run a build script listed in the manifest and print its JSON result
    Script(ScriptArgs),
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    /// Name in the form [distribution/]name[@version][:architecture]
    #[arg(value_name = "QUERY")]
    query: String,

    /// Maximum number of results (0 for unlimited)
    #[arg(long, short = 'n', default_value_t = 0)]
    limit: usize,
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Packages to install
    #[arg(value_name = "NAME", required = true)]
    names: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct StatusArgs {
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args, Debug)]
struct WatchArgs {
    /// Maximum number of concurrent fetches
    #[arg(long, short = 'p', default_value_t = 4)]
    parallel: usize,

    /// Seconds between refreshes of each repository
    #[arg(long, short = 'i', value_name = "SECS", default_value_t = 3600)]
    interval: u64,
}

#[derive(clap::Args, Debug)]
struct ScriptArgs {
    /// Script name as listed in the manifest
    #[arg(value_name = "NAME")]
    name: String,

    /// Arguments passed to the script
    #[arg(value_name = "ARG", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            manifest: self.manifest.clone(),
            cache_dir: self.cache_dir.clone(),
            cache_ttl: self.cache_ttl.map(Duration::from_secs),
            options: DatabaseOptions {
                force_refresh: self.force_refresh,
                no_parallel: self.no_parallel,
                allow_local: self.allow_local,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = pkgdb::runtime::RealRuntime;
    let settings = cli.settings();

    match cli.command {
        Commands::Fetch => commands::fetch(runtime, &settings).await?,
        Commands::Search(args) => commands::search(runtime, &settings, &args.query, args.limit).await?,
        Commands::Plan(args) => commands::plan(runtime, &settings, &args.names).await?,
        Commands::Names => commands::names(runtime, &settings).await?,
        Commands::Status(args) => commands::status(runtime, &settings, args.json).await?,
        Commands::Watch(args) => {
            commands::watch(
                runtime,
                &settings,
                args.parallel,
                Duration::from_secs(args.interval),
            )
            .await?
        }
        Commands::Script(args) => commands::script(runtime, &settings, &args.name, &args.args).await?,
    }
    Ok(())
}
