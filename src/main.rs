/// Version injected at compile time via CLOUDSNAP_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDSNAP_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cloudsnap::aws::{detect, regions, AwsCli};
use cloudsnap::cache::{tab_cache_keys, CacheStore, Tab};
use cloudsnap::config::Config;
use cloudsnap::sync::{Category, SyncResult, SyncTracker, Syncer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Local snapshot of an AWS account's resources
#[derive(Parser, Debug)]
#[command(name = "cloudsnap", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Cache database to use instead of the configured one
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull resources from AWS into the cache
    Sync {
        /// AWS region to sync
        #[arg(short, long)]
        region: Option<String>,

        /// Category to sync (network, storage, warehouse, database, compute,
        /// streaming, ai, identity) or "all"
        #[arg(short, long, default_value = "all")]
        category: String,
    },
    /// Show or toggle the regions known to the cache
    Regions {
        #[command(subcommand)]
        action: Option<RegionAction>,
    },
    /// Show CLI detection and the last full sync
    Status,
    /// When the data behind a view was last refreshed
    SyncedAt {
        /// View: net, compute, database, s3, streaming, ai, iam
        #[arg(short, long)]
        tab: String,

        #[arg(short, long)]
        region: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RegionAction {
    List,
    Enable { name: String },
    Disable { name: String },
    /// Discover regions from AWS if the table is empty
    Seed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Logging disabled: cannot open {:?}: {}", log_path, e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_level.into())
                .from_env_lossy(),
        )
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloudsnap {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloudsnap").join("cloudsnap.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloudsnap").join("cloudsnap.log");
    }
    PathBuf::from("cloudsnap.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let config = Config::load();
    let cli = AwsCli::from_config(&config);
    let store = Arc::new(open_store(&config, args.db.as_deref())?);

    match args.command {
        Command::Sync { region, category } => {
            let region = resolve_region(&config, &cli, region).await;
            let syncer = Syncer::new(Arc::new(cli), store).with_concurrency(config.enrich_concurrency());
            run_sync(&syncer, &region, &category).await
        },
        Command::Regions { action } => {
            let syncer = Syncer::new(Arc::new(cli), store);
            run_regions(&syncer, action.unwrap_or(RegionAction::List)).await
        },
        Command::Status => run_status(&cli, &store).await,
        Command::SyncedAt { tab, region } => {
            let tab: Tab = tab.parse().map_err(anyhow::Error::msg)?;
            let region = resolve_region(&config, &cli, region).await;
            let keys = tab_cache_keys(tab, &region);
            match store.most_recent_sync_time(&keys)? {
                Some(at) => println!("{}", at.to_rfc3339()),
                None => println!("never"),
            }
            Ok(())
        },
    }
}

fn open_store(config: &Config, override_path: Option<&std::path::Path>) -> Result<CacheStore> {
    let path = override_path
        .map(PathBuf::from)
        .or_else(|| config.db_path())
        .context("No location for the cache database; pass --db")?;
    tracing::info!("Using cache at {:?}", path);
    CacheStore::open(&path).with_context(|| format!("Failed to open cache at {}", path.display()))
}

/// flag > config > environment > aws CLI default > fallback
async fn resolve_region(config: &Config, cli: &AwsCli, flag: Option<String>) -> String {
    if let Some(region) = flag.filter(|r| !r.is_empty()) {
        return region;
    }
    if config.region.as_deref().is_some_and(|r| !r.is_empty()) {
        return config.effective_region(None);
    }
    let detected = detect::detect_cached(cli).await;
    config.effective_region(detected.region.as_deref())
}

async fn run_sync(syncer: &Syncer, region: &str, category: &str) -> Result<()> {
    let categories: Vec<Category> = if category.eq_ignore_ascii_case("all") {
        Category::ALL.to_vec()
    } else {
        vec![category.parse().map_err(anyhow::Error::msg)?]
    };

    let tracker = SyncTracker::new();
    let handle = tracker.start(category, region);
    let on_step = |label: &str| {
        tracker.advance(&handle, label);
    };

    println!("Syncing {} ...", region);
    let started = Instant::now();
    let mut all_results = Vec::new();

    for category in &categories {
        println!("\n{}", category.title());
        let results = match syncer.sync_category(*category, region, Some(&on_step)).await {
            Ok(results) => results,
            Err(e) => {
                tracker.fail(&handle, &format!("{:#}", e));
                return Err(e);
            },
        };
        print_results(&results);
        all_results.extend(results);
    }

    if categories.len() == Category::ALL.len() {
        syncer.record_last_sync(&all_results)?;
    }
    tracker.finish(&handle);

    let failed = all_results.iter().filter(|r| !r.is_ok()).count();
    let total: usize = all_results.iter().map(|r| r.count).sum();
    println!(
        "\nDone in {:.1}s: {} resources, {} of {} calls failed",
        started.elapsed().as_secs_f64(),
        total,
        failed,
        all_results.len()
    );
    Ok(())
}

fn print_results(results: &[SyncResult]) {
    for result in results {
        match &result.error {
            Some(err) => println!("  {:<22} error: {}", result.service, err),
            None => println!("  {:<22} {}", result.service, result.count),
        }
    }
}

async fn run_regions(syncer: &Syncer, action: RegionAction) -> Result<()> {
    let store = syncer.store();
    match action {
        RegionAction::List => {
            let list = store.list_regions()?;
            if list.is_empty() {
                println!("No regions yet; run `cloudsnap regions seed`");
            }
            for region in list {
                let mark = if region.enabled { "x" } else { " " };
                println!("[{}] {:<16} {}", mark, region.name, regions::display_name(&region.name));
            }
        },
        RegionAction::Enable { name } => {
            if !store.set_region_enabled(&name, true)? {
                bail!("Unknown region '{}'", name);
            }
            println!("Enabled {}", name);
        },
        RegionAction::Disable { name } => {
            if !store.set_region_enabled(&name, false)? {
                bail!("Unknown region '{}'", name);
            }
            println!("Disabled {}", name);
        },
        RegionAction::Seed => {
            let list = syncer.ensure_regions_seeded().await?;
            println!("{} regions known", list.len());
        },
    }
    Ok(())
}

async fn run_status(cli: &AwsCli, store: &CacheStore) -> Result<()> {
    let status = detect::detect_cached(cli).await;
    if status.installed {
        println!("aws CLI:  {}", status.version.as_deref().unwrap_or("installed"));
        println!("Account:  {}", status.account_id.as_deref().unwrap_or("-"));
        println!("Region:   {}", status.region.as_deref().unwrap_or("-"));
        println!("Profile:  {}", status.profile.as_deref().unwrap_or("default"));
    } else {
        println!("aws CLI:  not found ({})", cli.program());
    }

    match store.read_last_sync()? {
        Some(last) => {
            let ok = last.services.values().filter(|ok| **ok).count();
            println!("Last sync: {} ({} services)", last.timestamp, ok);
        },
        None => println!("Last sync: never"),
    }
    println!("Enabled regions: {}", store.list_enabled_regions()?.join(", "));
    Ok(())
}
