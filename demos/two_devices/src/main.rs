//! snapsync demo
//!
//! Two devices with their own settings and database exchange snapshots
//! through one remote.
//!
//! # Commands
//!
//! - `simulate` - Walk both devices through a seed, receive and refresh cycle
//! - `run` - Start both engines and let local writes propagate for a while

use clap::{Parser, Subcommand};
use serde_json::json;
use snapsync_engine::{
    EventKind, MemoryDatabase, SyncConfig, SyncEvent, SyncLibs, TickOutcome, MIN_SYNC_INTERVAL,
};
use snapsync_remote::{DirectoryConnector, MemoryConnector, MemoryRemote, RemoteConfig, RemoteConnector};
use snapsync_storage::{FileStore, KeyValueStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Simulate two devices syncing through a shared folder.
#[derive(Parser)]
#[command(name = "two-devices")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shared folder used as the remote; in-memory when omitted
    #[arg(global = true, short, long)]
    share: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through one seed, receive and refresh cycle
    Simulate {
        /// Directory receiving a JSON export of each device at the end
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Run both engines with auto-sync on
    Run {
        /// How long to run, in seconds
        #[arg(short, long, default_value = "30")]
        seconds: u64,
    },
}

struct Device {
    name: &'static str,
    libs: SyncLibs,
    db: Arc<MemoryDatabase>,
}

fn open_device(
    name: &'static str,
    home: &Path,
    connector: Arc<dyn RemoteConnector>,
    url: &str,
) -> Result<Device, Box<dyn std::error::Error>> {
    let store: Arc<dyn KeyValueStore> =
        Arc::new(FileStore::open(&home.join(format!("{name}-settings.json")))?);
    let db = Arc::new(MemoryDatabase::new("notes", ["notes", "tags"]));
    let config = SyncConfig::new("notes-app")
        .with_root_path("/notes-app")
        .with_sync_interval(MIN_SYNC_INTERVAL)
        .with_throttle_window(Duration::from_secs(2));
    let libs = SyncLibs::new(config, store, db.clone(), connector);
    libs.remote()
        .save_config(&RemoteConfig::new(url, "demo", "demo"))?;

    tracing::info!(device = name, id = %libs.device_id()?, "device ready");
    Ok(Device { name, libs, db })
}

fn describe(device: &Device, outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Seeded { path } => println!("[{}] seeded remote with {path}", device.name),
        TickOutcome::Refreshed { path } => println!("[{}] refreshed {path}", device.name),
        TickOutcome::Received { from_device, path } => {
            println!("[{}] imported snapshot of {from_device}, now {path}", device.name)
        }
        TickOutcome::Skipped { path } => println!("[{}] skipped {path}", device.name),
    }
}

async fn simulate(a: &Device, b: &Device, export: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    a.db.put("notes", "welcome", json!({"title": "Hello from A"}))?;
    b.db.put("notes", "draft", json!({"title": "B's unsynced draft"}))?;

    for device in [a, b, a] {
        let outcome = device.libs.resolver().run_tick().await?;
        describe(device, &outcome);
    }

    // A holds the newest snapshot, so its next write wins.
    a.db.put("tags", "demo", json!(["sync", "snapshot"]))?;
    for device in [a, b] {
        let outcome = device.libs.resolver().run_tick().await?;
        describe(device, &outcome);
    }

    for device in [a, b] {
        println!("[{}] rows: {}", device.name, device.db.row_count());
        if let Some(dir) = export {
            let path = device.libs.export_to_file(dir).await?;
            println!("[{}] exported to {}", device.name, path.display());
        }
    }
    Ok(())
}

async fn run(a: &Device, b: &Device, seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    for device in [a, b] {
        device.libs.set_auto_sync(true)?;
        let engine = device.libs.sync();
        let name = device.name;
        engine.on(
            EventKind::Received,
            Arc::new(move |event: &SyncEvent| println!("[{name}] {event:?}")),
        );
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut n = 0u32;
    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        let writer = if n % 2 == 0 { a } else { b };
        writer.db.put("notes", &format!("note-{n}"), json!({ "by": writer.name }))?;
        n += 1;
    }

    for device in [a, b] {
        let engine = device.libs.sync();
        println!("[{}] {:?} {:?}", device.name, engine.status(), engine.stats());
        engine.shutdown();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let homes = tempfile::tempdir()?;
    let (connector, url): (Arc<dyn RemoteConnector>, String) = match &cli.share {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            (Arc::new(DirectoryConnector::new()), format!("file://{}", dir.display()))
        }
        None => (
            Arc::new(MemoryConnector::new(MemoryRemote::new())),
            "memory://demo".to_string(),
        ),
    };

    let a = open_device("A", homes.path(), Arc::clone(&connector), &url)?;
    let b = open_device("B", homes.path(), connector, &url)?;

    match cli.command {
        Commands::Simulate { export } => simulate(&a, &b, export.as_deref()).await?,
        Commands::Run { seconds } => run(&a, &b, seconds).await?,
    }
    Ok(())
}
