//! Run the governor or talk to the bridge from the command line.
//!
//! # Examples
//!
//! ```sh
//! # Run the governor with defaults (512 MB limit, 1 s sampling)
//! ballast run
//!
//! # Tighter limit, faster sampling
//! ballast run --limit-mb 256 --period-ms 500
//!
//! # Is a bridge listening?
//! ballast probe
//!
//! # Sync one file / a whole directory to the bridge
//! ballast sync-file src/main.rs
//! ballast sync-project ./demo --yes
//!
//! # List palette commands matching a filter
//! ballast commands sync
//! ```

use std::io::{self, BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ballast::bridge::{self, BridgeClient, DEFAULT_BRIDGE_URL};
use ballast::commands::CommandCatalog;
use ballast::editor::InMemoryRuntime;
use ballast::govern::{
    ChangeDispatcher, Governor, GovernorConfig, GovernorCore, LoggingHandler, Stats,
};
use ballast::sched::IdleStrategy;
use ballast::tree::locator::InputTargetLocator;
use ballast::tree::{DocNode, DocTree, MutationBatch, NodeKind};

/// Bounded-resource governor for a live document tree.
#[derive(Parser)]
#[command(name = "ballast")]
struct Cli {
    /// Bridge endpoint
    #[arg(long, default_value = DEFAULT_BRIDGE_URL, global = true)]
    bridge_url: String,

    /// Origin reported to the bridge in deploy payloads
    #[arg(long, default_value = "ballast-cli", global = true)]
    origin: String,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Run the governor until interrupted
    Run {
        /// Memory limit in MB (snapped to 256 MB steps)
        #[arg(long, default_value_t = 512)]
        limit_mb: u64,

        /// Sampling period in milliseconds
        #[arg(long, default_value_t = 1000)]
        period_ms: u64,
    },
    /// Check whether a bridge is listening
    Probe,
    /// Sync one file to the bridge
    SyncFile {
        /// File to sync
        path: PathBuf,
    },
    /// Sync every file under a directory to the bridge
    SyncProject {
        /// Project root
        dir: PathBuf,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// List palette commands
    Commands {
        /// Case-insensitive substring filter
        filter: Option<String>,
    },
}

// ── Run ────────────────────────────────────────────────────────────

async fn run_governor(cli: &Cli, limit_mb: u64, period_ms: u64) -> Result<(), String> {
    let tree = Arc::new(Mutex::new(seed_tree()));
    let stats = Arc::new(Mutex::new(Stats::default()));
    let dispatcher = ChangeDispatcher::new(
        Arc::clone(&tree),
        Arc::clone(&stats),
        Box::new(IdleStrategy::new()),
        Box::new(InputTargetLocator),
    );
    let core = GovernorCore::new(
        tree,
        stats,
        dispatcher,
        GovernorConfig {
            memory_limit_mb: limit_mb,
            sample_period: Duration::from_millis(period_ms),
        },
    )
    .with_runtime(Arc::new(InMemoryRuntime::new()))
    .with_handler(Box::new(LoggingHandler));

    let (governor, handle) = Governor::new(core);
    let actor = tokio::spawn(governor.run());

    let client = BridgeClient::new(&cli.bridge_url, &cli.origin);
    handle.set_bridge_online(client.probe().await).await;
    handle.start().await;

    // Stand-in mutation source: a real host would notify on every change.
    let pulse = handle.clone();
    let generator = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        let mut seq = 0u64;
        loop {
            interval.tick().await;
            seq += 1;
            pulse.notify(MutationBatch { seq }).await;
        }
    });

    info!("running; ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("cannot listen for ctrl-c: {e}"))?;

    generator.abort();
    handle.halt().await;
    handle.shutdown().await;
    actor.await.map_err(|e| format!("governor task failed: {e}"))?;
    Ok(())
}

/// A small tree so a bare `run` has something to govern.
fn seed_tree() -> DocTree {
    let mut tree = DocTree::new();
    tree.insert(tree.root(), DocNode::new(NodeKind::ScrollContainer));
    tree.insert(tree.root(), DocNode::new(NodeKind::InputTarget));
    tree
}

// ── Sync ───────────────────────────────────────────────────────────

async fn sync_file(cli: &Cli, path: &Path) -> Result<(), String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let runtime = InMemoryRuntime::new();
    let id = runtime.open(
        path.to_string_lossy(),
        content,
        language_for(path),
        true,
    );
    runtime.focus(id);

    let client = BridgeClient::new(&cli.bridge_url, &cli.origin);
    let deployed = client.sync_file(&runtime).await.map_err(|e| e.to_string())?;
    println!("synced {deployed}");
    Ok(())
}

async fn sync_project(cli: &Cli, dir: &Path, yes: bool) -> Result<(), String> {
    let mut paths = Vec::new();
    collect_files(dir, &mut paths)?;

    let runtime = InMemoryRuntime::new();
    for path in &paths {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let relative = path.strip_prefix(dir).unwrap_or(path);
                runtime.open(relative.to_string_lossy(), content, language_for(path), false);
            }
            Err(e) => warn!("skipping {}: {e}", path.display()),
        }
    }

    let client = BridgeClient::new(&cli.bridge_url, &cli.origin);
    let mut rand = bridge::clock_rand;
    let report = client
        .sync_project(&runtime, &mut rand, |n| yes || confirm_on_stdin(n))
        .await
        .map_err(|e| e.to_string())?;
    let mut line = format!("synced {} file(s)", report.files);
    if let Some(port) = report.port {
        line.push_str(&format!(", port {port}"));
    }
    if let Some(status) = &report.status {
        line.push_str(&format!(", status {status}"));
    }
    println!("{line}");
    Ok(())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("cannot read {}: {e}", dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| format!("cannot read {}: {e}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn language_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => Some("javascript"),
        Some("ts") => Some("typescript"),
        Some("py") => Some("python"),
        _ => None,
    }
}

fn confirm_on_stdin(count: usize) -> bool {
    print!("sync {count} file(s) to the bridge? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

// ── Entry ──────────────────────────────────────────────────────────

async fn dispatch(cli: &Cli) -> Result<(), String> {
    match &cli.command {
        Action::Run { limit_mb, period_ms } => run_governor(cli, *limit_mb, *period_ms).await,
        Action::Probe => {
            let client = BridgeClient::new(&cli.bridge_url, &cli.origin);
            if client.probe().await {
                println!("bridge online at {}", cli.bridge_url);
                Ok(())
            } else {
                Err(format!("no bridge at {}", cli.bridge_url))
            }
        }
        Action::SyncFile { path } => sync_file(cli, path).await,
        Action::SyncProject { dir, yes } => sync_project(cli, dir, *yes).await,
        Action::Commands { filter } => {
            let catalog = CommandCatalog::new(&[]);
            for command in catalog.filter(filter.as_deref().unwrap_or("")) {
                println!("{command}");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
