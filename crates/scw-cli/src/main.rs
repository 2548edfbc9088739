use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scw_config::{UnusedKeyPolicy, WatcherConfig};
use scw_reconcile::{ExpectedEntry, Reconciler};
use scw_watch::{
    JsonSidecarDecoder, PollingSource, SidecarFileName, SidecarWatcher, WatcherState,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "scw")]
#[command(about = "Sidecar reconciliation watcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a sidecar directory and reconcile it against expected records
    Watch {
        /// Layered config paths in merge order (base -> env -> local...)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// JSON array of {label, record} expectations, matched in order
        #[arg(long)]
        expectations: PathBuf,

        /// Stop after the first sidecar file is processed
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Close the watch after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Fail instead of warn when the config carries keys nothing reads
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Check whether a file name follows the sidecar naming convention
    CheckName { name: String },
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Watch {
            config_paths,
            expectations,
            once,
            timeout_secs,
            strict_config,
        } => {
            let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
            let loaded = scw_config::load_layered_yaml(&path_refs)?;

            let policy = if strict_config {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let unused = scw_config::report_unused_keys(&loaded.config_json, policy)?;
            for ptr in &unused.unused_leaf_pointers {
                warn!(key = %ptr, "config key is not read by the watcher");
            }

            let cfg = WatcherConfig::with_env_overrides(&loaded.config_json)?;
            let entries = read_expectations(&expectations)?;

            println!("config_hash={}", loaded.config_hash);
            run_watch(&cfg, entries, once, timeout_secs)?;
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = scw_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::CheckName { name } => match SidecarFileName::parse(&name) {
            Some(parsed) => {
                println!("sidecar_name={}", parsed);
                println!("timestamp={}", parsed.timestamp().to_rfc3339());
                println!("sequence={}", parsed.sequence());
            }
            None => bail!("not a sidecar file name: {name}"),
        },
    }

    Ok(())
}

fn run_watch(
    cfg: &WatcherConfig,
    entries: Vec<ExpectedEntry>,
    once: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let reconciler = Arc::new(Reconciler::new());
    for e in entries {
        reconciler.add_expected(e.label, e.record);
    }

    // Set before the worker exists so the first file is always the last.
    let state = WatcherState::new();
    if once || cfg.finish_after_first {
        state.finish_after_next();
    }

    let source = PollingSource::new(&cfg.sidecar_dir, cfg.poll_interval())?;
    let mut watcher = SidecarWatcher::start_with_state(
        reconciler,
        state,
        source,
        JsonSidecarDecoder::new(),
    )?;
    println!("session_id={}", watcher.session_id());
    info!(
        dir = %cfg.sidecar_dir.display(),
        expected = watcher.reconciler().expectations().len(),
        "watching"
    );

    if let Some(secs) = timeout_secs {
        let closer = watcher.closer();
        // Detached: the process exits with the main thread if the run ends first.
        std::thread::Builder::new()
            .name("watch-timeout".to_string())
            .spawn(move || {
                std::thread::sleep(Duration::from_secs(secs));
                closer.close();
            })
            .context("spawn timeout thread")?;
    }

    let terminal = watcher.wait_until_finished().err().map(|e| e.to_string());

    println!("{}", watcher.report());
    let summary = watcher.summary();
    let summary_json = serde_json::to_string_pretty(&summary)?;
    println!("{}", summary_json);

    if let Some(path) = &cfg.summary_path {
        write_summary(path, &summary_json)?;
    }

    if let Some(err) = terminal {
        bail!("sidecar watch failed: {err}");
    }
    if !summary.is_healthy() {
        bail!(
            "sidecar reconciliation unhealthy: mismatches={} pending_expectations={}",
            summary.mismatches,
            summary.pending_expectations
        );
    }
    Ok(())
}

fn read_expectations(path: &Path) -> Result<Vec<ExpectedEntry>> {
    let s = fs::read_to_string(path).with_context(|| format!("read expectations {:?}", path))?;
    serde_json::from_str(&s).with_context(|| format!("parse expectations {:?}", path))
}

fn write_summary(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
    }
    fs::write(path, json).with_context(|| format!("write summary {:?}", path))
}

// Logs go to stderr; stdout carries the report.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
