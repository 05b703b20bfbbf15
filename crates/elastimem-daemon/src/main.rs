use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elastimem_core::{CgroupV1Memory, ProcFs, ProcMeminfo, ScanStats, VERSION};
use elastimem_daemon::{Config, ElasticDaemon, ScanLoop};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// elastimem - elastic memory limits for containers
///
/// Grows the memory limit of active containers under pressure and shrinks
/// it back when the headroom returns, within the host's free memory.
#[derive(Parser, Debug)]
#[command(name = "elastimem-daemon")]
#[command(version = VERSION)]
#[command(about = "elastimem Daemon - elastic container memory limits", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/elastimem/config.toml")]
    config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scan loop until SIGINT/SIGTERM
    Run,

    /// Run a single scan cycle and report what it did
    Once {
        /// Print the cycle counters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let _guard = init_logging(&config)?;

    info!("elastimem Daemon v{} starting...", VERSION);
    if cli.config.exists() {
        info!("Configuration loaded from: {:?}", cli.config);
    } else {
        warn!("Configuration file not found: {:?}, using defaults", cli.config);
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    match cli.command {
        Some(Commands::Run) => run_daemon(config).await?,
        Some(Commands::Once { json }) => run_once(config, json)?,
        Some(Commands::GenerateConfig { output }) => generate_config(&output)?,
        None => {
            info!("No command specified, running scan loop by default");
            run_daemon(config).await?
        }
    }

    Ok(())
}

/// Run the scan loop on its own thread until a shutdown signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let memory = open_controller(&config)?;
    info!(
        root = %memory.root().display(),
        dir = %config.controller.container_dir.display(),
        "Using memory controller"
    );

    let mut daemon = ElasticDaemon::new(
        config.scan_settings(),
        config.policy(),
        Arc::new(memory),
        Arc::new(ProcFs::new()),
        Arc::new(ProcMeminfo::new()),
    );
    daemon
        .start(&config.controller.mount_tag)
        .context("Failed to start elastic daemon")?;

    wait_for_shutdown().await?;
    info!("Shutdown requested, stopping scan loop...");

    let stats = tokio::task::spawn_blocking(move || daemon.stop())
        .await
        .context("Stop task failed")??;
    log_stats(&stats);

    Ok(())
}

/// Run one cycle in the foreground
fn run_once(config: Config, json: bool) -> Result<()> {
    let memory = open_controller(&config)?;

    let mut scan = ScanLoop::prepare(
        config.scan_settings(),
        config.policy(),
        &config.controller.mount_tag,
        Arc::new(memory),
        Arc::new(ProcFs::new()),
        Arc::new(ProcMeminfo::new()),
    )?;
    scan.run_cycle();

    log_stats(scan.stats());
    if json {
        println!("{}", serde_json::to_string_pretty(scan.stats())?);
    }

    Ok(())
}

fn log_stats(stats: &ScanStats) {
    info!("=== Scan Statistics ===");
    info!("Cycles: {}", stats.cycles);
    info!(
        "Containers seen: {} (active: {})",
        stats.candidates, stats.active
    );
    info!(
        "Created: {}, grown: {}, shrunk: {}, host resets: {}, vetoed: {}",
        stats.created, stats.grown, stats.shrunk, stats.host_resets, stats.vetoed
    );
    info!(
        "Failures: read={}, write={}",
        stats.read_failures, stats.write_failures
    );
    info!(
        "Tracked: {}, reclaimed: {}",
        stats.tracked, stats.reclaimed
    );
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("Failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }

    Ok(())
}

/// Memory controller from config, or the one mounted on this host
fn open_controller(config: &Config) -> Result<CgroupV1Memory> {
    match &config.controller.cgroup_root {
        Some(root) => Ok(CgroupV1Memory::new(root)),
        None => CgroupV1Memory::discover().context("Failed to locate the memory controller"),
    }
}

/// Generate default configuration file
fn generate_config(output: &Path) -> Result<()> {
    info!("Generating default configuration file: {:?}", output);

    Config::default()
        .save_to_file(output)
        .map_err(|e| anyhow::anyhow!("Failed to save configuration file: {}", e))?;

    info!("Configuration file generated successfully");
    Ok(())
}

/// Load configuration from file or use defaults
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load configuration file: {}", e))
    } else {
        Ok(Config::default())
    }
}

/// Initialize logging with stdout and daily-rotated file output
fn init_logging(config: &Config) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.logging.log_dir)?;

    let file_appender =
        tracing_appender::rolling::daily(&config.logging.log_dir, &config.logging.file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .init();

    info!("Logging initialized: {:?}", config.log_path());

    Ok(guard)
}
