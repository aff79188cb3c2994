use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rcutil_cli::{init_logging, run_tick_loop, TickLoopConfig};
use rcutil_scripting_host::{ConfigLoadError, EventDispatcher, LoggingTransport, RcutilConfig};
use tokio::sync::watch;
use tracing::{info, warn};

/// Drive the rcutil tick loop against the scripts in a config file.
///
/// Callbacks are only logged, not delivered, which makes this useful for
/// checking what a set of scripts would receive tick by tick.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enables debug output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to load (default: platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many ticks
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Override the configured tick rate
    #[arg(long)]
    tps: Option<u32>,

    /// Also write logs to a file in the data directory
    #[arg(long)]
    log_file: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RcutilConfig> {
    let result = match path {
        Some(path) => RcutilConfig::load_from(path),
        None => RcutilConfig::load(),
    };

    match result {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => {
            warn!("No config found, running with defaults and no scripts");
            Ok(RcutilConfig::default())
        }
        Err(e) => Err(e).context("failed to load config"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging("rcutil-sim", cli.debug, cli.log_file)?;

    let config = load_config(cli.config.as_ref())?;

    let dispatcher = Arc::new(EventDispatcher::new(LoggingTransport::new()));
    let scripts = config
        .install_scripts(&*dispatcher)
        .context("failed to register configured scripts")?;
    info!(
        "Registered {} script(s), {} timer(s) pending",
        scripts.len(),
        dispatcher.scheduler().pending_count()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let loop_config = TickLoopConfig {
        tick_rate: cli.tps.unwrap_or(config.tick_rate),
        max_ticks: cli.ticks,
    };
    let completed = run_tick_loop(dispatcher.clone(), loop_config, shutdown_rx).await?;

    info!(
        "Ran {} tick(s); {} script(s) still registered",
        completed,
        dispatcher.registry().script_count()
    );
    Ok(())
}
