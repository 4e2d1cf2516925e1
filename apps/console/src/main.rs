//! # MicroBox Console
//!
//! Terminal dashboard for a MicroBox irrigation controller.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Console Startup                                   │
//! │                                                                         │
//! │  1. Logging      tracing-subscriber, RUST_LOG or "info,microbox=debug"  │
//! │  2. Config       $MICROBOX_CONFIG or the platform config dir,           │
//! │                  then MICROBOX_* environment overrides                  │
//! │  3. Registry     one poll, push and command channel                     │
//! │  4. Core         poll + push feeding the TerminalView                   │
//! │  5. Clock        local time/date every second                           │
//! │  6. Loop         stdin commands, reload requests, Ctrl+C                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod input;
mod view;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use microbox_core::ElementUpdater;
use microbox_link::{
    ChannelRegistry, LinkConfig, LocalClock, StateSyncCore, TracingDiagnostics, TracingNotifier,
};

use crate::error::ConsoleResult;
use crate::input::{ConsoleCommand, HELP};
use crate::view::TerminalView;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting MicroBox console");
    run().await?;
    info!("Console shutdown complete");
    Ok(())
}

async fn run() -> ConsoleResult<()> {
    let config_path = std::env::var_os("MICROBOX_CONFIG").map(PathBuf::from);
    let config = LinkConfig::load(config_path)?;
    info!(
        host = %config.device.host,
        feed = %config.feed(),
        poll_interval_ms = config.poll.interval_ms,
        "Configuration loaded"
    );

    let view = Arc::new(TerminalView::new());
    let updater = Arc::new(ElementUpdater::new(view.clone()));
    let registry = ChannelRegistry::new(
        config.clone(),
        Arc::new(TracingDiagnostics),
        Arc::new(TracingNotifier),
    )?;

    let clock = config
        .clock
        .enabled
        .then(|| LocalClock::new(updater.clone(), config.slots.clone()));
    if let Some(clock) = &clock {
        clock.start();
    }

    let mut core = registry.build_core(updater.clone())?;
    core.start(config.poll.interval());

    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                match input::parse(&line) {
                    Ok(Some(ConsoleCommand::Send(request))) => {
                        registry.command_channel().send(request);
                    }
                    Ok(Some(ConsoleCommand::Status)) => print_status(&core, &view).await,
                    Ok(Some(ConsoleCommand::Help)) => println!("{}", HELP),
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                }
            }
            _ = view.reload_requested() => {
                core = rebuild(core, &registry, &updater, &config).await?;
            }
            _ = &mut shutdown => break,
        }
    }

    core.stop().await;
    registry.reset().await;
    if let Some(clock) = &clock {
        clock.stop().await;
    }
    Ok(())
}

/// A reloaded view starts with fresh channels and an empty render cache.
async fn rebuild(
    core: StateSyncCore,
    registry: &ChannelRegistry,
    updater: &Arc<ElementUpdater>,
    config: &LinkConfig,
) -> ConsoleResult<StateSyncCore> {
    core.stop().await;
    registry.reset().await;
    updater.forget_all();

    let core = registry.build_core(updater.clone())?;
    core.start(config.poll.interval());
    info!("Link rebuilt after view reload");
    Ok(core)
}

async fn print_status(core: &StateSyncCore, view: &TerminalView) {
    let status = core.status().await;
    println!(
        "poll: {} (delivered {}, failed {}, superseded {})",
        status.poll,
        status.poll_stats.delivered,
        status.poll_stats.failures,
        status.poll_stats.superseded
    );
    println!(
        "push: {} (opens {}, delivered {}, parse failures {})",
        status.push,
        status.push_stats.opens,
        status.push_stats.delivered,
        status.push_stats.parse_failures
    );
    println!(
        "merged: {} poll / {} push, reloads {}",
        status.merged_from_poll, status.merged_from_push, status.reloads
    );
    for (slot, value) in view.slots() {
        println!("  {:<24} {}", slot, value);
    }
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,microbox=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
