//! slatbar binary: wire the pipeline together and run it.
//!
//! Startup order: logging, config, delivery channel, signal handling,
//! one worker thread per configured widget, then the render consumer
//! on the main thread. Shutdown is the reverse: a signal trips the
//! shared token, the consumer loop returns, and every worker is joined
//! within its suspension point's grace period.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use slatbar::delivery::{DEFAULT_CAPACITY, delivery_channel};
use slatbar::render::{StatusLine, run_consumer};
use slatbar::widgets::spawn_widget;
use slatbar::worker::ShutdownToken;
use slatbar_core::BarConfig;

#[derive(Debug, Parser)]
#[command(name = "slatbar", about = "Status bar host for widget workers")]
struct Args {
    /// Path to the bar configuration file.
    #[arg(short, long, default_value = "slatbar.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match BarConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{}: {}", args.config.display(), err);
            return ExitCode::FAILURE;
        }
    };
    if config.widgets.is_empty() {
        warn!("no widgets configured, the bar will stay empty");
    }

    let shutdown = ShutdownToken::new();
    let (sender, receiver) = delivery_channel(DEFAULT_CAPACITY);

    register_signals(&shutdown);

    let handles: Vec<_> = config
        .widgets
        .iter()
        .filter_map(|entry| spawn_widget(entry, &sender, &shutdown))
        .collect();
    info!("{} widget worker(s) running", handles.len());

    // The consumer owns the only receiver; dropping our sender clone
    // means the channel closes once every worker is gone.
    drop(sender);

    let mut surface = StatusLine::new();
    run_consumer(receiver, &mut surface, &shutdown);

    shutdown.trigger();
    for handle in handles {
        handle.join();
    }
    info!("all workers joined, exiting");

    ExitCode::SUCCESS
}

/// Trip the shutdown token on SIGINT or SIGTERM.
fn register_signals(shutdown: &ShutdownToken) {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            warn!("could not register signal handlers: {}", err);
            return;
        }
    };

    let shutdown = shutdown.clone();
    let spawned = thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!("received signal {}, shutting down", signal);
                shutdown.trigger();
            }
        });
    if let Err(err) = spawned {
        warn!("could not start signal thread: {}", err);
    }
}
