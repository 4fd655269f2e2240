//! Watch a key (or one value under it) and print every change.
//!
//! ```text
//! cargo run --example watch_key -- 'HKCU\Software\Vendor\App' --recursive
//! cargo run --example watch_key -- 'HKCU\Control Panel\Desktop' --value WallPaper
//! RUST_LOG=regwatch=debug cargo run --example watch_key -- 'HKLM\SOFTWARE\Vendor'
//! ```
//!
//! Off Windows the example runs against an empty in-memory store, so it
//! always creates the key.

use std::time::Duration;

use clap::Parser;
use regwatch::miette::{self, IntoDiagnostic};
use regwatch::{MonitorConfig, Registry, WatchOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "watch_key", about = "Print changes to a registry key")]
struct Args {
    /// Key to watch, e.g. HKCU\Software\Vendor
    path: String,

    /// Also report changes in subkeys
    #[arg(short, long)]
    recursive: bool,

    /// Watch a single value instead of the whole key
    #[arg(short, long)]
    value: Option<String>,

    /// Create the key if it does not exist
    #[arg(long)]
    create: bool,

    /// Dispatch tick in milliseconds
    #[arg(long, env = "REGWATCH_POLL_INTERVAL_MS", default_value_t = 100)]
    interval_ms: u64,

    /// Stop after this many seconds (0 runs until interrupted)
    #[arg(long, default_value_t = 0)]
    seconds: u64,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = MonitorConfig::builder()
        .poll_interval(Duration::from_millis(args.interval_ms))
        .build()?;
    let registry = open_registry(config);
    let create = args.create || cfg!(not(windows));

    let mut token = match &args.value {
        Some(name) => registry.monitor_value(
            &args.path,
            name,
            None,
            create,
            |key, current, previous| match previous {
                Some(previous) => println!("{}: {previous} -> {current}", key.path()),
                None => println!("{}: now {current}", key.path()),
            },
        )?,
        None => registry.monitor_key(
            &args.path,
            WatchOptions::new()
                .recursive(args.recursive)
                .create_if_missing(create),
            |key| {
                let valid = if key.is_valid() { "" } else { " (key gone)" };
                println!("{} changed{valid}", key.path());
            },
        )?,
    };

    println!("watching {} (ctrl-c to stop)", token.path());

    if args.seconds == 0 {
        loop {
            registry.run_for(Duration::from_secs(3600));
            if registry.active_monitors() == 0 {
                break;
            }
        }
    } else {
        registry.run_for(Duration::from_secs(args.seconds));
    }

    token.stop();
    registry.shutdown();

    let leaked = regwatch::leak::report();
    if leaked > 0 {
        return Err(std::io::Error::other(format!("{leaked} native resources still open")))
            .into_diagnostic();
    }
    Ok(())
}

#[cfg(windows)]
fn open_registry(config: MonitorConfig) -> Registry {
    Registry::new(regwatch::WindowsBackend::new(), config)
}

#[cfg(not(windows))]
fn open_registry(config: MonitorConfig) -> Registry {
    tracing::warn!("not on Windows; watching an empty in-memory store");
    Registry::new(regwatch::MemoryBackend::new(), config)
}
