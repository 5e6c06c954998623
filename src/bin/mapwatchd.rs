//! Standalone map watcher daemon.
//!
//! Keeps the configured maps synchronized and logs every refresh; useful for
//! exercising list sources before wiring them into the filtering daemon.

use std::process;
use std::time::Duration;

use clap::Parser;

use mapwatch::{MapKind, MapRegistry, MapWatcher};

#[derive(Parser)]
#[command(name = "mapwatchd")]
#[command(about = "Watch host-list and IP-list map sources and keep them synchronized")]
struct Args {
    /// Host-list sources (file:// or http:// locators)
    #[arg(long = "hosts", value_name = "LOCATOR")]
    hosts: Vec<String>,

    /// IP/CIDR-list sources (file:// or http:// locators)
    #[arg(long = "ips", value_name = "LOCATOR")]
    ips: Vec<String>,

    /// Base refresh interval in seconds (jitter is added per tick)
    #[arg(long, default_value_t = 10)]
    interval: u64,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.hosts.is_empty() && args.ips.is_empty() {
        eprintln!("no maps configured, pass --hosts and/or --ips");
        process::exit(2);
    }

    let interval = Duration::from_secs(args.interval);
    let mut registry = MapRegistry::new();

    let configured = [
        (MapKind::HostList, &args.hosts),
        (MapKind::IpList, &args.ips),
    ];
    for (kind, locators) in configured {
        for locator in locators {
            match registry.add_map_with_interval(locator, kind, interval) {
                Ok(_) => log::info!("watching {}", locator),
                Err(e) => log::error!("skipping map {}: {}", locator, e),
            }
        }
    }

    if registry.is_empty() {
        eprintln!("no usable maps");
        process::exit(1);
    }

    registry.load_all();

    let mut watcher = match MapWatcher::new(registry) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("cannot start watcher: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = watcher.run() {
        log::error!("watcher stopped: {}", e);
        process::exit(1);
    }
}
