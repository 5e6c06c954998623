//! mapwatch - map synchronization for a mail-filtering daemon.
//!
//! The anti-spam decision engine depends on locally resident reference data:
//! IP blocklists and host lists that track slowly changing external sources.
//! This crate keeps those maps in sync without ever blocking the filtering
//! hot path and without exposing a half-built structure to a concurrent
//! lookup.
//!
//! # How it works
//!
//! - A **map** is configured from a locator (`file:///path` or
//!   `http://host[:port]/path`) plus a kind: host list or IP/CIDR list.
//! - Every map is loaded synchronously once at startup, then refreshed on a
//!   jittered periodic schedule by a single-threaded reactor; HTTP refreshes
//!   use non-blocking sockets and a restartable response parser, including
//!   chunked transfer decoding.
//! - Each refresh parses the source from scratch into a fresh structure and
//!   publishes it with one atomic swap. Readers hold a [`MapHandle`] and see
//!   either the old generation or the new one, never a mixture; superseded
//!   generations are freed by reference count once the last reader drops
//!   them.
//! - Failures anywhere in a cycle (connect refused, timeout, bad status,
//!   truncated body) abandon that cycle only; the previously published data
//!   stays authoritative until the next tick succeeds.
//!
//! # Quick start
//!
//! ```no_run
//! use mapwatch::{MapKind, MapRegistry, MapWatcher};
//!
//! # fn main() -> mapwatch::Result<()> {
//! let mut registry = MapRegistry::new();
//! let blocklist = registry.add_map("http://lists.example.com/ips.txt", MapKind::IpList)?;
//! let friends = registry.add_map("file:///etc/mail/friends.txt", MapKind::HostList)?;
//!
//! // Blocking first load, so filtering never starts with empty data
//! registry.load_all();
//!
//! // Hand the handles to the filtering rules, run the watcher elsewhere
//! assert!(!friends.contains_host("nobody.example.org") || true);
//! let mut watcher = MapWatcher::new(registry)?;
//! std::thread::spawn(move || watcher.run());
//!
//! let _ = blocklist.contains_ip("192.0.2.1".parse().unwrap());
//! # Ok(())
//! # }
//! ```

mod data;
mod error;
mod hostset;
mod locator;
mod radix;
mod scanner;
mod session;
mod watch;

pub mod fetch;
pub mod http;

// Re-export core types
pub use data::{MapData, MapHandle, MapKind};
pub use error::{Error, Result};
pub use hostset::HostSet;
pub use locator::{HttpLocator, Locator};
pub use radix::{Insert, RadixTrie};
pub use scanner::ListScanner;
pub use session::FetchSession;
pub use watch::{MapRegistry, MapWatcher, CONNECT_TIMEOUT, DEFAULT_REFRESH, READ_TIMEOUT};
