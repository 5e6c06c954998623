//! Published map data and the reader-side handle.
//!
//! Each map publishes generations of parsed data through an
//! `ArcSwapOption` slot. A refresh cycle builds the next generation privately
//! and installs it with a single atomic store; readers that loaded the
//! previous generation keep their `Arc` until they drop it, so a generation
//! is reclaimed exactly once and never while still referenced.

use std::net::Ipv4Addr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::hostset::HostSet;
use crate::radix::RadixTrie;

/// What a map's source parses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    /// One host name per token, kept in a case-insensitive set
    HostList,
    /// CIDR entries (`ip[/mask]`, several per line allowed), kept in a trie
    IpList,
}

/// One committed generation of a map.
pub enum MapData {
    Hosts(HostSet),
    Ips(RadixTrie),
}

impl MapData {
    /// Empty structure for a generation under construction.
    pub(crate) fn empty(kind: MapKind) -> Self {
        match kind {
            MapKind::HostList => MapData::Hosts(HostSet::new()),
            MapKind::IpList => MapData::Ips(RadixTrie::new()),
        }
    }

    /// Feed one scanned token into the structure.
    pub(crate) fn insert_token(&mut self, token: &str) {
        match self {
            MapData::Hosts(set) => set.insert(token),
            MapData::Ips(trie) => trie.insert_token(token),
        }
    }

    /// Number of entries in this generation.
    pub fn len(&self) -> usize {
        match self {
            MapData::Hosts(set) => set.len(),
            MapData::Ips(trie) => trie.len(),
        }
    }

    /// Whether this generation holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Case-insensitive host membership. Always false for IP maps.
    pub fn contains_host(&self, host: &str) -> bool {
        match self {
            MapData::Hosts(set) => set.contains(host),
            MapData::Ips(_) => false,
        }
    }

    /// Whether any stored CIDR covers `ip`. Always false for host maps.
    pub fn contains_ip(&self, ip: Ipv4Addr) -> bool {
        match self {
            MapData::Hosts(_) => false,
            MapData::Ips(trie) => trie.contains(ip),
        }
    }
}

/// Reader-side handle onto a map's published data.
///
/// Cloneable and safe to query from any thread while refreshes run; a lookup
/// sees either the generation published before it started or the one after,
/// never a partially built structure.
#[derive(Clone)]
pub struct MapHandle {
    slot: Arc<ArcSwapOption<MapData>>,
}

impl MapHandle {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(ArcSwapOption::const_empty()),
        }
    }

    /// The current generation, or `None` before the first successful fetch.
    pub fn load(&self) -> Option<Arc<MapData>> {
        self.slot.load_full()
    }

    /// Publish a new generation. Called once per successful fetch cycle.
    pub(crate) fn publish(&self, data: MapData) {
        self.slot.store(Some(Arc::new(data)));
    }

    /// Convenience host lookup against the current generation.
    pub fn contains_host(&self, host: &str) -> bool {
        self.load().is_some_and(|d| d.contains_host(host))
    }

    /// Convenience IP lookup against the current generation.
    pub fn contains_ip(&self, ip: Ipv4Addr) -> bool {
        self.load().is_some_and(|d| d.contains_ip(ip))
    }
}
