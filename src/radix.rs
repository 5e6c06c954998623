//! Compressed binary trie over IPv4 CIDR prefixes.
//!
//! One generation of an IP list map is parsed into a [`RadixTrie`] recording
//! the presence of `(address, prefix-length)` entries. Lookups answer whether
//! any stored prefix covers a given address.

use std::net::Ipv4Addr;

/// Outcome of inserting a prefix into the trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// Prefix was added
    Inserted,
    /// Exact prefix was already present; the first value is kept
    Duplicate,
}

/// A trie node. `bits`/`len` hold the edge label leading to this node,
/// left-aligned in `bits`.
#[derive(Debug)]
struct Node {
    bits: u32,
    len: u8,
    present: bool,
    children: [Option<Box<Node>>; 2],
}

impl Node {
    fn new(bits: u32, len: u8, present: bool) -> Self {
        Self {
            bits,
            len,
            present,
            children: [None, None],
        }
    }
}

/// Left shift that tolerates a full-width shift.
#[inline]
fn shl(v: u32, n: u8) -> u32 {
    if n >= 32 {
        0
    } else {
        v << n
    }
}

/// Length of the common prefix of two left-aligned bit strings, capped at
/// `max`.
#[inline]
fn common_prefix(a: u32, b: u32, max: u8) -> u8 {
    ((a ^ b).leading_zeros() as u8).min(max)
}

/// Compressed binary trie keyed by IPv4 address prefix.
pub struct RadixTrie {
    root: Node,
    count: usize,
}

impl RadixTrie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self {
            root: Node::new(0, 0, false),
            count: 0,
        }
    }

    /// Number of distinct prefixes stored.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the trie holds no prefixes.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Insert a prefix. `addr` is the network address in host byte order;
    /// bits below `prefix_len` are ignored.
    pub fn insert(&mut self, addr: u32, prefix_len: u8) -> Insert {
        let prefix_len = prefix_len.min(32);
        let key = addr & mask_of(prefix_len);

        let mut node = &mut self.root;
        let mut depth = 0u8;
        loop {
            if depth == prefix_len {
                if node.present {
                    return Insert::Duplicate;
                }
                node.present = true;
                self.count += 1;
                return Insert::Inserted;
            }

            let rest = shl(key, depth);
            let rest_len = prefix_len - depth;
            let branch = (rest >> 31) as usize;

            if node.children[branch].is_none() {
                node.children[branch] = Some(Box::new(Node::new(rest, rest_len, true)));
                self.count += 1;
                return Insert::Inserted;
            }

            let child = node.children[branch].as_mut().unwrap();
            let shared = common_prefix(rest, child.bits, rest_len.min(child.len));

            if shared == child.len {
                // Edge fully matched, descend
                depth += child.len;
                node = node.children[branch].as_mut().unwrap();
                continue;
            }

            // Split the edge at the shared length
            let old = node.children[branch].take().unwrap();
            let mut split = Node::new(old.bits, shared, false);
            let mut lower = *old;
            lower.bits = shl(lower.bits, shared);
            lower.len -= shared;
            let lower_branch = (lower.bits >> 31) as usize;
            split.children[lower_branch] = Some(Box::new(lower));

            if shared == rest_len {
                // New prefix ends exactly at the split point
                split.present = true;
            } else {
                let tail = shl(rest, shared);
                let leaf = Node::new(tail, rest_len - shared, true);
                split.children[(tail >> 31) as usize] = Some(Box::new(leaf));
            }
            node.children[branch] = Some(Box::new(split));
            self.count += 1;
            return Insert::Inserted;
        }
    }

    /// Whether any stored prefix covers `ip`.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let key = u32::from(ip);
        let mut node = &self.root;
        let mut depth = 0u8;
        loop {
            if node.present {
                return true;
            }
            if depth >= 32 {
                return false;
            }
            let rest = shl(key, depth);
            let branch = (rest >> 31) as usize;
            match &node.children[branch] {
                Some(child) if common_prefix(rest, child.bits, child.len) == child.len => {
                    depth += child.len;
                    node = child;
                }
                _ => return false,
            }
        }
    }

    /// Parse one list token and insert the prefixes it names.
    ///
    /// A token may carry several entries separated by spaces, commas or
    /// semicolons, each of the form `ip[/mask]`. A missing mask means `/32`;
    /// a non-numeric or out-of-range mask is clamped to 32 with a warning.
    /// An unparsable address aborts the token with a warning; entries already
    /// inserted stay, and the rest of the source continues to be processed.
    pub fn insert_token(&mut self, token: &str) {
        for entry in token.split([' ', ',', ';']) {
            if entry.is_empty() {
                continue;
            }

            let (ip_part, prefix_len) = match entry.split_once('/') {
                Some((ip, mask)) => match mask.parse::<u32>() {
                    Ok(k) if k <= 32 => (ip, k as u8),
                    Ok(k) => {
                        log::warn!("invalid netmask value: {}", k);
                        (ip, 32)
                    }
                    Err(e) => {
                        log::warn!("invalid netmask '{}': {}", mask, e);
                        (ip, 32)
                    }
                },
                None => (entry, 32),
            };

            let addr: Ipv4Addr = match ip_part.parse() {
                Ok(a) => a,
                Err(_) => {
                    log::warn!("invalid ip address: {}", ip_part);
                    return;
                }
            };

            if self.insert(u32::from(addr), prefix_len) == Insert::Duplicate {
                log::warn!(
                    "ip {}, mask /{}, value already exists",
                    addr,
                    prefix_len
                );
            }
        }
    }
}

impl Default for RadixTrie {
    fn default() -> Self {
        Self::new()
    }
}

/// Netmask with the top `prefix_len` bits set.
#[inline]
fn mask_of(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_single_host_entry() {
        let mut trie = RadixTrie::new();
        assert_eq!(trie.insert(u32::from(ip("192.168.2.5")), 32), Insert::Inserted);
        assert!(trie.contains(ip("192.168.2.5")));
        assert!(!trie.contains(ip("192.168.2.6")));
    }

    #[test]
    fn test_network_covers_hosts() {
        let mut trie = RadixTrie::new();
        trie.insert(u32::from(ip("10.0.0.0")), 8);
        assert!(trie.contains(ip("10.0.0.1")));
        assert!(trie.contains(ip("10.255.255.255")));
        assert!(!trie.contains(ip("11.0.0.0")));
    }

    #[test]
    fn test_overlapping_prefixes_both_stored() {
        let mut trie = RadixTrie::new();
        assert_eq!(trie.insert(u32::from(ip("192.168.1.0")), 24), Insert::Inserted);
        assert_eq!(trie.insert(u32::from(ip("192.168.1.7")), 32), Insert::Inserted);
        assert_eq!(trie.len(), 2);
        assert!(trie.contains(ip("192.168.1.7")));
        assert!(trie.contains(ip("192.168.1.200")));
    }

    #[test]
    fn test_duplicate_detected() {
        let mut trie = RadixTrie::new();
        assert_eq!(trie.insert(u32::from(ip("10.1.0.0")), 16), Insert::Inserted);
        assert_eq!(trie.insert(u32::from(ip("10.1.0.0")), 16), Insert::Duplicate);
        // Host bits below the mask are ignored
        assert_eq!(trie.insert(u32::from(ip("10.1.2.3")), 16), Insert::Duplicate);
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn test_zero_prefix_matches_everything() {
        let mut trie = RadixTrie::new();
        trie.insert(0, 0);
        assert!(trie.contains(ip("1.2.3.4")));
        assert!(trie.contains(ip("255.255.255.255")));
    }

    #[test]
    fn test_edge_split() {
        let mut trie = RadixTrie::new();
        trie.insert(u32::from(ip("192.168.0.0")), 24);
        trie.insert(u32::from(ip("192.169.0.0")), 24);
        assert!(trie.contains(ip("192.168.0.9")));
        assert!(trie.contains(ip("192.169.0.9")));
        assert!(!trie.contains(ip("192.170.0.9")));
    }

    #[test]
    fn test_shorter_prefix_splits_existing_edge() {
        let mut trie = RadixTrie::new();
        trie.insert(u32::from(ip("192.168.128.0")), 24);
        assert_eq!(trie.insert(u32::from(ip("192.168.0.0")), 16), Insert::Inserted);
        assert_eq!(trie.len(), 2);
        assert!(trie.contains(ip("192.168.128.5")));
        assert!(trie.contains(ip("192.168.3.4")));
        assert!(!trie.contains(ip("192.169.0.1")));
    }

    #[test]
    fn test_token_with_multiple_entries() {
        let mut trie = RadixTrie::new();
        trie.insert_token("192.168.1.0/24,192.168.2.5");
        assert_eq!(trie.len(), 2);
        assert!(trie.contains(ip("192.168.1.99")));
        assert!(trie.contains(ip("192.168.2.5")));
        assert!(!trie.contains(ip("192.168.2.6")));
    }

    #[test]
    fn test_out_of_range_mask_clamped() {
        let mut trie = RadixTrie::new();
        trie.insert_token("192.168.2.5/40");
        assert_eq!(trie.len(), 1);
        assert!(trie.contains(ip("192.168.2.5")));
        assert!(!trie.contains(ip("192.168.2.4")));
    }

    #[test]
    fn test_junk_mask_clamped() {
        let mut trie = RadixTrie::new();
        trie.insert_token("10.0.0.1/abc");
        assert_eq!(trie.len(), 1);
        assert!(trie.contains(ip("10.0.0.1")));
    }

    #[test]
    fn test_bad_address_aborts_token_only() {
        let mut trie = RadixTrie::new();
        trie.insert_token("10.0.0.1 not-an-ip 10.0.0.2");
        // Entries before the bad one survive, the tail of the token is skipped
        assert!(trie.contains(ip("10.0.0.1")));
        assert!(!trie.contains(ip("10.0.0.2")));
        // The next token is unaffected
        trie.insert_token("10.0.0.3");
        assert!(trie.contains(ip("10.0.0.3")));
    }
}
