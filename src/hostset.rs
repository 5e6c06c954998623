//! Case-insensitive host set built from host list sources.

use ahash::AHashSet;

/// Set of host names with case-insensitive membership.
///
/// The source only records presence, so no value is kept per host.
pub struct HostSet {
    hosts: AHashSet<String>,
}

impl HostSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            hosts: AHashSet::new(),
        }
    }

    /// Number of hosts stored.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Insert a host name. Re-inserting an existing name is a no-op.
    pub fn insert(&mut self, host: &str) {
        self.hosts.insert(host.to_ascii_lowercase());
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }
}

impl Default for HostSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut set = HostSet::new();
        set.insert("Spam.Example.COM");
        assert!(set.contains("spam.example.com"));
        assert!(set.contains("SPAM.EXAMPLE.COM"));
        assert!(!set.contains("ham.example.com"));
    }

    #[test]
    fn test_duplicate_insert_keeps_one() {
        let mut set = HostSet::new();
        set.insert("a.example.com");
        set.insert("A.EXAMPLE.COM");
        assert_eq!(set.len(), 1);
    }
}
