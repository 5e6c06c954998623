//! Per-refresh-cycle parse state.
//!
//! A [`FetchSession`] owns the structure being built for the next generation
//! of a map. It is fed raw source bytes by a fetch driver, runs them through
//! the list scanner, and on success publishes the finished structure in one
//! step. Dropping a session discards the partial build without touching the
//! published slot.

use crate::data::{MapData, MapHandle, MapKind};
use crate::scanner::ListScanner;

/// Transient state of one refresh cycle.
pub struct FetchSession {
    kind: MapKind,
    scanner: ListScanner,
    /// Structure under construction, created on the first token.
    cur: Option<MapData>,
}

impl FetchSession {
    /// Start a cycle for a map of the given kind.
    pub fn new(kind: MapKind) -> Self {
        Self {
            kind,
            scanner: ListScanner::new(),
            cur: None,
        }
    }

    /// Feed the next fragment of raw source bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        let Self { kind, scanner, cur } = self;
        let kind = *kind;
        scanner.feed(chunk, &mut |token| {
            cur.get_or_insert_with(|| MapData::empty(kind)).insert_token(token);
        });
    }

    /// Finalize the generation and publish it through `handle`.
    ///
    /// The previously published generation is unreachable for new readers
    /// from this point on and is freed once its last holder drops it. An
    /// empty source publishes an empty structure rather than clearing the
    /// slot, so readers never fall back to "no data" after a first success.
    ///
    /// Returns the number of entries committed.
    pub fn commit(mut self, handle: &MapHandle) -> usize {
        let Self { kind, scanner, cur } = &mut self;
        let kind = *kind;
        scanner.finish(&mut |token| {
            cur.get_or_insert_with(|| MapData::empty(kind)).insert_token(token);
        });
        let data = self.cur.take().unwrap_or_else(|| MapData::empty(self.kind));
        let entries = data.len();
        handle.publish(data);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_publishes_tokens() {
        let handle = MapHandle::new();
        let mut session = FetchSession::new(MapKind::HostList);
        session.feed(b"spam.example.com\nbad.exa");
        session.feed(b"mple.net # comment\n");
        let n = session.commit(&handle);
        assert_eq!(n, 2);
        assert!(handle.contains_host("bad.example.net"));
        assert!(handle.contains_host("SPAM.EXAMPLE.COM"));
    }

    #[test]
    fn test_dropped_session_leaves_slot_untouched() {
        let handle = MapHandle::new();
        let mut first = FetchSession::new(MapKind::HostList);
        first.feed(b"keep.example.com\n");
        first.commit(&handle);
        let before = handle.load().unwrap();

        let mut aborted = FetchSession::new(MapKind::HostList);
        aborted.feed(b"discarded.example.com\n");
        drop(aborted);

        let after = handle.load().unwrap();
        assert!(std::sync::Arc::ptr_eq(&before, &after));
        assert!(!handle.contains_host("discarded.example.com"));
    }

    #[test]
    fn test_empty_source_commits_empty_generation() {
        let handle = MapHandle::new();
        let session = FetchSession::new(MapKind::IpList);
        assert_eq!(session.commit(&handle), 0);
        let data = handle.load().unwrap();
        assert!(data.is_empty());
    }
}
