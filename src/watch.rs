//! Map registry and refresh scheduler.
//!
//! [`MapRegistry`] holds the configured maps and performs the mandatory
//! blocking first load. [`MapWatcher`] then owns the reactor: one jittered
//! timer per map, non-blocking HTTP fetches, and the commit step shared by
//! every protocol. Commit is a single atomic publish; any failure along the
//! way discards the cycle and leaves the previous generation in place.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant, SystemTime};

use mio::{Events, Poll, Token};

use crate::data::{MapHandle, MapKind};
use crate::error::{Error, Result};
use crate::fetch::file::FileSource;
use crate::fetch::http_async::{FetchEvent, HttpFetch};
use crate::fetch::{http_sync, FetchOutcome};
use crate::locator::{HttpLocator, Locator};
use crate::session::FetchSession;

/// Default base refresh interval; the effective period per tick is
/// `base + base * uniform_random()`.
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(10);
/// Connect deadline for HTTP fetches.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Read deadline for HTTP fetches, restarted on every phase change.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol-specific half of a configured map.
enum Source {
    File(FileSource),
    Http {
        locator: HttpLocator,
        addr: std::net::SocketAddr,
    },
}

impl Source {
    fn describe(&self) -> String {
        match self {
            Source::File(f) => f.path().display().to_string(),
            Source::Http { locator, .. } => {
                format!("{}:{}{}", locator.host, locator.port, locator.path)
            }
        }
    }
}

/// One configured external data source.
struct Map {
    kind: MapKind,
    source: Source,
    refresh: Duration,
    handle: MapHandle,
    last_checked: Option<SystemTime>,
}

impl Map {
    /// Finalize a successful cycle: publish the new generation and move the
    /// timestamp. The superseded generation is freed by refcount once the
    /// last reader lets go of it.
    fn commit(&mut self, session: FetchSession) {
        let entries = session.commit(&self.handle);
        self.last_checked = Some(SystemTime::now());
        log::info!(
            "rereading map data from {}: {} entries",
            self.source.describe(),
            entries
        );
    }
}

/// The set of configured maps, plus fetch tuning shared by all of them.
pub struct MapRegistry {
    maps: Vec<Map>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self {
            maps: Vec::new(),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Override the connect/read deadlines for all maps.
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Number of configured maps.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Configure a map with the default refresh interval.
    ///
    /// Returns the handle consumers use for lookups. Configuration errors
    /// (bad locator, unreadable file, unresolvable host) reject the map; the
    /// daemon carries on with the rest.
    pub fn add_map(&mut self, locator: &str, kind: MapKind) -> Result<MapHandle> {
        self.add_map_with_interval(locator, kind, DEFAULT_REFRESH)
    }

    /// Configure a map with an explicit base refresh interval.
    pub fn add_map_with_interval(
        &mut self,
        locator: &str,
        kind: MapKind,
        refresh: Duration,
    ) -> Result<MapHandle> {
        let source = match Locator::parse(locator)? {
            Locator::File(path) => Source::File(FileSource::open(path)?),
            Locator::Http(locator) => {
                let addr = locator.resolve()?;
                Source::Http { locator, addr }
            }
        };
        let handle = MapHandle::new();
        self.maps.push(Map {
            kind,
            source,
            refresh,
            handle: handle.clone(),
            last_checked: None,
        });
        Ok(handle)
    }

    /// Blocking initial load of every map, so filtering never starts against
    /// empty data. Per-map failures are logged and leave that map without
    /// data until its first periodic retry.
    pub fn load_all(&mut self) {
        for i in 0..self.maps.len() {
            let outcome = self.load_one(i);
            let map = &mut self.maps[i];
            match outcome {
                Ok(Some(session)) => map.commit(session),
                Ok(None) => map.last_checked = Some(SystemTime::now()),
                Err(e) => log::warn!(
                    "initial load of map {} failed: {}",
                    map.source.describe(),
                    e
                ),
            }
        }
    }

    fn load_one(&mut self, i: usize) -> Result<Option<FetchSession>> {
        let connect_timeout = self.connect_timeout;
        let read_timeout = self.read_timeout;
        let map = &mut self.maps[i];
        match &map.source {
            Source::File(source) => source.load(map.kind).map(Some),
            Source::Http { locator, addr } => {
                match http_sync::fetch_blocking(
                    *addr,
                    &locator.host,
                    &locator.path,
                    map.last_checked,
                    map.kind,
                    connect_timeout,
                    read_timeout,
                )? {
                    FetchOutcome::Complete(session) => Ok(Some(session)),
                    FetchOutcome::NotModified => Ok(None),
                }
            }
        }
    }
}

impl Default for MapRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// What a timer firing means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TimerKind {
    /// Begin the next refresh cycle of a map
    Refresh(usize),
    /// Abort an in-flight fetch that blew its deadline
    Deadline(Token),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    at: Instant,
    what: TimerKind,
}

/// Reactor loop driving periodic refreshes of all registered maps.
pub struct MapWatcher {
    registry: MapRegistry,
    poll: Poll,
    events: Events,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    inflight: HashMap<Token, (usize, HttpFetch)>,
    next_token: usize,
}

impl MapWatcher {
    /// Wrap a loaded registry and schedule the first jittered tick of every
    /// map.
    pub fn new(registry: MapRegistry) -> Result<Self> {
        let mut watcher = Self {
            registry,
            poll: Poll::new()?,
            events: Events::with_capacity(64),
            timers: BinaryHeap::new(),
            inflight: HashMap::new(),
            next_token: 0,
        };
        for i in 0..watcher.registry.maps.len() {
            watcher.schedule_refresh(i);
        }
        Ok(watcher)
    }

    /// Drive the loop forever.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.turn(None)?;
        }
    }

    /// Drive the loop for a bounded wall-clock duration.
    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        let until = Instant::now() + duration;
        while Instant::now() < until {
            self.turn(Some(until))?;
        }
        Ok(())
    }

    /// Abort in-flight fetches and drop all timers.
    pub fn shutdown(&mut self) {
        for (_, (idx, mut fetch)) in self.inflight.drain() {
            fetch.deregister(self.poll.registry());
            log::debug!(
                "aborted in-flight fetch of {}",
                self.registry.maps[idx].source.describe()
            );
        }
        self.timers.clear();
        log::info!("map watcher stopped");
    }

    /// One poll cycle: wait for the nearest timer (bounded by `until`),
    /// dispatch socket readiness, then fire due timers.
    fn turn(&mut self, until: Option<Instant>) -> Result<()> {
        let now = Instant::now();
        let mut wake = self.timers.peek().map(|Reverse(t)| t.at);
        if let Some(until) = until {
            wake = Some(wake.map_or(until, |w| w.min(until)));
        }
        let timeout = wake.map(|w| w.saturating_duration_since(now));

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|ev| (ev.token(), ev.is_writable(), ev.is_readable()))
            .collect();
        for (token, writable, readable) in ready {
            self.dispatch(token, writable, readable);
        }

        self.fire_timers();
        Ok(())
    }

    fn dispatch(&mut self, token: Token, writable: bool, readable: bool) {
        let Some((_, fetch)) = self.inflight.get_mut(&token) else {
            return;
        };

        if writable {
            let event = fetch.on_writable(self.poll.registry(), token);
            if self.settle(token, event) {
                return;
            }
        }
        if readable {
            if let Some((_, fetch)) = self.inflight.get_mut(&token) {
                let event = fetch.on_readable();
                self.settle(token, event);
            }
        }
    }

    /// Apply a fetch event; returns true when the fetch reached a terminal
    /// state and was torn down.
    fn settle(&mut self, token: Token, event: FetchEvent) -> bool {
        match event {
            FetchEvent::Pending => {
                if let Some((_, fetch)) = self.inflight.get(&token) {
                    self.timers.push(Reverse(TimerEntry {
                        at: fetch.deadline,
                        what: TimerKind::Deadline(token),
                    }));
                }
                false
            }
            FetchEvent::Done(outcome) => {
                let (idx, mut fetch) = self.inflight.remove(&token).expect("fetch in flight");
                fetch.deregister(self.poll.registry());
                let map = &mut self.registry.maps[idx];
                match outcome {
                    FetchOutcome::Complete(session) => map.commit(session),
                    FetchOutcome::NotModified => {
                        map.last_checked = Some(SystemTime::now());
                        log::info!(
                            "data is not modified for server {}",
                            map.source.describe()
                        );
                    }
                }
                true
            }
            FetchEvent::Failed(e) => {
                let (idx, mut fetch) = self.inflight.remove(&token).expect("fetch in flight");
                fetch.deregister(self.poll.registry());
                log::warn!(
                    "fetch of map {} failed: {}",
                    self.registry.maps[idx].source.describe(),
                    e
                );
                true
            }
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(entry)) = self.timers.peek().copied() {
            if entry.at > now {
                break;
            }
            self.timers.pop();
            match entry.what {
                TimerKind::Refresh(idx) => {
                    // Re-arm first, with fresh jitter, exactly once per firing
                    self.schedule_refresh(idx);
                    self.refresh_map(idx);
                }
                TimerKind::Deadline(token) => self.expire(token, now),
            }
        }
    }

    /// Push the next jittered refresh tick for a map.
    fn schedule_refresh(&mut self, idx: usize) {
        let base = self.registry.maps[idx].refresh;
        let jittered = base + base.mul_f64(rand::random::<f64>());
        self.timers.push(Reverse(TimerEntry {
            at: Instant::now() + jittered,
            what: TimerKind::Refresh(idx),
        }));
    }

    fn refresh_map(&mut self, idx: usize) {
        if self.inflight.values().any(|(i, _)| *i == idx) {
            log::debug!(
                "previous fetch of {} still in flight, skipping tick",
                self.registry.maps[idx].source.describe()
            );
            return;
        }

        let kind = self.registry.maps[idx].kind;
        let last_checked = self.registry.maps[idx].last_checked;
        match &mut self.registry.maps[idx].source {
            Source::File(source) => {
                let outcome = source.refresh(kind);
                let map = &mut self.registry.maps[idx];
                match outcome {
                    Ok(Some(session)) => map.commit(session),
                    Ok(None) => {}
                    Err(e) => log::warn!(
                        "refresh of map {} failed: {}",
                        map.source.describe(),
                        e
                    ),
                }
            }
            Source::Http { locator, addr } => {
                let addr = *addr;
                let host = locator.host.clone();
                let path = locator.path.clone();
                let token = Token(self.next_token);
                self.next_token += 1;
                let started = HttpFetch::start(
                    self.poll.registry(),
                    token,
                    addr,
                    &host,
                    &path,
                    last_checked,
                    kind,
                    self.registry.connect_timeout,
                    self.registry.read_timeout,
                );
                match started {
                    Ok(fetch) => {
                        self.timers.push(Reverse(TimerEntry {
                            at: fetch.deadline,
                            what: TimerKind::Deadline(token),
                        }));
                        self.inflight.insert(token, (idx, fetch));
                    }
                    Err(e) => log::info!(
                        "cannot connect to http server {}:{}: {}",
                        host, addr.port(), e
                    ),
                }
            }
        }
    }

    /// A deadline timer fired; abort the fetch if it is still behind it.
    fn expire(&mut self, token: Token, now: Instant) {
        let stale = match self.inflight.get(&token) {
            // A later phase pushed the deadline forward; a newer timer exists
            Some((_, fetch)) => fetch.deadline <= now,
            None => false,
        };
        if stale {
            self.settle(token, FetchEvent::Failed(Error::Timeout));
        }
    }
}
