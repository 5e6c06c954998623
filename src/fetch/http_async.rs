//! Non-blocking HTTP fetch driven by the reactor.
//!
//! One [`HttpFetch`] lives for a single refresh cycle: register for write
//! readiness, send the request, switch to read interest, feed every readable
//! burst through the response parser, then report the outcome. The scheduler
//! reacts to [`FetchEvent`] values; this driver never commits by itself.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime};

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::data::MapKind;
use crate::error::{Error, Result};
use crate::fetch::{FetchOutcome, READ_BUF};
use crate::http::{format_request, FetchProgress, ResponseReader};
use crate::session::FetchSession;

/// Phase of the in-flight request.
enum Phase {
    /// Waiting for connect + write readiness; request bytes not yet fully sent
    Sending { request: Vec<u8>, written: usize },
    /// Request sent, consuming the reply
    Reading,
}

/// What a readiness event did to the fetch.
pub enum FetchEvent {
    /// Still in flight; wait for the next readiness or deadline
    Pending,
    /// Terminal success
    Done(FetchOutcome),
    /// Terminal failure; the cycle is abandoned and retried next tick
    Failed(Error),
}

/// State of one asynchronous fetch cycle.
pub struct HttpFetch {
    stream: TcpStream,
    phase: Phase,
    reader: ResponseReader,
    session: Option<FetchSession>,
    read_timeout: Duration,
    /// Current phase's deadline; the scheduler aborts the fetch past it.
    pub deadline: Instant,
}

impl HttpFetch {
    /// Start a non-blocking connect and register for write readiness.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        registry: &Registry,
        token: Token,
        addr: SocketAddr,
        host: &str,
        path: &str,
        last_checked: Option<SystemTime>,
        kind: MapKind,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let mut stream = TcpStream::connect(addr)?;
        registry.register(&mut stream, token, Interest::WRITABLE)?;
        Ok(Self {
            stream,
            phase: Phase::Sending {
                request: format_request(host, path, last_checked),
                written: 0,
            },
            reader: ResponseReader::new(),
            session: Some(FetchSession::new(kind)),
            read_timeout,
            deadline: Instant::now() + connect_timeout,
        })
    }

    /// Write readiness: the connect finished (or failed); push the request
    /// out and switch to read interest once it is fully written.
    pub fn on_writable(&mut self, registry: &Registry, token: Token) -> FetchEvent {
        let (request, written) = match &mut self.phase {
            Phase::Sending { request, written } => (request, written),
            // Spurious writability after the request went out
            Phase::Reading => return FetchEvent::Pending,
        };

        // A failed non-blocking connect reports through the error slot
        match self.stream.take_error() {
            Ok(Some(e)) | Err(e) => return FetchEvent::Failed(e.into()),
            Ok(None) => {}
        }

        while *written < request.len() {
            match self.stream.write(&request[*written..]) {
                Ok(n) => *written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return FetchEvent::Pending
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                    // Connect still in progress on some platforms
                    return FetchEvent::Pending;
                }
                Err(e) => return FetchEvent::Failed(e.into()),
            }
        }

        if let Err(e) = registry.reregister(&mut self.stream, token, Interest::READABLE) {
            return FetchEvent::Failed(e.into());
        }
        self.phase = Phase::Reading;
        self.deadline = Instant::now() + self.read_timeout;
        FetchEvent::Pending
    }

    /// Read readiness: drain the socket through the response parser.
    pub fn on_readable(&mut self) -> FetchEvent {
        if matches!(self.phase, Phase::Sending { .. }) {
            // Readable before the request went out means the peer gave up
            return FetchEvent::Failed(Error::TruncatedResponse);
        }
        let session = match self.session.as_mut() {
            Some(s) => s,
            None => return FetchEvent::Pending,
        };

        let mut buf = [0u8; READ_BUF];
        loop {
            let n = match self.stream.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.deadline = Instant::now() + self.read_timeout;
                    return FetchEvent::Pending;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return FetchEvent::Failed(e.into()),
            };
            let progress = if n == 0 {
                self.reader.finish()
            } else {
                self.reader.feed(&buf[..n], session)
            };
            match progress {
                Ok(FetchProgress::Continue) => {
                    if n == 0 {
                        // End-of-stream is terminal, Continue cannot follow it
                        return FetchEvent::Failed(Error::TruncatedResponse);
                    }
                }
                Ok(FetchProgress::NotModified) => {
                    return FetchEvent::Done(FetchOutcome::NotModified)
                }
                Ok(FetchProgress::Complete) => {
                    let session = self.session.take().expect("session present until complete");
                    return FetchEvent::Done(FetchOutcome::Complete(session));
                }
                Err(e) => return FetchEvent::Failed(e),
            }
        }
    }

    /// Remove the socket from the reactor. Called on every terminal path.
    pub fn deregister(&mut self, registry: &Registry) {
        if let Err(e) = registry.deregister(&mut self.stream) {
            log::debug!("deregister failed: {}", e);
        }
    }
}
