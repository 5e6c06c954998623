//! Blocking HTTP fetch, used once per map for the startup load.
//!
//! The daemon must never start filtering against empty data, so the very
//! first load of every HTTP-backed map is synchronous. All later refreshes
//! go through the non-blocking driver.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, SystemTime};

use crate::data::MapKind;
use crate::error::{Error, Result};
use crate::fetch::{FetchOutcome, READ_BUF};
use crate::http::{format_request, FetchProgress, ResponseReader};
use crate::session::FetchSession;

/// Connect, send the request and loop-read the reply to completion.
pub fn fetch_blocking(
    addr: SocketAddr,
    host: &str,
    path: &str,
    last_checked: Option<SystemTime>,
    kind: MapKind,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<FetchOutcome> {
    let mut stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
    stream.set_read_timeout(Some(read_timeout))?;
    stream.write_all(&format_request(host, path, last_checked))?;

    let mut reader = ResponseReader::new();
    let mut session = FetchSession::new(kind);
    let mut buf = [0u8; READ_BUF];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(Error::Timeout);
            }
            Err(e) => return Err(e.into()),
        };
        let progress = if n == 0 {
            reader.finish()?
        } else {
            reader.feed(&buf[..n], &mut session)?
        };
        match progress {
            FetchProgress::Continue => {}
            FetchProgress::NotModified => return Ok(FetchOutcome::NotModified),
            FetchProgress::Complete => return Ok(FetchOutcome::Complete(session)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MapHandle;
    use std::net::TcpListener;
    use std::thread;

    /// One-shot HTTP server answering with a fixed response.
    fn serve_once(response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut req = [0u8; 1024];
            let _ = sock.read(&mut req);
            sock.write_all(response).unwrap();
        });
        addr
    }

    fn timeouts() -> (Duration, Duration) {
        (Duration::from_secs(2), Duration::from_secs(2))
    }

    #[test]
    fn test_fetch_plain_body() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\nServer: test\r\n\r\nspam.example.com\nbad.example.org # x\n",
        );
        let (ct, rt) = timeouts();
        let outcome =
            fetch_blocking(addr, "h", "/l.txt", None, MapKind::HostList, ct, rt).unwrap();
        let handle = MapHandle::new();
        match outcome {
            FetchOutcome::Complete(session) => assert_eq!(session.commit(&handle), 2),
            FetchOutcome::NotModified => panic!("expected body"),
        }
        assert!(handle.contains_host("bad.example.org"));
    }

    #[test]
    fn test_fetch_chunked_body() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              b\r\n192.168.1.0\r\n9\r\n/24,192.1\r\n7\r\n68.2.5\n\r\n0\r\n\r\n",
        );
        let (ct, rt) = timeouts();
        let outcome =
            fetch_blocking(addr, "h", "/ips.txt", None, MapKind::IpList, ct, rt).unwrap();
        let handle = MapHandle::new();
        match outcome {
            FetchOutcome::Complete(session) => {
                session.commit(&handle);
            }
            FetchOutcome::NotModified => panic!("expected body"),
        }
        assert!(handle.contains_ip("192.168.1.200".parse().unwrap()));
        assert!(handle.contains_ip("192.168.2.5".parse().unwrap()));
        assert!(!handle.contains_ip("192.168.2.6".parse().unwrap()));
    }

    #[test]
    fn test_fetch_not_modified() {
        let addr = serve_once(b"HTTP/1.1 304 Not Modified\r\nServer: test\r\n\r\n");
        let (ct, rt) = timeouts();
        let outcome = fetch_blocking(
            addr,
            "h",
            "/l.txt",
            Some(SystemTime::now()),
            MapKind::HostList,
            ct,
            rt,
        )
        .unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified));
    }

    #[test]
    fn test_fetch_error_status() {
        let addr = serve_once(b"HTTP/1.1 500 Oops\r\n\r\n");
        let (ct, rt) = timeouts();
        let res = fetch_blocking(addr, "h", "/l.txt", None, MapKind::HostList, ct, rt);
        assert!(matches!(res, Err(Error::HttpStatus(500))));
    }

    #[test]
    fn test_fetch_connect_refused() {
        // Port from the ephemeral range with nothing listening
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let (ct, rt) = timeouts();
        assert!(fetch_blocking(addr, "h", "/l.txt", None, MapKind::HostList, ct, rt).is_err());
    }
}
