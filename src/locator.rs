//! Map source locators.
//!
//! A map is configured with a locator string: `file://<path>` or
//! `http://<host>[:<port>]/<path>`. Anything else is a configuration error
//! and rejects the map.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default port for `http://` locators without an explicit one.
const DEFAULT_HTTP_PORT: u16 = 80;

/// Host, port and path of an HTTP-backed map source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpLocator {
    pub host: String,
    pub port: u16,
    /// Request path, always starting with `/`
    pub path: String,
}

impl HttpLocator {
    /// Resolve the host once, at configuration time. IPv4 addresses are
    /// preferred to match what the list servers publish.
    pub fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| Error::Resolve(self.host.clone()))?
            .peekable();
        let first = addrs.peek().copied();
        addrs
            .find(SocketAddr::is_ipv4)
            .or(first)
            .ok_or_else(|| Error::Resolve(self.host.clone()))
    }
}

/// A parsed map source locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    File(PathBuf),
    Http(HttpLocator),
}

impl Locator {
    /// Parse a locator string. Protocol prefixes are matched
    /// case-insensitively; malformed definitions are rejected here so a bad
    /// map never reaches the registry.
    pub fn parse(line: &str) -> Result<Self> {
        if let Some(rest) = strip_prefix_ci(line, "file://") {
            if rest.is_empty() {
                return Err(Error::BadLocator(line.to_string()));
            }
            return Ok(Locator::File(PathBuf::from(rest)));
        }

        let rest = strip_prefix_ci(line, "http://")
            .ok_or_else(|| Error::InvalidProtocol(line.to_string()))?;

        let (host, port, path) = match rest.find([':', '/']) {
            Some(i) if rest.as_bytes()[i] == b':' => {
                let host = &rest[..i];
                let after = &rest[i + 1..];
                let slash = after
                    .find('/')
                    .ok_or_else(|| Error::BadLocator(line.to_string()))?;
                let port_str = &after[..slash];
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| Error::BadPort(line.to_string()))?;
                (host, port, &after[slash..])
            }
            Some(i) => (&rest[..i], DEFAULT_HTTP_PORT, &rest[i..]),
            None => return Err(Error::BadLocator(line.to_string())),
        };

        if host.is_empty() || path.is_empty() {
            return Err(Error::BadLocator(line.to_string()));
        }

        Ok(Locator::Http(HttpLocator {
            host: host.to_string(),
            port,
            path: path.to_string(),
        }))
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_locator() {
        let loc = Locator::parse("file:///etc/mail/blocklist.txt").unwrap();
        assert_eq!(loc, Locator::File(PathBuf::from("/etc/mail/blocklist.txt")));
    }

    #[test]
    fn test_http_default_port() {
        let loc = Locator::parse("http://lists.example.com/hosts.txt").unwrap();
        assert_eq!(
            loc,
            Locator::Http(HttpLocator {
                host: "lists.example.com".to_string(),
                port: 80,
                path: "/hosts.txt".to_string(),
            })
        );
    }

    #[test]
    fn test_http_explicit_port() {
        let loc = Locator::parse("HTTP://lists.example.com:8080/a/b.txt").unwrap();
        assert_eq!(
            loc,
            Locator::Http(HttpLocator {
                host: "lists.example.com".to_string(),
                port: 8080,
                path: "/a/b.txt".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        assert!(matches!(
            Locator::parse("ftp://example.com/x"),
            Err(Error::InvalidProtocol(_))
        ));
        assert!(matches!(
            Locator::parse("/plain/path"),
            Err(Error::InvalidProtocol(_))
        ));
    }

    #[test]
    fn test_missing_path_rejected() {
        assert!(matches!(
            Locator::parse("http://example.com"),
            Err(Error::BadLocator(_))
        ));
        assert!(matches!(
            Locator::parse("http://example.com:8080"),
            Err(Error::BadLocator(_))
        ));
    }

    #[test]
    fn test_bad_port_rejected() {
        assert!(matches!(
            Locator::parse("http://example.com:eighty/x"),
            Err(Error::BadPort(_))
        ));
        assert!(matches!(
            Locator::parse("http://example.com:99999/x"),
            Err(Error::BadPort(_))
        ));
    }

    #[test]
    fn test_empty_file_path_rejected() {
        assert!(matches!(
            Locator::parse("file://"),
            Err(Error::BadLocator(_))
        ));
    }

    #[test]
    fn test_resolve_literal_address() {
        let loc = HttpLocator {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/x".to_string(),
        };
        assert_eq!(loc.resolve().unwrap(), "127.0.0.1:8080".parse().unwrap());
    }
}
