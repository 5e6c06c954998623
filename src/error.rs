//! Error types for mapwatch.

use thiserror::Error;

/// Error type for map configuration and fetch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Locator does not start with a supported protocol prefix
    #[error("invalid map fetching protocol: {0}")]
    InvalidProtocol(String),

    /// Locator is structurally broken (missing path, empty host)
    #[error("bad map definition: {0}")]
    BadLocator(String),

    /// Port part of an HTTP locator is not a number in range
    #[error("bad port in map definition: {0}")]
    BadPort(String),

    /// Host name could not be resolved at configuration time
    #[error("cannot resolve host: {0}")]
    Resolve(String),

    /// Status line did not carry a numeric code
    #[error("error while reading HTTP status code")]
    MalformedStatus,

    /// Header line exceeded the accepted length
    #[error("malformed reply header")]
    MalformedHeader,

    /// Server answered with a code other than 200 or 304
    #[error("got error reply from server: {0}")]
    HttpStatus(u16),

    /// Chunk-size line was not valid hex
    #[error("invalid chunked reply")]
    InvalidChunk,

    /// Connection closed before the body was complete
    #[error("connection terminated before response was complete")]
    TruncatedResponse,

    /// Connect or read deadline expired
    #[error("fetch timed out")]
    Timeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for mapwatch operations.
pub type Result<T> = std::result::Result<T, Error>;
