//! Hand-written HTTP/1.1 client-side response handling.
//!
//! The fetch drivers read from non-blocking sockets, so everything here is a
//! restartable state machine: any fragment boundary, down to one byte, leaves
//! the parser in a state it can resume from on the next read.

use std::collections::HashMap;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::session::FetchSession;

/// Longest accepted chunk-size line, hex digits plus extensions.
const MAX_CHUNK_LINE: usize = 32;

/// Longest accepted header name or value.
const MAX_HEADER_LINE: usize = 1024;

/// Format the GET request for a map source.
///
/// `If-Modified-Since` carries the time of the last successful fetch when one
/// is known, in the asctime form the original servers expect.
pub fn format_request(host: &str, path: &str, last_checked: Option<SystemTime>) -> Vec<u8> {
    let mut out = format!(
        "GET {}{} HTTP/1.1\r\nConnection: close\r\nHost: {}\r\n",
        if path.starts_with('/') { "" } else { "/" },
        path,
        host
    );
    if let Some(when) = last_checked {
        let when: DateTime<Utc> = when.into();
        out.push_str(&format!(
            "If-Modified-Since: {}\r\n",
            when.format("%a %b %e %H:%M:%S %Y")
        ));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// States of the reply head parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyState {
    /// Scanning the status line for the numeric code
    StatusCode,
    /// Discarding the rest of a line
    SkipToEol,
    /// Accumulating a header name up to `:`
    HeaderName,
    /// Skipping spaces between `:` and the value
    SkipSpaceAfterColon,
    /// Accumulating a header value up to `\r`
    HeaderValue,
    /// Blank line seen, `\n` pending before the body
    AlmostBody,
    /// Head complete, remaining bytes belong to the body
    Body,
}

/// Restartable parser for an HTTP reply's status line and headers.
pub struct ReplyParser {
    state: ReplyState,
    code: u16,
    code_digits: u8,
    seen_space: bool,
    name: String,
    value: String,
    headers: HashMap<String, String>,
}

impl ReplyParser {
    pub fn new() -> Self {
        Self {
            state: ReplyState::StatusCode,
            code: 0,
            code_digits: 0,
            seen_space: false,
            name: String::new(),
            value: String::new(),
            headers: HashMap::new(),
        }
    }

    /// Whether the head is fully parsed.
    pub fn in_body(&self) -> bool {
        self.state == ReplyState::Body
    }

    /// The parsed status code. Meaningful once [`in_body`] is true.
    ///
    /// [`in_body`]: ReplyParser::in_body
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Case-insensitive header lookup. Duplicate headers keep the last value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    /// Whether the body uses chunked transfer framing.
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Consume head bytes from `buf`, returning how many were used.
    ///
    /// Once the blank line is reached the parser stops consuming; the caller
    /// hands the rest of the buffer to the body framing layer.
    pub fn feed(&mut self, buf: &[u8]) -> Result<usize> {
        let mut i = 0;
        while i < buf.len() {
            let b = buf[i];
            match self.state {
                ReplyState::StatusCode => {
                    if !self.seen_space {
                        if b == b' ' {
                            self.seen_space = true;
                        }
                    } else if b.is_ascii_digit() {
                        self.code = self.code.saturating_mul(10) + u16::from(b - b'0');
                        self.code_digits += 1;
                    } else if b == b' ' && self.code_digits == 0 {
                        // Tolerate extra spaces before the code
                    } else if self.code_digits > 0 && (b == b' ' || b == b'\r') {
                        self.state = ReplyState::SkipToEol;
                    } else if self.code_digits > 0 && b == b'\n' {
                        self.state = ReplyState::HeaderName;
                        self.name.clear();
                    } else {
                        return Err(Error::MalformedStatus);
                    }
                    i += 1;
                }
                ReplyState::SkipToEol => {
                    if b == b'\n' {
                        self.state = ReplyState::HeaderName;
                        self.name.clear();
                    }
                    i += 1;
                }
                ReplyState::HeaderName => {
                    match b {
                        b':' => self.state = ReplyState::SkipSpaceAfterColon,
                        b'\r' if self.name.is_empty() => self.state = ReplyState::AlmostBody,
                        b'\n' if self.name.is_empty() => self.state = ReplyState::Body,
                        b'\r' | b'\n' => {
                            // Header line without a colon
                            log::warn!("malformed header line skipped: {}", self.name);
                            self.name.clear();
                            if b == b'\r' {
                                self.state = ReplyState::SkipToEol;
                            }
                        }
                        _ => {
                            if self.name.len() >= MAX_HEADER_LINE {
                                return Err(Error::MalformedHeader);
                            }
                            self.name.push(b.to_ascii_lowercase() as char);
                        }
                    }
                    i += 1;
                }
                ReplyState::SkipSpaceAfterColon => {
                    if b == b' ' {
                        i += 1;
                    } else {
                        self.value.clear();
                        self.state = ReplyState::HeaderValue;
                    }
                }
                ReplyState::HeaderValue => {
                    if b == b'\r' || b == b'\n' {
                        let name = std::mem::take(&mut self.name);
                        let value = std::mem::take(&mut self.value);
                        self.headers.insert(name, value);
                        self.state = if b == b'\r' {
                            ReplyState::SkipToEol
                        } else {
                            self.name.clear();
                            ReplyState::HeaderName
                        };
                    } else {
                        if self.value.len() >= MAX_HEADER_LINE {
                            return Err(Error::MalformedHeader);
                        }
                        self.value.push(b as char);
                    }
                    i += 1;
                }
                ReplyState::AlmostBody => {
                    if b == b'\n' {
                        self.state = ReplyState::Body;
                        i += 1;
                    } else {
                        // Lone \r inside what looked like the blank line
                        self.state = ReplyState::HeaderName;
                    }
                }
                ReplyState::Body => break,
            }
        }
        Ok(i)
    }
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new()
    }
}

/// States of the chunked-body decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Accumulating the hex size line
    Size,
    /// Forwarding chunk payload, counter of bytes still expected
    Data(usize),
    /// Expecting the `\r` after a chunk's payload
    DelimCr,
    /// Expecting the `\n` after a chunk's payload
    DelimLf,
    /// Zero-sized chunk seen
    Done,
}

/// Restartable decoder for `Transfer-Encoding: chunked` bodies.
///
/// Payload bytes are forwarded to the caller's sink in the largest slices
/// available; only the size lines and delimiters are consumed byte-wise, so
/// a size line split across reads is carried over intact.
pub struct ChunkedDecoder {
    state: ChunkState,
    line: Vec<u8>,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
            line: Vec::new(),
        }
    }

    /// Whether the terminating zero-length chunk has been seen.
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Decode the next fragment, forwarding payload bytes to `out`.
    pub fn feed<S: FnMut(&[u8])>(&mut self, buf: &[u8], out: &mut S) -> Result<()> {
        let mut i = 0;
        while i < buf.len() {
            match self.state {
                ChunkState::Size => {
                    let b = buf[i];
                    i += 1;
                    if b == b'\n' {
                        self.state = self.parse_size_line()?;
                    } else {
                        if self.line.len() >= MAX_CHUNK_LINE {
                            return Err(Error::InvalidChunk);
                        }
                        self.line.push(b);
                    }
                }
                ChunkState::Data(remaining) => {
                    let take = remaining.min(buf.len() - i);
                    out(&buf[i..i + take]);
                    i += take;
                    self.state = if take == remaining {
                        ChunkState::DelimCr
                    } else {
                        ChunkState::Data(remaining - take)
                    };
                }
                ChunkState::DelimCr => {
                    match buf[i] {
                        b'\r' => self.state = ChunkState::DelimLf,
                        // Tolerate a bare \n delimiter
                        b'\n' => self.state = ChunkState::Size,
                        _ => return Err(Error::InvalidChunk),
                    }
                    i += 1;
                }
                ChunkState::DelimLf => {
                    if buf[i] != b'\n' {
                        return Err(Error::InvalidChunk);
                    }
                    self.state = ChunkState::Size;
                    i += 1;
                }
                ChunkState::Done => break,
            }
        }
        Ok(())
    }

    fn parse_size_line(&mut self) -> Result<ChunkState> {
        let line = std::mem::take(&mut self.line);
        let text = std::str::from_utf8(&line).map_err(|_| Error::InvalidChunk)?;
        // Strip the optional \r and any chunk extension after ';'
        let text = text.trim_end_matches('\r');
        let text = text.split(';').next().unwrap_or("").trim();
        if text.is_empty() {
            return Err(Error::InvalidChunk);
        }
        let size = usize::from_str_radix(text, 16).map_err(|_| Error::InvalidChunk)?;
        Ok(if size == 0 {
            ChunkState::Done
        } else {
            ChunkState::Data(size)
        })
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Body framing, decided once the head is parsed.
enum Framing {
    Unknown,
    /// Everything up to connection close is body
    Identity,
    Chunked(ChunkedDecoder),
}

/// Result of feeding response bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProgress {
    /// More data expected
    Continue,
    /// Server answered 304; only the timestamp should be updated
    NotModified,
    /// Body complete, the session can be committed
    Complete,
}

/// Drives one HTTP reply from raw socket reads into a [`FetchSession`].
///
/// Shared by the blocking startup loader and the reactor-driven refresh
/// driver; both just hand it whatever the socket produced.
pub struct ResponseReader {
    parser: ReplyParser,
    framing: Framing,
}

impl ResponseReader {
    pub fn new() -> Self {
        Self {
            parser: ReplyParser::new(),
            framing: Framing::Unknown,
        }
    }

    /// The status code, once known.
    pub fn code(&self) -> u16 {
        self.parser.code()
    }

    /// Feed bytes read from the socket.
    pub fn feed(&mut self, buf: &[u8], session: &mut FetchSession) -> Result<FetchProgress> {
        let mut rest = buf;
        if !self.parser.in_body() {
            let used = self.parser.feed(rest)?;
            rest = &rest[used..];
            if !self.parser.in_body() {
                return Ok(FetchProgress::Continue);
            }
            match self.parser.code() {
                200 => {}
                304 => return Ok(FetchProgress::NotModified),
                code => return Err(Error::HttpStatus(code)),
            }
            self.framing = if self.parser.is_chunked() {
                Framing::Chunked(ChunkedDecoder::new())
            } else {
                Framing::Identity
            };
        }

        match &mut self.framing {
            Framing::Unknown => Ok(FetchProgress::Continue),
            Framing::Identity => {
                session.feed(rest);
                Ok(FetchProgress::Continue)
            }
            Framing::Chunked(decoder) => {
                decoder.feed(rest, &mut |bytes| session.feed(bytes))?;
                if decoder.is_done() {
                    Ok(FetchProgress::Complete)
                } else {
                    Ok(FetchProgress::Continue)
                }
            }
        }
    }

    /// Handle end-of-stream from the server.
    pub fn finish(&mut self) -> Result<FetchProgress> {
        if !self.parser.in_body() {
            return Err(Error::TruncatedResponse);
        }
        match &self.framing {
            Framing::Identity => Ok(FetchProgress::Complete),
            Framing::Chunked(decoder) if decoder.is_done() => Ok(FetchProgress::Complete),
            Framing::Chunked(_) => Err(Error::TruncatedResponse),
            // 304 replies carry no body
            Framing::Unknown if self.parser.code() == 304 => Ok(FetchProgress::NotModified),
            Framing::Unknown => Err(Error::TruncatedResponse),
        }
    }
}

impl Default for ResponseReader {
    fn default() -> Self {
        Self::new()
    }
}
