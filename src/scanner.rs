//! Restartable scanner for line-oriented list sources.
//!
//! Sources arrive in arbitrary-sized fragments (read-buffer sized blocks from
//! a file, or whatever a non-blocking socket delivers), so the scanner keeps
//! its state and the partially accumulated token between calls. Feeding the
//! whole source at once or one byte at a time yields the same token sequence.

/// Scanner state between fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Accumulating token characters until `#`, `\r` or `\n`
    Token,
    /// Discarding characters until end of line
    Comment,
}

/// Restartable tokenizer for list files.
///
/// Tokens are separated by line ends; a `#` starts a comment that runs to the
/// end of the line. Text before the `#` is still a token, so lines like
/// `127.0.0.1 #localhost` yield `127.0.0.1`. Emitted tokens are trimmed of
/// surrounding whitespace; empty ones are dropped.
pub struct ListScanner {
    state: ScanState,
    /// Partial token carried over from the previous fragment.
    pending: Vec<u8>,
}

impl ListScanner {
    /// Create a scanner at the start of a source.
    pub fn new() -> Self {
        Self {
            state: ScanState::Token,
            pending: Vec::new(),
        }
    }

    /// Feed the next fragment of the source.
    ///
    /// Every completed token is handed to `sink`. A token cut off by the end
    /// of the fragment is kept until the next call (or [`finish`]).
    ///
    /// [`finish`]: ListScanner::finish
    pub fn feed<S: FnMut(&str)>(&mut self, chunk: &[u8], sink: &mut S) {
        for &b in chunk {
            match self.state {
                ScanState::Token => match b {
                    b'#' => {
                        self.flush(sink);
                        self.state = ScanState::Comment;
                    }
                    b'\r' | b'\n' => self.flush(sink),
                    _ => self.pending.push(b),
                },
                ScanState::Comment => {
                    if b == b'\r' || b == b'\n' {
                        self.state = ScanState::Token;
                    }
                }
            }
        }
    }

    /// Signal end-of-source, emitting a trailing token that had no final
    /// line end.
    pub fn finish<S: FnMut(&str)>(&mut self, sink: &mut S) {
        if self.state == ScanState::Token {
            self.flush(sink);
        }
        self.state = ScanState::Token;
    }

    fn flush<S: FnMut(&str)>(&mut self, sink: &mut S) {
        if self.pending.is_empty() {
            return;
        }
        let token = String::from_utf8_lossy(&self.pending);
        let trimmed = token.trim();
        if !trimmed.is_empty() {
            sink(trimmed);
        }
        self.pending.clear();
    }
}

impl Default for ListScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_whole(input: &[u8]) -> Vec<String> {
        let mut scanner = ListScanner::new();
        let mut out = Vec::new();
        scanner.feed(input, &mut |t| out.push(t.to_string()));
        scanner.finish(&mut |t| out.push(t.to_string()));
        out
    }

    fn scan_split(input: &[u8], at: usize) -> Vec<String> {
        let mut scanner = ListScanner::new();
        let mut out = Vec::new();
        scanner.feed(&input[..at], &mut |t| out.push(t.to_string()));
        scanner.feed(&input[at..], &mut |t| out.push(t.to_string()));
        scanner.finish(&mut |t| out.push(t.to_string()));
        out
    }

    #[test]
    fn test_comments_and_whitespace() {
        let input = b"127.0.0.1 #localhost\n10.0.0.0/8\n# full comment\n";
        assert_eq!(scan_whole(input), vec!["127.0.0.1", "10.0.0.0/8"]);
    }

    #[test]
    fn test_any_split_point_gives_same_tokens() {
        let input = b"127.0.0.1 #localhost\r\n10.0.0.0/8\nexample.org # trailing\n\nlast";
        let expected = scan_whole(input);
        for at in 0..=input.len() {
            assert_eq!(scan_split(input, at), expected, "split at {}", at);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let input = b"a.example.com\nb.example.com # x\n# only comment\nc.example.com\n";
        let expected = scan_whole(input);
        let mut scanner = ListScanner::new();
        let mut out = Vec::new();
        for &b in input.iter() {
            scanner.feed(&[b], &mut |t| out.push(t.to_string()));
        }
        scanner.finish(&mut |t| out.push(t.to_string()));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_blank_and_whitespace_lines_dropped() {
        let input = b"\n\r\n   \n\ttoken\t \n";
        assert_eq!(scan_whole(input), vec!["token"]);
    }

    #[test]
    fn test_trailing_token_without_newline() {
        assert_eq!(scan_whole(b"one\ntwo"), vec!["one", "two"]);
    }

    #[test]
    fn test_comment_spanning_fragments() {
        let mut scanner = ListScanner::new();
        let mut out = Vec::new();
        scanner.feed(b"good # com", &mut |t| out.push(t.to_string()));
        scanner.feed(b"ment continues\nnext\n", &mut |t| out.push(t.to_string()));
        scanner.finish(&mut |t| out.push(t.to_string()));
        assert_eq!(out, vec!["good", "next"]);
    }
}
