//! A buffered, line-oriented reader that hands out zero-copy [`Slice`]s.
//!
//! Grounded on the original `istream_wrapper`: a single fixed-size buffer is refilled
//! in place once fully consumed, compacting the unread tail forward first. A line
//! that would not fit the buffer at all is a fatal I/O error rather than a silent
//! truncation.

use std::io::Read;

use crate::{
    error::{Error, Result},
    slice::Slice,
};

/// Buffer size in bytes. A line (including its optional fields) longer than this is
/// rejected with a fatal error.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// A buffered reader over an arbitrary byte stream that yields [`Slice`]-typed lines.
pub struct LineReader<R> {
    input: R,
    buffer: Vec<u8>,
    index: usize,
    filled: usize,
    reached_eof: bool,
}

impl<R: Read> LineReader<R> {
    /// Wraps `input` in a line reader with a fresh internal buffer.
    pub fn new(input: R) -> Self {
        Self {
            input,
            buffer: vec![0; BUFFER_SIZE],
            index: 0,
            filled: 0,
            reached_eof: false,
        }
    }

    /// Compacts the unread tail to the front of the buffer and reads as much as a
    /// single `read` call returns into the freed space. A `read` of zero marks the
    /// underlying stream as exhausted; it does not by itself mean the buffer is
    /// empty, since a previously-compacted tail may still hold unread bytes.
    fn fill(&mut self) -> Result<()> {
        let rest = self.filled - self.index;
        self.buffer.copy_within(self.index..self.filled, 0);
        self.index = 0;
        self.filled = rest;

        let n = self.input.read(&mut self.buffer[self.filled..])?;
        self.filled += n;
        if n == 0 {
            self.reached_eof = true;
        }

        Ok(())
    }

    /// Returns `true` iff there is no more data to read (buffer empty and stream
    /// exhausted).
    pub fn eof(&mut self) -> Result<bool> {
        if self.index < self.filled {
            return Ok(false);
        }
        self.fill()?;
        Ok(self.index >= self.filled)
    }

    /// Returns the next byte without consuming it.
    ///
    /// # Errors
    ///
    /// Returns an error if called after the stream is exhausted.
    pub fn peek(&mut self) -> Result<u8> {
        if self.index < self.filled {
            return Ok(self.buffer[self.index]);
        }
        self.fill()?;
        if self.index < self.filled {
            Ok(self.buffer[self.index])
        } else {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peek after eof",
            )))
        }
    }

    fn find_newline(&self) -> Option<usize> {
        memchr::memchr(b'\n', &self.buffer[self.index..self.filled]).map(|p| self.index + p)
    }

    /// Reads the next LF-terminated line, excluding the terminator, as a [`Slice]`.
    ///
    /// Returns `Ok(None)` once the stream is exhausted with no further data. A final
    /// unterminated line at true end-of-stream is still returned. Keeps refilling
    /// until either a newline turns up, the stream is exhausted, or the buffer fills
    /// up entirely without one (a fatal "buffer too small" condition).
    pub fn getline(&mut self) -> Result<Option<Slice>> {
        loop {
            if let Some(end) = self.find_newline() {
                let line = self.make_slice(self.index, end);
                self.index = end + 1;
                return Ok(Some(line));
            }

            if self.reached_eof {
                return if self.index < self.filled {
                    let line = self.make_slice(self.index, self.filled);
                    self.index = self.filled;
                    Ok(Some(line))
                } else {
                    Ok(None)
                };
            }

            if self.filled - self.index == self.buffer.len() {
                return Err(Error::Io(std::io::Error::other(
                    "line exceeds buffer size: buffer too small",
                )));
            }

            self.fill()?;
        }
    }

    /// Discards the next line without materializing a [`Slice`] for it.
    pub fn skipline(&mut self) -> Result<()> {
        self.getline().map(|_| ())
    }

    fn make_slice(&self, start: usize, end: usize) -> Slice {
        let text = std::str::from_utf8(&self.buffer[start..end]).unwrap_or_default();
        Slice::from(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_getline_splits_on_lf() {
        let mut r = LineReader::new(Cursor::new(b"a\nbb\nccc".to_vec()));
        assert_eq!(r.getline().unwrap().unwrap().as_str(), "a");
        assert_eq!(r.getline().unwrap().unwrap().as_str(), "bb");
        assert_eq!(r.getline().unwrap().unwrap().as_str(), "ccc");
        assert!(r.getline().unwrap().is_none());
    }

    #[test]
    fn test_eof_and_peek() {
        let mut r = LineReader::new(Cursor::new(b"x\n".to_vec()));
        assert!(!r.eof().unwrap());
        assert_eq!(r.peek().unwrap(), b'x');
        r.skipline().unwrap();
        assert!(r.eof().unwrap());
        assert!(r.peek().is_err());
    }

    #[test]
    fn test_line_longer_than_buffer_is_fatal() {
        let long = vec![b'a'; BUFFER_SIZE + 16];
        let mut r = LineReader::new(Cursor::new(long));
        assert!(r.getline().is_err());
    }
}
