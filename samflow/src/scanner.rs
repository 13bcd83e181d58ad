//! A cursor over one line's [`Slice`] that peels off fields left to right.
//!
//! Grounded on the original `string_scanner`: every alignment and header field is a
//! forward scan to the next delimiter, never a backtrack.

use indexmap::IndexMap;

use crate::{
    error::{Error, ParseError, Result},
    slice::Slice,
};

/// A forward-only cursor over a single line.
pub struct Scanner {
    line: Slice,
    index: usize,
}

impl Scanner {
    /// Creates a scanner positioned at the start of `line`.
    pub fn new(line: Slice) -> Self {
        Self { line, index: 0 }
    }

    /// Returns the number of unconsumed bytes.
    pub fn remaining(&self) -> usize {
        self.line.len() - self.index
    }

    fn tail(&self) -> &str {
        &self.line.as_str()[self.index..]
    }

    /// Reads up to (and consuming) the next occurrence of `delim`, or the rest of
    /// the line if `delim` does not occur.
    pub fn read_until(&mut self, delim: char) -> Slice {
        let tail = self.tail();
        match tail.find(delim) {
            Some(pos) => {
                let slice = self.line.subslice(self.index, pos);
                self.index += pos + delim.len_utf8();
                slice
            }
            None => {
                let slice = self.line.subslice(self.index, tail.len());
                self.index = self.line.len();
                slice
            }
        }
    }

    /// Reads up to the next occurrence of either `c1` or `c2`, returning which one
    /// was found (`None` if the line ran out first).
    pub fn read_until_either(&mut self, c1: char, c2: char) -> (Slice, Option<char>) {
        let tail = self.tail();
        let found = tail
            .char_indices()
            .find(|&(_, c)| c == c1 || c == c2)
            .map(|(pos, c)| (pos, c));
        match found {
            Some((pos, c)) => {
                let slice = self.line.subslice(self.index, pos);
                self.index += pos + c.len_utf8();
                (slice, Some(c))
            }
            None => {
                let slice = self.line.subslice(self.index, tail.len());
                self.index = self.line.len();
                (slice, None)
            }
        }
    }

    /// Reads a single byte, requiring it to be immediately followed by `delim`
    /// (consumed) unless it is also the last byte of the line.
    pub fn read_char_until(&mut self, delim: char) -> Result<(char, bool)> {
        let tail = self.tail();
        let mut chars = tail.chars();
        let c = chars
            .next()
            .ok_or(Error::Parse(ParseError::InvalidFieldType))?;
        self.index += c.len_utf8();
        if self.index >= self.line.len() {
            return Ok((c, false));
        }
        let next = self.tail().chars().next();
        if next == Some(delim) {
            self.index += delim.len_utf8();
            Ok((c, true))
        } else {
            Err(Error::Parse(ParseError::InvalidFieldType))
        }
    }

    /// Reads up to a tab, failing if the line contains no further tab.
    pub fn do_string(&mut self) -> Result<Slice> {
        let tail = self.tail();
        match tail.find('\t') {
            Some(pos) => {
                let slice = self.line.subslice(self.index, pos);
                self.index += pos + 1;
                Ok(slice)
            }
            None => Err(Error::Parse(ParseError::MissingTab)),
        }
    }

    /// Reads up to a tab and parses the result as a signed decimal integer.
    pub fn do_int(&mut self) -> Result<i32> {
        let slice = self.do_string()?;
        parse_i32(slice.as_str())
    }

    /// Parses a `TAG:VALUE` field up to (and consuming) the next tab.
    pub fn parse_header_field(&mut self) -> Result<(Slice, Slice)> {
        let tag = self.read_until(':');
        if tag.is_empty() {
            return Err(Error::Parse(ParseError::InvalidHeaderTag));
        }
        let value = self.read_until('\t');
        Ok((tag, value))
    }

    /// Parses a `TAG:VALUE` field up to (and consuming) the next space, also
    /// skipping any further run of spaces — used for `--replace-read-group`
    /// strings given on the command line rather than read from a tab-delimited
    /// line.
    pub fn parse_header_field_from_string(&mut self) -> Result<(Slice, Slice)> {
        let tag = self.read_until(':');
        if tag.is_empty() {
            return Err(Error::Parse(ParseError::InvalidHeaderTag));
        }
        let value = self.read_until(' ');
        while self.remaining() > 0 && self.tail().starts_with(' ') {
            self.index += 1;
        }
        Ok((tag, value))
    }

    /// Parses a whole header line's tab-separated `TAG:VALUE` fields into an
    /// order-preserving map, rejecting duplicate tags.
    pub fn parse_header_line(&mut self) -> Result<IndexMap<String, String>> {
        let mut record = IndexMap::with_capacity(8);
        while self.remaining() > 0 {
            let (tag, value) = self.parse_header_field()?;
            insert_unique(&mut record, tag, value)?;
        }
        Ok(record)
    }

    /// Like [`Scanner::parse_header_line`], but fields are separated by spaces
    /// rather than tabs (the `--replace-read-group` command-line form).
    pub fn parse_header_line_from_string(&mut self) -> Result<IndexMap<String, String>> {
        let mut record = IndexMap::with_capacity(8);
        while self.remaining() > 0 {
            let (tag, value) = self.parse_header_field_from_string()?;
            insert_unique(&mut record, tag, value)?;
        }
        Ok(record)
    }
}

fn insert_unique(
    record: &mut IndexMap<String, String>,
    tag: Slice,
    value: Slice,
) -> Result<()> {
    let tag = tag.to_string();
    if record.contains_key(&tag) {
        return Err(Error::Parse(ParseError::DuplicateKey(tag)));
    }
    record.insert(tag, value.to_string());
    Ok(())
}

/// Parses a signed decimal integer, matching the C `atoi` tolerance of leading
/// whitespace and a leading sign but rejecting otherwise-malformed input.
pub fn parse_i32(s: &str) -> Result<i32> {
    lexical_core::parse(s.trim().as_bytes())
        .map_err(|_| Error::Parse(ParseError::InvalidInteger(s.to_owned())))
}

/// Parses a 32-bit float.
pub fn parse_f32(s: &str) -> Result<f32> {
    lexical_core::parse(s.trim().as_bytes())
        .map_err(|_| Error::Parse(ParseError::InvalidInteger(s.to_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_until() {
        let mut sc = Scanner::new(Slice::from("a:b:c"));
        assert_eq!(sc.read_until(':').as_str(), "a");
        assert_eq!(sc.read_until(':').as_str(), "b");
        assert_eq!(sc.read_until(':').as_str(), "c");
    }

    #[test]
    fn test_do_string_requires_tab() {
        let mut sc = Scanner::new(Slice::from("noTab"));
        assert!(sc.do_string().is_err());
    }

    #[test]
    fn test_parse_header_line_rejects_duplicates() {
        let mut sc = Scanner::new(Slice::from("VN:1.5\tVN:1.6"));
        assert!(sc.parse_header_line().is_err());
    }

    #[test]
    fn test_parse_header_line_from_string() {
        let mut sc = Scanner::new(Slice::from("ID:rg1 LB:lib1 SM:sample1"));
        let record = sc.parse_header_line_from_string().unwrap();
        assert_eq!(record.get("ID").map(String::as_str), Some("rg1"));
        assert_eq!(record.get("LB").map(String::as_str), Some("lib1"));
        assert_eq!(record.get("SM").map(String::as_str), Some("sample1"));
    }

    #[test]
    fn test_do_int() {
        let mut sc = Scanner::new(Slice::from("-42\t"));
        assert_eq!(sc.do_int().unwrap(), -42);
    }
}
