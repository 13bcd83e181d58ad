//! The SAM header: `@HD`, ordered `@SQ`/`@RG`/`@PG` records, `@CO` comments,
//! and arbitrary lowercase user-tag records.
//!
//! Grounded on `sam_types.cpp`'s `sam_header` class.

use std::fmt;

use indexmap::IndexMap;

use crate::{
    error::{Error, ParseError, Result},
    io::LineReader,
    scanner::Scanner,
    slice::Slice,
};

/// One `TAG:VALUE` record, preserving input order (used for `@SQ`/`@RG`/`@PG`
/// and user-tag lines).
pub type Record = IndexMap<String, String>;

/// The SAM file-format version this core writes to a fresh `@HD` line.
pub const FILE_FORMAT_VERSION: &str = "1.5";

/// A parsed SAM header.
#[derive(Clone, Debug, Default)]
pub struct Header {
    /// The `@HD` record, if any (or a freshly-created one carrying just `VN`).
    pub hd: Record,
    /// `@SQ` records, in file order.
    pub sq: Vec<Record>,
    /// `@RG` records, in file order.
    pub rg: Vec<Record>,
    /// `@PG` records, in file order.
    pub pg: Vec<Record>,
    /// `@CO` comment lines, verbatim (without the leading `@CO\t`/`@CO `).
    pub co: Vec<Slice>,
    /// Lowercase user-tag records, keyed by their three-byte code.
    pub user_records: IndexMap<String, Vec<Record>>,
}

impl Header {
    /// Reads header lines (those starting with `@`) off `reader` until the
    /// first non-header line, which is left unconsumed.
    pub fn read<R: std::io::Read>(reader: &mut LineReader<R>) -> Result<Self> {
        let mut header = Header {
            hd: default_hd(),
            sq: Vec::with_capacity(32),
            pg: Vec::with_capacity(2),
            ..Default::default()
        };

        let mut first = true;
        while !reader.eof()? {
            if reader.peek()? != b'@' {
                break;
            }
            let line = match reader.getline()? {
                Some(line) => line,
                None => break,
            };
            header.consume_line(line, first)?;
            first = false;
        }

        Ok(header)
    }

    fn consume_line(&mut self, line: Slice, first: bool) -> Result<()> {
        let text = line.as_str();
        if let Some(rest) = text.strip_prefix("@HD\t") {
            if !first {
                return Err(Error::Parse(ParseError::MisplacedHd));
            }
            self.hd = Scanner::new(Slice::from(rest)).parse_header_line()?;
        } else if let Some(rest) = text.strip_prefix("@SQ\t") {
            self.sq
                .push(Scanner::new(Slice::from(rest)).parse_header_line()?);
        } else if let Some(rest) = text.strip_prefix("@RG\t") {
            self.rg
                .push(Scanner::new(Slice::from(rest)).parse_header_line()?);
        } else if let Some(rest) = text.strip_prefix("@PG\t") {
            self.pg
                .push(Scanner::new(Slice::from(rest)).parse_header_line()?);
        } else if let Some(rest) = text.strip_prefix("@CO\t") {
            self.co.push(Slice::from(rest));
        } else if let Some(rest) = text.strip_prefix("@CO") {
            self.co.push(Slice::from(rest));
        } else if text.len() >= 3 {
            let code = &text[..3];
            if is_user_tag(code) {
                let rest = text[3..]
                    .strip_prefix('\t')
                    .ok_or(Error::Parse(ParseError::MissingHeaderTab))?;
                let record = Scanner::new(Slice::from(rest)).parse_header_line()?;
                self.user_records
                    .entry(code.to_owned())
                    .or_default()
                    .push(record);
            } else {
                return Err(Error::Parse(ParseError::UnknownRecordCode(code.to_owned())));
            }
        } else {
            return Err(Error::Parse(ParseError::UnknownRecordCode(text.to_owned())));
        }
        Ok(())
    }

    /// The effective `@HD` sort order (`SO`), or `"unknown"` if unset.
    pub fn sort_order(&self) -> &str {
        self.hd.get("SO").map(String::as_str).unwrap_or("unknown")
    }

    /// Sets `SO`, clearing any conflicting `GO` (a file can declare only one of
    /// the two grouping keys at a time).
    pub fn set_sort_order(&mut self, value: impl Into<String>) {
        self.hd.shift_remove("GO");
        self.hd.insert("SO".to_owned(), value.into());
    }

    /// The effective `@HD` group order (`GO`), or `"unknown"` if unset.
    pub fn group_order(&self) -> &str {
        self.hd.get("GO").map(String::as_str).unwrap_or("unknown")
    }

    /// Sets `GO`, clearing any conflicting `SO`.
    pub fn set_group_order(&mut self, value: impl Into<String>) {
        self.hd.shift_remove("SO");
        self.hd.insert("GO".to_owned(), value.into());
    }

    /// The reference sequence length declared by an `@SQ` record's `LN` key,
    /// or `i32::MAX` if absent (matching the original's "unbounded" sentinel).
    pub fn sq_length(record: &Record) -> Result<i32> {
        match record.get("LN") {
            Some(v) => crate::scanner::parse_i32(v),
            None => Ok(i32::MAX),
        }
    }

    /// Looks up an `@RG` record by its `ID` key.
    pub fn read_group(&self, id: &str) -> Option<&Record> {
        self.rg.iter().find(|r| r.get("ID").map(String::as_str) == Some(id))
    }

    /// Appends a `record` under a lowercase three-byte user-tag `code`.
    pub fn add_user_record(&mut self, code: impl Into<String>, record: Record) {
        self.user_records.entry(code.into()).or_default().push(record);
    }
}

fn default_hd() -> Record {
    let mut hd = Record::with_capacity(1);
    hd.insert("VN".to_owned(), FILE_FORMAT_VERSION.to_owned());
    hd
}

fn is_user_tag(code: &str) -> bool {
    code.chars().any(|c| c.is_ascii_lowercase())
}

fn format_record(f: &mut fmt::Formatter<'_>, code: &str, record: &Record) -> fmt::Result {
    write!(f, "{code}")?;
    for (tag, value) in record {
        write!(f, "\t{tag}:{value}")?;
    }
    writeln!(f)
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.hd.is_empty() {
            format_record(f, "@HD", &self.hd)?;
        }
        for record in &self.sq {
            format_record(f, "@SQ", record)?;
        }
        for record in &self.rg {
            format_record(f, "@RG", record)?;
        }
        for record in &self.pg {
            format_record(f, "@PG", record)?;
        }
        for comment in &self.co {
            writeln!(f, "@CO\t{comment}")?;
        }
        for (code, records) in &self.user_records {
            for record in records {
                format_record(f, code, record)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_header_stops_at_first_alignment() {
        let data = b"@HD\tVN:1.5\tSO:coordinate\n@SQ\tSN:chr1\tLN:1000\nr1\t0\tchr1\t1\t0\t*\t*\t0\t0\t*\t*\n";
        let mut reader = LineReader::new(Cursor::new(data.to_vec()));
        let header = Header::read(&mut reader).unwrap();

        assert_eq!(header.sort_order(), "coordinate");
        assert_eq!(header.sq.len(), 1);
        assert_eq!(header.sq[0].get("SN").map(String::as_str), Some("chr1"));

        let next = reader.getline().unwrap().unwrap();
        assert!(next.as_str().starts_with("r1\t"));
    }

    #[test]
    fn test_hd_must_be_first() {
        let data = b"@SQ\tSN:chr1\tLN:1000\n@HD\tVN:1.5\n";
        let mut reader = LineReader::new(Cursor::new(data.to_vec()));
        assert!(Header::read(&mut reader).is_err());
    }

    #[test]
    fn test_user_tag_record() {
        let data = b"@zc\tfoo:bar\n";
        let mut reader = LineReader::new(Cursor::new(data.to_vec()));
        let header = Header::read(&mut reader).unwrap();
        assert_eq!(
            header
                .user_records
                .get("@zc")
                .and_then(|v| v.first())
                .and_then(|r| r.get("foo"))
                .map(String::as_str),
            Some("bar")
        );
    }

    #[test]
    fn test_set_sort_order_clears_group_order() {
        let mut header = Header::default();
        header.set_group_order("query");
        header.set_sort_order("coordinate");
        assert_eq!(header.sort_order(), "coordinate");
        assert_eq!(header.group_order(), "unknown");
    }
}
