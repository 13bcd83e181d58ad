//! The alignment record: the eleven mandatory SAM columns plus an open list of
//! optional `TAG:TYPE:VALUE` fields, and a second list of filter-private
//! temporary fields that never get written back out.
//!
//! Grounded on `sam_types.cpp`'s `sam_alignment`/`coordinate_less`/`queryname_less`.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bitflags::bitflags;

use crate::{
    error::Result,
    scanner::Scanner,
    slice::Slice,
    value::Value,
};

bitflags! {
    /// The SAM `FLAG` column, one bit per bit.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flags: u16 {
        /// Template has multiple segments.
        const MULTIPLE = 0x1;
        /// Each segment properly aligned.
        const PROPER = 0x2;
        /// Segment unmapped.
        const UNMAPPED = 0x4;
        /// Next segment unmapped.
        const NEXT_UNMAPPED = 0x8;
        /// Segment reverse-complemented.
        const REVERSED = 0x10;
        /// Next segment reverse-complemented.
        const NEXT_REVERSED = 0x20;
        /// First segment in the template.
        const FIRST = 0x40;
        /// Last segment in the template.
        const LAST = 0x80;
        /// Secondary alignment.
        const SECONDARY = 0x100;
        /// Not passing filters.
        const QC_FAILED = 0x200;
        /// PCR or optical duplicate.
        const DUPLICATE = 0x400;
        /// Supplementary alignment.
        const SUPPLEMENTARY = 0x800;
    }
}

/// A single SAM alignment line: the mandatory fields, the optional fields read
/// from the line, and a side channel of temporary per-run fields (`REFID`,
/// `LIBID`) never written back out.
#[derive(Clone, Debug)]
pub struct Alignment {
    /// QNAME.
    pub qname: Slice,
    /// FLAG.
    pub flag: Flags,
    /// RNAME.
    pub rname: Slice,
    /// POS (1-based; 0 means unavailable).
    pub pos: i32,
    /// MAPQ.
    pub mapq: u8,
    /// CIGAR.
    pub cigar: Slice,
    /// RNEXT.
    pub rnext: Slice,
    /// PNEXT.
    pub pnext: i32,
    /// TLEN.
    pub tlen: i32,
    /// SEQ.
    pub seq: Slice,
    /// QUAL.
    pub qual: Slice,
    /// Optional fields parsed from the line, written back out in order.
    pub tags: Vec<(Slice, Value)>,
    /// Filter-private scratch fields (e.g. resolved `REFID`, `LIBID`), never
    /// rendered to output.
    pub temps: Vec<(Slice, Value)>,
    /// Set by the duplicate-marking engine. Kept out of `flag` and behind an
    /// `Arc` so that marking a *different*, already-batched clone of the
    /// winning candidate as a duplicate is visible through every clone that
    /// shares this record's identity, without needing to mutate the batch
    /// that clone lives in.
    dup: Arc<AtomicBool>,
}

impl Alignment {
    /// Parses one alignment line.
    pub fn parse(line: Slice) -> Result<Self> {
        let mut sc = Scanner::new(line);

        let qname = sc.do_string()?;
        let flag = Flags::from_bits_truncate(sc.do_int()? as u16);
        let rname = sc.do_string()?;
        let pos = sc.do_int()?;
        let mapq = sc.do_int()? as u8;
        let cigar = sc.do_string()?;
        let rnext = sc.do_string()?;
        let pnext = sc.do_int()?;
        let tlen = sc.do_int()?;
        let seq = sc.do_string()?;
        let qual = sc.read_until('\t');

        let mut tags = Vec::with_capacity(16);
        while sc.remaining() > 0 {
            tags.push(parse_optional_field(&mut sc)?);
        }

        Ok(Self {
            qname,
            flag,
            rname,
            pos,
            mapq,
            cigar,
            rnext,
            pnext,
            tlen,
            seq,
            qual,
            tags,
            temps: Vec::with_capacity(2),
            dup: Arc::new(AtomicBool::new(false)),
        })
    }

    /// `true` iff this record has been marked a duplicate, either on the
    /// input line's `FLAG` or by the duplicate-marking engine.
    pub fn is_duplicate(&self) -> bool {
        self.flag.contains(Flags::DUPLICATE) || self.dup.load(Ordering::Relaxed)
    }

    /// Marks this record (and every clone sharing its identity) a duplicate.
    pub fn mark_duplicate(&self) {
        self.dup.store(true, Ordering::Relaxed);
    }

    /// The `FLAG` value as it should be written to output, folding in any
    /// duplicate mark set after parsing.
    pub fn effective_flag(&self) -> Flags {
        if self.is_duplicate() {
            self.flag | Flags::DUPLICATE
        } else {
            self.flag
        }
    }

    /// Looks up a tag's value among the parsed optional fields.
    pub fn tag(&self, tag: &str) -> Option<&Value> {
        self.tags.iter().find(|(t, _)| t.as_str() == tag).map(|(_, v)| v)
    }

    /// Inserts or overwrites a tag's value.
    pub fn set_tag(&mut self, tag: &str, value: Value) {
        if let Some(entry) = self.tags.iter_mut().find(|(t, _)| t.as_str() == tag) {
            entry.1 = value;
        } else {
            self.tags.push((Slice::from(tag), value));
        }
    }

    /// Looks up a temporary (non-output) field.
    pub fn temp(&self, tag: &str) -> Option<&Value> {
        self.temps.iter().find(|(t, _)| t.as_str() == tag).map(|(_, v)| v)
    }

    /// Inserts or overwrites a temporary field.
    pub fn set_temp(&mut self, tag: &str, value: Value) {
        if let Some(entry) = self.temps.iter_mut().find(|(t, _)| t.as_str() == tag) {
            entry.1 = value;
        } else {
            self.temps.push((Slice::from(tag), value));
        }
    }

    /// `RG` tag, if present.
    pub fn read_group(&self) -> Option<&Slice> {
        match self.tag("RG") {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The resolved reference id, set by the pipeline once the header's `@SQ`
    /// order is known.
    pub fn refid(&self) -> Option<i32> {
        match self.temp("REFID") {
            Some(Value::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Sets the resolved reference id.
    pub fn set_refid(&mut self, refid: i32) {
        self.set_temp("REFID", Value::Int(refid));
    }

    /// The resolved library id, set by the duplicate-marking engine.
    pub fn libid(&self) -> Option<&Slice> {
        match self.temp("LIBID") {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Sets the resolved library id.
    pub fn set_libid(&mut self, libid: Slice) {
        self.set_temp("LIBID", Value::Str(libid));
    }

    /// `true` iff every bit in `flags` is set.
    pub fn flag_every(&self, flags: Flags) -> bool {
        self.flag.contains(flags)
    }

    /// `true` iff at least one bit in `flags` is set.
    pub fn flag_some(&self, flags: Flags) -> bool {
        self.flag.intersects(flags)
    }

    /// `true` iff no bit in `flags` is set.
    pub fn flag_not_any(&self, flags: Flags) -> bool {
        !self.flag_some(flags)
    }
}

fn parse_optional_field(sc: &mut Scanner) -> Result<(Slice, Value)> {
    let tag = sc.read_until(':');
    if tag.len() != 2 {
        return Err(crate::error::Error::Parse(
            crate::error::ParseError::InvalidFieldTag,
        ));
    }
    let (typebyte, found_colon) = sc.read_char_until(':')?;
    if !found_colon {
        return Err(crate::error::Error::Parse(
            crate::error::ParseError::InvalidFieldType,
        ));
    }
    let value = Value::parse(typebyte, sc)?;
    Ok((tag, value))
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.qname,
            self.effective_flag().bits(),
            self.rname,
            self.pos,
            self.mapq,
            self.cigar,
            self.rnext,
            self.pnext,
            self.tlen,
            self.seq,
            self.qual,
        )?;
        for (tag, value) in &self.tags {
            write!(f, "\t{tag}:")?;
            format_value(f, value)?;
        }
        Ok(())
    }
}

fn format_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Char(c) => write!(f, "A:{c}"),
        Value::Int(v) => write!(f, "i:{v}"),
        Value::Float(v) => write!(f, "f:{v}"),
        Value::Str(s) => write!(f, "Z:{s}"),
        Value::Hex(bytes) => {
            write!(f, "H:")?;
            for b in bytes {
                write!(f, "{b:02X}")?;
            }
            Ok(())
        }
        Value::Int8Array(v) => format_numeric_array(f, 'c', v),
        Value::UInt8Array(v) => format_numeric_array(f, 'C', v),
        Value::Int16Array(v) => format_numeric_array(f, 's', v),
        Value::UInt16Array(v) => format_numeric_array(f, 'S', v),
        Value::Int32Array(v) => format_numeric_array(f, 'i', v),
        Value::UInt32Array(v) => format_numeric_array(f, 'I', v),
        Value::FloatArray(v) => format_numeric_array(f, 'f', v),
    }
}

fn format_numeric_array<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    code: char,
    values: &[T],
) -> fmt::Result {
    write!(f, "B:{code}")?;
    for v in values {
        write!(f, ",{v}")?;
    }
    Ok(())
}

/// Coordinate order: unmapped reads (negative resolved refid) sort last;
/// among mapped reads, lower refid then lower position sorts first.
pub fn coordinate_less(a: &Alignment, b: &Alignment) -> bool {
    let refid_a = a.refid().unwrap_or(-1);
    let refid_b = b.refid().unwrap_or(-1);
    if refid_a != refid_b {
        if refid_a < refid_b {
            refid_a >= 0
        } else {
            refid_b < 0
        }
    } else {
        a.pos < b.pos
    }
}

/// Query-name order: lexicographic comparison of QNAME.
pub fn queryname_less(a: &Alignment, b: &Alignment) -> bool {
    a.qname < b.qname
}
