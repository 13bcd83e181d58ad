//! Pipeline output sinks: an in-memory sink for the common small-input fast
//! path, and a streaming sink that writes SAM text as batches arrive.
//!
//! Grounded on `filter_pipeline.cpp`'s `sam_pipeline_output`/
//! `stream_pipeline_output`/`effective_sorting_order`.

use std::{
    cmp::Ordering,
    io::Write,
    sync::{Arc, Mutex},
};

use crate::{
    error::{ConfigError, Error, Result},
    header::Header,
    pipeline::{Batch, NodeKind, NodeSpec, Stage},
    record::{coordinate_less, queryname_less, Alignment},
};

/// The sort orders recognized by `--sorting-order`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Leave the input's declared order (and the records' order) untouched.
    Keep,
    /// No declared order.
    Unknown,
    /// Sort by resolved reference id, then position.
    Coordinate,
    /// Sort lexicographically by `QNAME`.
    Queryname,
    /// Explicitly declare the records unordered, without sorting them.
    Unsorted,
}

impl SortOrder {
    /// Parses a `--sorting-order` value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSortingOrder`] for any other string.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "keep" => Ok(Self::Keep),
            "unknown" => Ok(Self::Unknown),
            "coordinate" => Ok(Self::Coordinate),
            "queryname" => Ok(Self::Queryname),
            "unsorted" => Ok(Self::Unsorted),
            other => Err(Error::Config(ConfigError::UnknownSortingOrder(other.to_owned()))),
        }
    }

    fn as_header_value(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Unknown => "unknown",
            Self::Coordinate => "coordinate",
            Self::Queryname => "queryname",
            Self::Unsorted => "unsorted",
        }
    }
}

/// Resolves the requested sort order against the header's original `SO`,
/// updating `header`'s `SO` in place. Returns [`SortOrder::Keep`] when the
/// header already declares the requested order, so the caller can skip an
/// unnecessary sort.
pub fn effective_sorting_order(requested: SortOrder, header: &mut Header, original: &str) -> SortOrder {
    let so = if requested == SortOrder::Keep {
        SortOrder::parse(original).unwrap_or(SortOrder::Unknown)
    } else {
        requested
    };

    let current = header.sort_order().to_owned();
    match so {
        SortOrder::Coordinate | SortOrder::Queryname => {
            if current == so.as_header_value() {
                return SortOrder::Keep;
            }
            header.set_sort_order(so.as_header_value());
        }
        SortOrder::Unknown | SortOrder::Unsorted => {
            if current != so.as_header_value() {
                header.set_sort_order(so.as_header_value());
            }
        }
        SortOrder::Keep => {}
    }
    so
}

fn cmp_by(less: impl Fn(&Alignment, &Alignment) -> bool, a: &Alignment, b: &Alignment) -> Ordering {
    if less(a, b) {
        Ordering::Less
    } else if less(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

/// An in-memory sink: holds the final header and alignments directly rather
/// than running them through the node pipeline.
///
/// Mirrors the original's fast path, taken when the ambient worker pool is
/// too small (`max_concurrency() <= 3`) for concurrent batching to pay off —
/// the caller decides when to prefer this over [`stream_output_nodes`].
pub struct MemorySink {
    /// The (possibly filter-mutated) SAM header.
    pub header: Header,
    /// The filtered, possibly sorted, alignments.
    pub records: Vec<Alignment>,
}

impl MemorySink {
    /// Wraps a header and its alignments as a sink.
    pub fn new(header: Header, records: Vec<Alignment>) -> Self {
        Self { header, records }
    }

    /// Sorts `records` in place per `order`; a no-op for
    /// [`SortOrder::Keep`]/[`SortOrder::Unknown`]/[`SortOrder::Unsorted`].
    pub fn sort(&mut self, order: SortOrder) {
        match order {
            SortOrder::Coordinate => self.records.sort_by(|a, b| cmp_by(coordinate_less, a, b)),
            SortOrder::Queryname => self.records.sort_by(|a, b| cmp_by(queryname_less, a, b)),
            SortOrder::Keep | SortOrder::Unknown | SortOrder::Unsorted => {}
        }
    }
}

/// Writes `header` as SAM text to `writer`.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<()> {
    write!(writer, "{header}").map_err(Error::Io)
}

/// Builds the pipeline stages that render filtered batches of records as SAM
/// text and write them to `writer`, in the concurrency discipline `order`
/// implies.
///
/// # Errors
///
/// Returns [`ConfigError::SortingOnStreamUnsupported`] for
/// [`SortOrder::Coordinate`]/[`SortOrder::Queryname`]: sorting a streamed
/// output would require buffering the whole file, which this sink does not
/// do (matching the original's explicit rejection in `stream_pipeline_output`).
pub fn stream_output_nodes<W>(writer: Arc<Mutex<W>>, order: SortOrder) -> Result<Vec<NodeSpec>>
where
    W: Write + Send + 'static,
{
    let kind = match order {
        SortOrder::Keep | SortOrder::Unknown => NodeKind::Ordered,
        SortOrder::Unsorted => NodeKind::Sequential,
        SortOrder::Coordinate | SortOrder::Queryname => {
            return Err(Error::Config(ConfigError::SortingOnStreamUnsupported));
        }
    };

    let to_text: Stage = Arc::new(|batch: Batch| {
        let records = batch.into_records()?;
        let mut text = String::new();
        for aln in &records {
            text.push_str(&aln.to_string());
            text.push('\n');
        }
        Ok(Batch::Text(text))
    });

    let sink = Arc::clone(&writer);
    let write_stage: Stage = Arc::new(move |batch: Batch| {
        let text = batch.into_text()?;
        let mut w = sink.lock().unwrap();
        w.write_all(text.as_bytes()).map_err(Error::Io)?;
        Ok(Batch::Text(String::new()))
    });

    Ok(vec![
        NodeSpec::new(NodeKind::Parallel, to_text),
        NodeSpec::new(kind, write_stage),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::Slice;

    fn rec(line: &str, refid: i32) -> Alignment {
        let mut aln = Alignment::parse(Slice::from(line)).unwrap();
        aln.set_refid(refid);
        aln
    }

    #[test]
    fn test_sort_order_parse_rejects_unknown_value() {
        assert!(SortOrder::parse("bogus").is_err());
        assert_eq!(SortOrder::parse("coordinate").unwrap(), SortOrder::Coordinate);
    }

    #[test]
    fn test_effective_sorting_order_keep_resolves_from_original() {
        let mut header = Header::default();
        let resolved = effective_sorting_order(SortOrder::Keep, &mut header, "queryname");
        assert_eq!(resolved, SortOrder::Queryname);
        assert_eq!(header.sort_order(), "queryname");
    }

    #[test]
    fn test_effective_sorting_order_matching_order_returns_keep() {
        let mut header = Header::default();
        header.set_sort_order("coordinate");
        let resolved = effective_sorting_order(SortOrder::Coordinate, &mut header, "coordinate");
        assert_eq!(resolved, SortOrder::Keep);
    }

    #[test]
    fn test_memory_sink_sorts_by_coordinate() {
        let mut sink = MemorySink::new(
            Header::default(),
            vec![
                rec("r1\t0\tchr2\t1\t0\t*\t*\t0\t0\t*\t*", 1),
                rec("r2\t0\tchr1\t5\t0\t*\t*\t0\t0\t*\t*", 0),
            ],
        );
        sink.sort(SortOrder::Coordinate);
        assert_eq!(sink.records[0].qname.as_str(), "r2");
        assert_eq!(sink.records[1].qname.as_str(), "r1");
    }

    #[test]
    fn test_stream_output_nodes_rejects_coordinate_sort() {
        let writer = Arc::new(Mutex::new(Vec::new()));
        assert!(stream_output_nodes(writer, SortOrder::Coordinate).is_err());
    }
}
