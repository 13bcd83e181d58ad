//! Batch producers: the front end of the pipeline that hands off fixed-size
//! chunks of work to the first stage.
//!
//! Grounded on `source.cpp`'s `source`/`deque_source`/`istream_source`.

use std::collections::VecDeque;

use crate::{error::Result, io::LineReader, slice::Slice};

/// A batch producer. `prepare` reports the total amount of work up front (or
/// a negative number if that is unknown, e.g. reading from a stream), and
/// `fetch` hands off up to `n` items at a time until the source is drained.
pub trait Source {
    /// The type of item this source hands off.
    type Item;

    /// Returns the total number of items this source will ever produce, or a
    /// negative number if that count cannot be known up front.
    fn prepare(&mut self) -> i64;

    /// Removes and returns up to `n` items, or `None` once exhausted.
    fn fetch(&mut self, n: usize) -> Result<Option<Vec<Self::Item>>>;
}

/// A source that drains a pre-loaded, in-memory queue.
pub struct VecSource<T> {
    items: VecDeque<T>,
}

impl<T> VecSource<T> {
    /// Wraps `items` for batch-wise draining.
    pub fn new(items: VecDeque<T>) -> Self {
        Self { items }
    }
}

impl<T> Source for VecSource<T> {
    type Item = T;

    fn prepare(&mut self) -> i64 {
        self.items.len() as i64
    }

    fn fetch(&mut self, n: usize) -> Result<Option<Vec<T>>> {
        let take = n.min(self.items.len());
        if take == 0 {
            return Ok(None);
        }
        Ok(Some(self.items.drain(..take).collect()))
    }
}

/// A source that reads lines off a buffered stream, of unknown total length.
pub struct LineSource<R> {
    reader: LineReader<R>,
}

impl<R: std::io::Read> LineSource<R> {
    /// Wraps `reader` as a line-batch source.
    pub fn new(reader: LineReader<R>) -> Self {
        Self { reader }
    }

    /// Returns the wrapped reader, e.g. once the header has been consumed and
    /// the rest of the stream is handed off to the pipeline.
    pub fn reader_mut(&mut self) -> &mut LineReader<R> {
        &mut self.reader
    }
}

impl<R: std::io::Read> Source for LineSource<R> {
    type Item = Slice;

    fn prepare(&mut self) -> i64 {
        -1
    }

    fn fetch(&mut self, n: usize) -> Result<Option<Vec<Slice>>> {
        let mut result = Vec::with_capacity(n);
        for _ in 0..n {
            match self.reader.getline()? {
                Some(line) => result.push(line),
                None => break,
            }
        }
        if result.is_empty() {
            Ok(None)
        } else {
            Ok(Some(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_vec_source_drains_in_batches() {
        let mut src = VecSource::new(VecDeque::from(vec![1, 2, 3, 4, 5]));
        assert_eq!(src.prepare(), 5);
        assert_eq!(src.fetch(2).unwrap(), Some(vec![1, 2]));
        assert_eq!(src.fetch(2).unwrap(), Some(vec![3, 4]));
        assert_eq!(src.fetch(2).unwrap(), Some(vec![5]));
        assert_eq!(src.fetch(2).unwrap(), None);
    }

    #[test]
    fn test_line_source_unknown_size() {
        let mut src = LineSource::new(LineReader::new(Cursor::new(b"a\nb\nc\n".to_vec())));
        assert_eq!(src.prepare(), -1);
        let batch = src.fetch(2).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        let rest = src.fetch(2).unwrap().unwrap();
        assert_eq!(rest.len(), 1);
        assert!(src.fetch(2).unwrap().is_none());
    }
}
