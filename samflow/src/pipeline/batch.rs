//! The payload that flows between pipeline stages.
//!
//! The original pipeline carries an `any`-typed payload between stages,
//! downcast by each receiver to whichever concrete type it expects (a deque of
//! raw lines, of parsed alignments, or a rendered chunk of output text). A
//! closed enum expresses the same small set of payload kinds without runtime
//! type erasure.

use crate::{
    error::{Error, InternalError, Result},
    record::Alignment,
    slice::Slice,
};

/// One chunk of work as it moves through the pipeline.
#[derive(Debug)]
pub enum Batch {
    /// Raw, unparsed input lines (the initial payload read from a stream).
    Lines(Vec<Slice>),
    /// Parsed alignment records.
    Records(Vec<Alignment>),
    /// Rendered output text, ready to be written out verbatim.
    Text(String),
}

impl Batch {
    /// The number of items in this batch, for dynamic batch-size accounting.
    pub fn len(&self) -> usize {
        match self {
            Batch::Lines(v) => v.len(),
            Batch::Records(v) => v.len(),
            Batch::Text(_) => 1,
        }
    }

    /// `true` iff this batch carries no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwraps a [`Batch::Lines`], or reports [`InternalError::UnexpectedBatchType`]
    /// (mirrors the original's `bad_any_cast` thrown from a mismatched
    /// `any_cast`).
    pub fn into_lines(self) -> Result<Vec<Slice>> {
        match self {
            Batch::Lines(v) => Ok(v),
            _ => Err(Error::Internal(InternalError::UnexpectedBatchType("lines"))),
        }
    }

    /// Unwraps a [`Batch::Records`].
    pub fn into_records(self) -> Result<Vec<Alignment>> {
        match self {
            Batch::Records(v) => Ok(v),
            _ => Err(Error::Internal(InternalError::UnexpectedBatchType("records"))),
        }
    }

    /// Unwraps a [`Batch::Text`].
    pub fn into_text(self) -> Result<String> {
        match self {
            Batch::Text(v) => Ok(v),
            _ => Err(Error::Internal(InternalError::UnexpectedBatchType("text"))),
        }
    }
}
