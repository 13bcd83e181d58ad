//! The crate-wide error type.

use std::io;

use thiserror::Error;

/// A malformed SAM header or alignment line.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A mandatory tab-terminated field was missing its trailing tab.
    #[error("missing tabulator in SAM alignment line")]
    MissingTab,
    /// A header field was not of the form `TAG:VALUE`.
    #[error("invalid header field tag")]
    InvalidHeaderTag,
    /// A key appeared twice within the same header record.
    #[error("duplicate key {0:?} in a SAM header record")]
    DuplicateKey(String),
    /// The `@HD` line appeared somewhere other than the first header line.
    #[error("@HD line not in first line when parsing a SAM header")]
    MisplacedHd,
    /// A header line's three-byte record code did not match any known type.
    #[error("unknown SAM header record type code {0:?}")]
    UnknownRecordCode(String),
    /// A user-tag header line was missing its separating tab.
    #[error("header code not followed by a tab when parsing a SAM header")]
    MissingHeaderTab,
    /// An alignment optional field's tag was not exactly two bytes.
    #[error("invalid field tag in SAM alignment line")]
    InvalidFieldTag,
    /// An alignment optional field's type byte was missing or malformed.
    #[error("invalid field type in SAM alignment line")]
    InvalidFieldType,
    /// An alignment optional field declared an unrecognized type byte.
    #[error("unknown optional field type {0:?}")]
    UnknownFieldType(char),
    /// A `B`-typed optional field declared an unrecognized numeric element type.
    #[error("invalid numeric array element type {0:?}")]
    InvalidNumericArrayType(char),
    /// A `B`-typed optional field was missing its element-type prefix.
    #[error("missing entry in numeric array")]
    MissingNumericArrayType,
    /// A CIGAR string used an operation code outside the known set.
    #[error("unknown CIGAR operation {0:?}")]
    UnknownCigarOp(char),
    /// A `QUAL` string contained a byte outside the printable Phred range.
    #[error("invalid QUAL character")]
    InvalidQual,
    /// An integer field failed to parse as a decimal integer.
    #[error("invalid integer field: {0}")]
    InvalidInteger(String),
    /// A required `@SQ` record was missing its `SN` key.
    #[error("SN not found")]
    MissingSn,
    /// A required header record was missing its `ID` key.
    #[error("ID not found")]
    MissingId,
    /// An `@RG` record referenced by a filter was missing its mandatory `ID` key.
    #[error("missing mandatory ID entry in an @RG line in a SAM file header")]
    MissingReadGroupId,
}

/// An invalid run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `--sorting-order` named a value that is not one of the five known orders.
    #[error("unknown sorting order: {0}")]
    UnknownSortingOrder(String),
    /// A path other than `/dev/stdin`/`/dev/stdout` was given.
    #[error("filenames not supported yet: {0}")]
    UnsupportedPath(String),
    /// One of the explicitly unsupported elPrep flags was passed.
    #[error("{0} not supported")]
    UnsupportedOption(String),
    /// Sorting order was requested for a destination that cannot be sorted.
    #[error("sorting on files not supported")]
    SortingOnStreamUnsupported,
}

/// A failure internal to the pipeline runtime, never attributable to the input data.
#[derive(Error, Debug)]
pub enum InternalError {
    /// A worker task panicked or otherwise failed to reach a completed state.
    #[error("worker task did not reach the complete state: {0}")]
    WorkerFailed(String),
    /// A batch arrived at a stage carrying a payload of the wrong kind.
    #[error("unexpected batch value type in {0}")]
    UnexpectedBatchType(&'static str),
}

/// The crate-wide error type, covering every fatal condition a run can raise.
#[derive(Error, Debug)]
pub enum Error {
    /// A malformed SAM header or alignment line.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// An invalid run configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// An underlying stream read/write failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A failure internal to the pipeline runtime.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// A specialized [`Result`](std::result::Result) using [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;
