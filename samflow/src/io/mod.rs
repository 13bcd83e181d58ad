//! Low-level I/O: the buffered line reader and the `/dev/stdin`/`/dev/stdout` path
//! adapter used by the CLI driver.

use std::io::{self, Stdin, Stdout};

pub mod line_reader;

pub use line_reader::LineReader;

use crate::error::{ConfigError, Error, Result};

/// Either a standard-stream or (reserved for future use) file-backed input.
pub enum Input {
    /// `/dev/stdin`.
    Stdin(Stdin),
}

/// Either a standard-stream or (reserved for future use) file-backed output.
pub enum Output {
    /// `/dev/stdout`.
    Stdout(Stdout),
}

impl io::Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Stdin(s) => s.read(buf),
        }
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(s) => s.flush(),
        }
    }
}

/// Opens `path` for reading. Only `/dev/stdin` is supported in this core.
pub fn open_input(path: &str) -> Result<Input> {
    if path == "/dev/stdin" {
        Ok(Input::Stdin(io::stdin()))
    } else {
        Err(Error::Config(ConfigError::UnsupportedPath(path.to_owned())))
    }
}

/// Opens `path` for writing. Only `/dev/stdout` is supported in this core.
pub fn open_output(path: &str) -> Result<Output> {
    if path == "/dev/stdout" {
        Ok(Output::Stdout(io::stdout()))
    } else {
        Err(Error::Config(ConfigError::UnsupportedPath(path.to_owned())))
    }
}
