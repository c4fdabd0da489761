//! Error types for riffix

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for riffix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for riffix
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be opened or created
    #[error("Error opening file {}: {source}", .path.display())]
    IoOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the input failed (distinct from a clean end of stream)
    #[error("Error reading file: {0}")]
    IoRead(#[source] io::Error),

    /// Writing failed, possibly after part of the output was already written
    #[error("Error writing file: {0}")]
    IoWrite(#[source] io::Error),

    /// Repositioning the stream failed
    #[error("Error seeking in file: {0}")]
    IoSeek(#[source] io::Error),

    /// A working buffer could not be allocated
    #[error("Cannot allocate {0} bytes of working buffer")]
    Allocation(usize),

    /// Bad RIFF signature, form type or truncated container header
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// The wanted subchunk is not in the stream
    #[error("Chunk '{}' not found", String::from_utf8_lossy(.0))]
    ChunkNotFound([u8; 4]),

    /// The fmt chunk does not describe the vendor IMA ADPCM variant
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The stream ended before the declared length
    #[error("Unexpected end of data: expected {expected} bytes, got {actual}")]
    UnexpectedEndOfData { expected: u64, actual: u64 },

    /// A fault hit after the file was already partly converted in place
    #[error("File left partially rewritten: {0}")]
    PartiallyRewritten(#[source] Box<Error>),

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a malformed container error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedContainer(msg.into())
    }

    /// Create an unsupported format error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedFormat(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Marks a fault raised once in-place mutation has started.
    pub fn partially_rewritten(self) -> Self {
        match self {
            Error::PartiallyRewritten(_) => self,
            other => Error::PartiallyRewritten(Box::new(other)),
        }
    }

    /// A failed write, or any fault after the first write, may leave the
    /// file half converted. The run must not carry on after one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::IoWrite(_) | Error::PartiallyRewritten(_))
    }
}
