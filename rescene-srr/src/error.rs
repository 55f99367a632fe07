//! Error types for SRR creation and reconstruction.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for SRR operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SRR error types.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte-level codec error
    #[error(transparent)]
    Codec(#[from] rescene_core::Error),

    /// An input file does not exist
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file does not start with a RAR4 or RAR5 marker
    #[error("not a RAR archive: {}", .0.display())]
    NotRar(PathBuf),

    /// The file does not start with an SRR header block
    #[error("not an SRR file: {}", .0.display())]
    NotSrr(PathBuf),

    /// A block header declared an impossible size
    #[error("malformed block header at offset {offset}: declared size {size}")]
    MalformedHeader { offset: u64, size: u64 },

    /// No source file could be located for an archived file
    #[error("no source found for archived file {0:?}")]
    SourceNotFound(String),

    /// A source file ran out before the declared packed size was copied
    #[error("source {name:?} exhausted with {missing} bytes left to splice")]
    SourceExhausted { name: String, missing: u64 },

    /// Operation cancelled through the host token
    #[error("operation cancelled")]
    Cancelled,
}
