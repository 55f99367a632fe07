//! Error types for SRS profiling and writing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for SRS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SRS error types.
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

    /// No known container magic matched
    #[error("unsupported sample container: {}", .0.display())]
    UnsupportedContainer(PathBuf),

    /// The container structure contradicts itself
    #[error("malformed container: {0}")]
    Malformed(String),

    /// The sample holds no audio/video payload at all
    #[error("no track data found in {}", .0.display())]
    NoTracks(PathBuf),

    /// The file carries no SRSF descriptor where one belongs
    #[error("not an SRS file: {}", .0.display())]
    NotSrs(PathBuf),

    /// Operation cancelled through the host token
    #[error("operation cancelled")]
    Cancelled,
}
