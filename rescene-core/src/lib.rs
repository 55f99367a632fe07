//! Shared primitives for the rescene crates.
//!
//! Everything here operates on plain bytes: a bounded slice reader, EBML
//! variable-length integer codecs, a streaming CRC32 accumulator, and the
//! progress/cancellation plumbing that the SRR and SRS operations thread
//! through their inner loops.

mod cancel;
mod crc32;
pub mod ebml;
mod error;
mod progress;
mod region;

pub use cancel::CancelToken;
pub use crc32::Crc32;
pub use error::Error;
pub use progress::{NullSink, Progress, ProgressSink};
pub use region::Region;

pub type Result<T> = std::result::Result<T, Error>;
