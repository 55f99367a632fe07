//! SRS: container-isomorphic mirrors of media samples.
//!
//! An SRS file copies every non-payload byte of a sample's container
//! (AVI, MKV, MP4, WMV, FLAC, MP3, or a raw stream) and replaces the
//! audio/video payload with one compact descriptor per track: its total
//! length, a match offset, and the first 256 payload bytes as a signature.
//! The whole-sample CRC32 and size travel in the file descriptor.
//!
//! The operations are [`detect_container`], [`create_srs`], and
//! [`SrsInfo::read`].

pub mod avi;
mod error;
pub mod flac;
mod format;
mod info;
pub mod mkv;
pub mod mp3;
pub mod mp4;
pub mod record;
pub mod stream;
pub mod track;
pub mod wmv;
mod writer;

pub use error::{Error, Result};
pub use format::{ContainerType, detect_bytes, detect_container};
pub use info::SrsInfo;
pub use record::BIG_FILE_THRESHOLD;
pub use track::{FileData, Profile, ProfileBuilder, TrackData, SIGNATURE_LEN};
pub use writer::{CreateSrsOutcome, DEFAULT_APP_NAME, SrsOptions, create_srs};
