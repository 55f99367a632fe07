//! SRR: headers-only mirrors of RAR volume sets.
//!
//! An SRR file carries every RAR block header of a release's volumes
//! verbatim, plus embedded auxiliary files (NFO, SFV), while the compressed
//! file payloads are dropped. Given the original files, the exact volumes
//! can be reconstructed byte for byte.
//!
//! The three operations are [`create_srr`] (and [`create_srr_from_sfv`]),
//! [`SrrInfo::read`], and [`reconstruct`].

pub mod block;
mod error;
pub mod hash;
mod info;
pub mod oso;
pub mod rar4;
pub mod rar5;
mod reader;
mod reconstruct;
pub mod scanner;
pub mod volume;
mod writer;

pub use error::{Error, Result};
pub use hash::HashKind;
pub use info::{ArchivedFile, OsoHashEntry, SrrInfo};
pub use reader::{SrrEntry, SrrReader};
pub use reconstruct::{ReconstructOptions, reconstruct};
pub use scanner::{RarScanner, RarVersion, ScannedBlock};
pub use volume::{compare_volume_names, is_volume_name, read_sfv};
pub use writer::{
    CreateSrrOutcome, DEFAULT_APP_NAME, SrrOptions, create_srr, create_srr_from_sfv,
};
