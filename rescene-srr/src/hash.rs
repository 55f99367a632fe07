//! File hashing used for per-volume verification.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::Result;

/// Hash algorithm a caller's verification set is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// 8 hex chars
    Crc32,
    /// 40 hex chars
    Sha1,
}

/// Lowercase hex digest of a whole file.
pub fn hash_file(path: &Path, kind: HashKind) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = vec![0u8; 0x14000];
    match kind {
        HashKind::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(format!("{:08x}", hasher.finalize()))
        }
        HashKind::Sha1 => {
            let mut hasher = Sha1::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}
