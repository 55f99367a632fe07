//! ISDb ("OSO") content hashes of archived files.
//!
//! The hash is the file size plus the wrapping sum of the little-endian
//! u64 words of the first and last 64 KiB, computed here from the stored
//! payload bytes of uncompressed archived files while the volumes are
//! scanned.

use std::io::{self, Write};

const WINDOW: usize = 0x10000;

/// Accumulates one archived file's bytes across volume boundaries.
#[derive(Debug)]
pub struct OsoAccumulator {
    pub name: String,
    /// Size the file header declares for the complete file.
    pub file_size: u64,
    fed: u64,
    head: Vec<u8>,
    tail: Vec<u8>,
}

impl OsoAccumulator {
    pub fn new(name: &str, file_size: u64) -> Self {
        Self {
            name: name.to_string(),
            file_size,
            fed: 0,
            head: Vec::with_capacity(WINDOW),
            tail: Vec::with_capacity(2 * WINDOW),
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.fed += data.len() as u64;
        if self.head.len() < WINDOW {
            let want = (WINDOW - self.head.len()).min(data.len());
            self.head.extend_from_slice(&data[..want]);
        }
        self.tail.extend_from_slice(data);
        if self.tail.len() > WINDOW {
            let excess = self.tail.len() - WINDOW;
            self.tail.drain(..excess);
        }
    }

    /// Bytes fed so far; equals the packed size sum once a file completes.
    pub fn fed(&self) -> u64 {
        self.fed
    }

    pub fn finalize(&self) -> u64 {
        self.file_size
            .wrapping_add(word_sum(&self.head))
            .wrapping_add(word_sum(&self.tail))
    }
}

impl Write for OsoAccumulator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Wrapping sum of little-endian u64 words; a short final word is
/// zero-padded.
fn word_sum(data: &[u8]) -> u64 {
    let mut sum = 0u64;
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        sum = sum.wrapping_add(u64::from_le_bytes(chunk.try_into().unwrap()));
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut word = [0u8; 8];
        word[..rest.len()].copy_from_slice(rest);
        sum = sum.wrapping_add(u64::from_le_bytes(word));
    }
    sum
}
