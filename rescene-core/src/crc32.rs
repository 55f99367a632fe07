//! Streaming CRC32 (IEEE) accumulator.

/// CRC32 accumulator that also counts the bytes fed through it.
///
/// The SRS profilers route every byte of the input sample through one of
/// these; the byte count doubles as a check that a profiling pass covered
/// the whole file.
#[derive(Debug, Default, Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}
