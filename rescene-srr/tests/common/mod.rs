//! Synthetic RAR4 volume builders shared by the integration tests.

/// One file entry inside a test volume: the packed bytes present in this
/// volume plus the header flags (for split markers).
pub struct FileSpec<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub flags: u16,
    /// Size of the complete file across all volumes.
    pub unpacked_size: u32,
}

impl<'a> FileSpec<'a> {
    pub fn whole(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            flags: 0,
            unpacked_size: data.len() as u32,
        }
    }
}

pub const RAR4_MARKER: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

/// Build a RAR4 volume: marker, archive header, the given files, end block.
pub fn build_rar4_volume(files: &[FileSpec<'_>]) -> Vec<u8> {
    let mut vol = Vec::new();
    vol.extend_from_slice(&RAR4_MARKER);
    vol.extend_from_slice(&archive_header());
    for file in files {
        vol.extend_from_slice(&file_header(file));
        vol.extend_from_slice(file.data);
    }
    vol.extend_from_slice(&end_block());
    vol
}

pub fn archive_header() -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&0x90CFu16.to_le_bytes());
    h.push(0x73);
    h.extend_from_slice(&0u16.to_le_bytes());
    h.extend_from_slice(&13u16.to_le_bytes());
    h.extend_from_slice(&[0u8; 6]);
    h
}

pub fn file_header(file: &FileSpec<'_>) -> Vec<u8> {
    let header_size = 32 + file.name.len() as u16;
    let mut h = Vec::new();
    h.extend_from_slice(&0x1234u16.to_le_bytes()); // crc16, never verified
    h.push(0x74);
    h.extend_from_slice(&file.flags.to_le_bytes());
    h.extend_from_slice(&header_size.to_le_bytes());
    h.extend_from_slice(&(file.data.len() as u32).to_le_bytes()); // packed
    h.extend_from_slice(&file.unpacked_size.to_le_bytes());
    h.push(2); // host os: windows
    h.extend_from_slice(&0xAABBCCDDu32.to_le_bytes()); // file crc
    h.extend_from_slice(&0x2A31_5C21u32.to_le_bytes()); // dos time
    h.push(29); // unpack version
    h.push(0x30); // method: store
    h.extend_from_slice(&(file.name.len() as u16).to_le_bytes());
    h.extend_from_slice(&0x20u32.to_le_bytes()); // attributes
    h.extend_from_slice(file.name.as_bytes());
    h
}

pub fn end_block() -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&0x3DC4u16.to_le_bytes());
    h.push(0x7B);
    h.extend_from_slice(&0u16.to_le_bytes());
    h.extend_from_slice(&7u16.to_le_bytes());
    h
}

/// Deterministic pseudo-random payload bytes.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

pub fn crc32_hex(data: &[u8]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    format!("{:08x}", hasher.finalize())
}
