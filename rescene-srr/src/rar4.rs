//! RAR4 (RAR 1.5 - 4.x) block layout.
//!
//! Every block starts with the 7-byte base header
//! `crc16 (u16 LE) | type (u8) | flags (u16 LE) | header_size (u16 LE)`.
//! File and service headers continue with fixed-offset fields; all offsets
//! below are relative to the start of the base header.

use rescene_core::Region;

use crate::{Error, Result};

/// 7-byte marker block opening every RAR4 volume.
pub const MARKER: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

/// Block type bytes.
pub mod block_type {
    pub const MARKER: u8 = 0x72;
    pub const ARCHIVE: u8 = 0x73;
    pub const FILE: u8 = 0x74;
    pub const COMMENT_OLD: u8 = 0x75;
    pub const AUTHENTICITY_OLD: u8 = 0x76;
    pub const SUBBLOCK_OLD: u8 = 0x77;
    pub const RECOVERY_OLD: u8 = 0x78;
    pub const AUTHENTICITY: u8 = 0x79;
    pub const SERVICE: u8 = 0x7A;
    pub const END_ARCHIVE: u8 = 0x7B;
}

/// Block flag bits.
pub mod flags {
    /// File data continues from the previous volume.
    pub const SPLIT_BEFORE: u16 = 0x0001;
    /// File data continues in the next volume.
    pub const SPLIT_AFTER: u16 = 0x0002;
    /// 64-bit packed/unpacked sizes follow the fixed fields.
    pub const LARGE: u16 = 0x0100;
    /// A 4-byte `add_size` payload length follows the base header.
    pub const LONG_BLOCK: u16 = 0x8000;
}

/// Compression method byte for uncompressed storage.
pub const METHOD_STORE: u8 = 0x30;

/// Offset of the filename field (no LARGE flag).
const NAME_OFFSET: usize = 32;
/// Offset of the filename field when 64-bit sizes are present.
const NAME_OFFSET_LARGE: usize = 40;

/// True when the block type carries a payload sized by the field at
/// offset 7 even without `LONG_BLOCK` set.
pub fn has_implicit_payload(block_type: u8) -> bool {
    block_type == block_type::FILE || block_type == block_type::SERVICE
}

/// Decoded view over the raw bytes of a file or service header.
///
/// The raw header stays authoritative; this view only exists so callers can
/// read sizes, flags and the archived name without re-deriving offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeaderView {
    pub flags: u16,
    pub header_size: u16,
    pub packed_size: u64,
    pub unpacked_size: u64,
    pub host_os: u8,
    pub file_crc: u32,
    pub dos_time: u32,
    pub unpack_version: u8,
    pub method: u8,
    pub attributes: u32,
    /// Filename bytes exactly as stored.
    pub name_raw: Vec<u8>,
    /// Best-effort UTF-8 decoding of `name_raw`, trimmed at the first NUL.
    pub name: String,
}

impl FileHeaderView {
    pub fn parse(header: &[u8]) -> Result<Self> {
        let mut r = Region::new(header);
        r.skip(3).map_err(|_| malformed(header))?; // crc16 + type
        let flags = r.read_u16le().map_err(|_| malformed(header))?;
        let header_size = r.read_u16le().map_err(|_| malformed(header))?;

        let mut packed_size = u64::from(r.read_u32le().map_err(|_| malformed(header))?);
        let mut unpacked_size = u64::from(r.read_u32le().map_err(|_| malformed(header))?);
        let host_os = r.read_u8().map_err(|_| malformed(header))?;
        let file_crc = r.read_u32le().map_err(|_| malformed(header))?;
        let dos_time = r.read_u32le().map_err(|_| malformed(header))?;
        let unpack_version = r.read_u8().map_err(|_| malformed(header))?;
        let method = r.read_u8().map_err(|_| malformed(header))?;
        let name_size = r.read_u16le().map_err(|_| malformed(header))?;
        let attributes = r.read_u32le().map_err(|_| malformed(header))?;

        let mut name_offset = NAME_OFFSET;
        if flags & flags::LARGE != 0 {
            let high_packed = u64::from(r.read_u32le().map_err(|_| malformed(header))?);
            let high_unpacked = u64::from(r.read_u32le().map_err(|_| malformed(header))?);
            packed_size |= high_packed << 32;
            unpacked_size |= high_unpacked << 32;
            name_offset = NAME_OFFSET_LARGE;
        }

        let name_end = name_offset + usize::from(name_size);
        if header.len() < name_end {
            return Err(malformed(header));
        }
        let name_raw = header[name_offset..name_end].to_vec();
        let name = decode_name(&name_raw);

        Ok(Self {
            flags,
            header_size,
            packed_size,
            unpacked_size,
            host_os,
            file_crc,
            dos_time,
            unpack_version,
            method,
            attributes,
            name_raw,
            name,
        })
    }

    pub fn split_before(&self) -> bool {
        self.flags & flags::SPLIT_BEFORE != 0
    }

    pub fn split_after(&self) -> bool {
        self.flags & flags::SPLIT_AFTER != 0
    }

    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORE
    }

    /// The 3-character service sub-type (`CMT`, `RR`, `AV`) for service
    /// blocks, which store it in the name field.
    pub fn service_subtype(&self) -> &str {
        &self.name
    }
}

/// Decode a RAR4 filename: UTF-8 best effort, NUL-terminated, with
/// backslashes left alone (path separators are normalized at lookup time).
pub fn decode_name(raw: &[u8]) -> String {
    let until_nul = match raw.iter().position(|&b| b == 0) {
        Some(nul) => &raw[..nul],
        None => raw,
    };
    String::from_utf8_lossy(until_nul).into_owned()
}

fn malformed(header: &[u8]) -> Error {
    Error::MalformedHeader {
        offset: 0,
        size: header.len() as u64,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a minimal file header for `name` with the given sizes.
    pub(crate) fn build_file_header(
        name: &str,
        flags: u16,
        packed_size: u32,
        unpacked_size: u32,
    ) -> Vec<u8> {
        let header_size = 32 + name.len() as u16;
        let mut h = Vec::new();
        h.extend_from_slice(&0x9C5Au16.to_le_bytes()); // crc16 (not verified)
        h.push(block_type::FILE);
        h.extend_from_slice(&flags.to_le_bytes());
        h.extend_from_slice(&header_size.to_le_bytes());
        h.extend_from_slice(&packed_size.to_le_bytes());
        h.extend_from_slice(&unpacked_size.to_le_bytes());
        h.push(2); // host_os: Windows
        h.extend_from_slice(&0xAABBCCDDu32.to_le_bytes()); // file crc
        h.extend_from_slice(&0x5A5A5A5Au32.to_le_bytes()); // dos time
        h.push(29); // unpack version
        h.push(METHOD_STORE);
        h.extend_from_slice(&(name.len() as u16).to_le_bytes());
        h.extend_from_slice(&0x20u32.to_le_bytes()); // attributes
        h.extend_from_slice(name.as_bytes());
        h
    }

    #[test]
    fn parses_fixed_fields() {
        let header = build_file_header("sample.txt", 0, 37, 37);
        let view = FileHeaderView::parse(&header).unwrap();

        assert_eq!(view.packed_size, 37);
        assert_eq!(view.unpacked_size, 37);
        assert_eq!(view.host_os, 2);
        assert_eq!(view.file_crc, 0xAABBCCDD);
        assert_eq!(view.unpack_version, 29);
        assert_eq!(view.method, METHOD_STORE);
        assert_eq!(view.name, "sample.txt");
        assert!(view.is_stored());
        assert!(!view.split_before());
        assert!(!view.split_after());
    }

    #[test]
    fn large_sizes_move_the_name() {
        let name = "big.bin";
        let header_size = 40 + name.len() as u16;
        let mut h = Vec::new();
        h.extend_from_slice(&0u16.to_le_bytes());
        h.push(block_type::FILE);
        h.extend_from_slice(&flags::LARGE.to_le_bytes());
        h.extend_from_slice(&header_size.to_le_bytes());
        h.extend_from_slice(&0x0000_0001u32.to_le_bytes()); // packed low
        h.extend_from_slice(&0x0000_0002u32.to_le_bytes()); // unpacked low
        h.push(3);
        h.extend_from_slice(&0u32.to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes());
        h.push(29);
        h.push(METHOD_STORE);
        h.extend_from_slice(&(name.len() as u16).to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes());
        h.extend_from_slice(&2u32.to_le_bytes()); // packed high
        h.extend_from_slice(&1u32.to_le_bytes()); // unpacked high
        h.extend_from_slice(name.as_bytes());

        let view = FileHeaderView::parse(&h).unwrap();
        assert_eq!(view.packed_size, (2 << 32) | 1);
        assert_eq!(view.unpacked_size, (1 << 32) | 2);
        assert_eq!(view.name, "big.bin");
    }

    #[test]
    fn name_stops_at_nul() {
        assert_eq!(decode_name(b"dir\\file.txt\0garbage"), "dir\\file.txt");
        assert_eq!(decode_name(b"plain.txt"), "plain.txt");
    }

    #[test]
    fn truncated_header_is_malformed() {
        let header = build_file_header("sample.txt", 0, 1, 1);
        assert!(FileHeaderView::parse(&header[..20]).is_err());
    }
}
