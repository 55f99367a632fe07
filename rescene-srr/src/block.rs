//! SRR block framing.
//!
//! SRR blocks reuse the 7-byte RAR4 base-header shape so RAR tools skip
//! them gracefully. The `crc` field is a sentinel (the type byte duplicated
//! into both bytes) and is never verified.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{Result, rar4, rar5, scanner::RarVersion};

/// SRR block type bytes.
pub mod block_type {
    pub const HEADER: u8 = 0x69;
    pub const STORED_FILE: u8 = 0x6A;
    pub const OSO_HASH: u8 = 0x6B;
    pub const RAR_PADDING: u8 = 0x6C;
    pub const RAR_FILE: u8 = 0x71;
}

/// True for the type bytes owned by the SRR framing itself.
pub fn is_srr_type(byte: u8) -> bool {
    matches!(
        byte,
        block_type::HEADER
            | block_type::STORED_FILE
            | block_type::OSO_HASH
            | block_type::RAR_PADDING
            | block_type::RAR_FILE
    )
}

fn sentinel_crc(block_type: u8) -> u16 {
    u16::from_le_bytes([block_type, block_type])
}

fn write_base<W: Write>(w: &mut W, block_type: u8, flags: u16, header_size: u16) -> Result<()> {
    w.write_u16::<LittleEndian>(sentinel_crc(block_type))?;
    w.write_u8(block_type)?;
    w.write_u16::<LittleEndian>(flags)?;
    w.write_u16::<LittleEndian>(header_size)?;
    Ok(())
}

/// `SrrHeader`: opens every SRR file; flag bit 0 marks an app name.
pub fn write_srr_header<W: Write>(w: &mut W, app_name: Option<&str>) -> Result<()> {
    match app_name {
        Some(name) => {
            let header_size = 7 + 2 + name.len() as u16;
            write_base(w, block_type::HEADER, 0x0001, header_size)?;
            w.write_u16::<LittleEndian>(name.len() as u16)?;
            w.write_all(name.as_bytes())?;
        }
        None => write_base(w, block_type::HEADER, 0, 7)?,
    }
    Ok(())
}

/// `SrrStoredFile`: an embedded auxiliary file (NFO, SFV, ...).
pub fn write_stored_file<W: Write>(w: &mut W, name: &str, data: &[u8]) -> Result<()> {
    let header_size = 7 + 4 + 2 + name.len() as u16;
    write_base(w, block_type::STORED_FILE, rar4::flags::LONG_BLOCK, header_size)?;
    w.write_u32::<LittleEndian>(data.len() as u32)?;
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name.as_bytes())?;
    w.write_all(data)?;
    Ok(())
}

/// `SrrOsoHash`: ISDb-style content hash of an archived file.
pub fn write_oso_hash<W: Write>(w: &mut W, file_size: u64, hash: u64, name: &str) -> Result<()> {
    let header_size = 7 + 8 + 8 + 2 + name.len() as u16;
    write_base(w, block_type::OSO_HASH, 0, header_size)?;
    w.write_u64::<LittleEndian>(file_size)?;
    w.write_u64::<LittleEndian>(hash)?;
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name.as_bytes())?;
    Ok(())
}

/// `SrrRarFile`: announces the RAR volume whose blocks follow.
pub fn write_rar_file<W: Write>(w: &mut W, name: &str) -> Result<()> {
    let header_size = 7 + 2 + name.len() as u16;
    write_base(w, block_type::RAR_FILE, 0, header_size)?;
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name.as_bytes())?;
    Ok(())
}

/// `SrrRarPadding`: `pad_size` zero bytes trailing a volume. Only the count
/// is recorded; reconstruction rewrites the zeros.
pub fn write_rar_padding<W: Write>(w: &mut W, name: &str, pad_size: u32) -> Result<()> {
    let header_size = 7 + 4 + 2 + name.len() as u16;
    write_base(w, block_type::RAR_PADDING, rar4::flags::LONG_BLOCK, header_size)?;
    w.write_u32::<LittleEndian>(pad_size)?;
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name.as_bytes())?;
    Ok(())
}

/// Service sub-type whose payload is embedded in the SRR.
const COMMENT_SUBTYPE: &str = "CMT";

/// How many of a RAR block's payload bytes are stored inside the SRR.
///
/// File payloads are always dropped; service payloads are kept only for the
/// archive comment; every other payload (legacy comment/authenticity
/// blocks) is kept verbatim so those volumes round-trip.
pub fn stored_payload_size(
    version: RarVersion,
    block_type: u64,
    header: &[u8],
    payload_size: u64,
) -> u64 {
    match version {
        RarVersion::Rar4 => {
            if block_type == u64::from(rar4::block_type::FILE) {
                0
            } else if block_type == u64::from(rar4::block_type::SERVICE) {
                match rar4::FileHeaderView::parse(header) {
                    Ok(view) if view.service_subtype().eq_ignore_ascii_case(COMMENT_SUBTYPE) => {
                        payload_size
                    }
                    _ => 0,
                }
            } else {
                payload_size
            }
        }
        RarVersion::Rar5 => {
            if block_type == rar5::block_type::FILE {
                0
            } else if block_type == rar5::block_type::SERVICE {
                match rar5::FileHeaderView::parse(header) {
                    Ok(view) if view.name.eq_ignore_ascii_case(COMMENT_SUBTYPE) => payload_size,
                    _ => 0,
                }
            } else {
                payload_size
            }
        }
    }
}
