//! Sequential reader over the block stream of an SRR file.
//!
//! The stream mixes three grammars: SRR framing blocks (7-byte RAR4 shape),
//! copied RAR4 blocks (same shape), and copied RAR5 blocks (crc32 + vint
//! headers). After an `SrrRarFile` announcement the reader switches grammar
//! according to the marker that follows; inside a RAR5 volume, SRR framing
//! blocks are recognized by their sentinel CRC (the type byte duplicated),
//! which no RAR5 header can begin with by construction here.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use rescene_core::Region;
use tracing::debug;

use crate::{
    Error, Result, block, rar4, rar5,
    scanner::RarVersion,
};

/// One entry of an SRR stream.
#[derive(Debug, Clone)]
pub enum SrrEntry {
    /// The opening `SrrHeader` block.
    Header { app_name: Option<String> },
    /// An embedded auxiliary file; its bytes follow in the stream.
    StoredFile { name: String, size: u32 },
    /// An ISDb-style hash record.
    OsoHash {
        name: String,
        file_size: u64,
        hash: u64,
    },
    /// Zero padding to re-emit after the current volume's blocks.
    RarPadding { name: String, pad_size: u32 },
    /// Start of a volume: its name, format, and verbatim marker bytes.
    RarFile {
        name: String,
        version: RarVersion,
        marker: Vec<u8>,
    },
    /// A copied RAR block.
    RarBlock {
        version: RarVersion,
        block_type: u64,
        flags: u64,
        header: Vec<u8>,
        /// Payload size the block declares in the original volume.
        payload_size: u64,
        /// How many of those bytes are actually stored in the SRR.
        stored_size: u64,
    },
}

pub struct SrrReader<R> {
    reader: R,
    len: u64,
    pos: u64,
    /// Grammar of the volume currently being replayed.
    rar_version: Option<RarVersion>,
    /// Stored payload bytes of the last entry not yet consumed.
    pending: u64,
    started: bool,
}

impl<R: Read + Seek> SrrReader<R> {
    pub fn open(mut reader: R, path: &Path) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut head = [0u8; 3];
        if len < 7 || reader.read_exact(&mut head).is_err() || head[2] != block::block_type::HEADER
        {
            return Err(Error::NotSrr(path.to_path_buf()));
        }
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader,
            len,
            pos: 0,
            rar_version: None,
            pending: 0,
            started: false,
        })
    }

    /// Read the next entry; `None` at end of stream. Unconsumed stored
    /// payload of the previous entry is skipped automatically.
    pub fn next_entry(&mut self) -> Result<Option<SrrEntry>> {
        if self.pending > 0 {
            self.skip_pending(self.pending)?;
        }
        if self.pos >= self.len {
            return Ok(None);
        }

        if self.rar_version == Some(RarVersion::Rar5) && !self.peek_srr_sentinel()? {
            return self.next_rar5_block().map(Some);
        }
        self.next_shaped_block().map(Some)
    }

    /// Copy `n` bytes of the current entry's stored payload into `out`.
    pub fn copy_pending<W: Write>(&mut self, n: u64, out: &mut W) -> Result<()> {
        let n = n.min(self.pending);
        let mut remaining = n;
        let mut buf = vec![0u8; 0x14000];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.reader.read_exact(&mut buf[..want])?;
            out.write_all(&buf[..want])?;
            remaining -= want as u64;
        }
        self.pos += n;
        self.pending -= n;
        Ok(())
    }

    /// Read the current entry's stored payload into memory.
    pub fn read_pending(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.pending as usize);
        self.copy_pending(self.pending, &mut out)?;
        Ok(out)
    }

    fn skip_pending(&mut self, n: u64) -> Result<()> {
        let n = n.min(self.pending);
        self.reader.seek(SeekFrom::Current(n as i64))?;
        self.pos += n;
        self.pending -= n;
        Ok(())
    }

    /// True when the next bytes look like an SRR framing block: sentinel
    /// CRC with a known SRR type byte.
    fn peek_srr_sentinel(&mut self) -> Result<bool> {
        if self.len - self.pos < 3 {
            return Ok(false);
        }
        let mut head = [0u8; 3];
        self.reader.read_exact(&mut head)?;
        self.reader.seek(SeekFrom::Start(self.pos))?;
        Ok(block::is_srr_type(head[2]) && head[0] == head[2] && head[1] == head[2])
    }

    /// Parse a block in the shared 7-byte shape (SRR framing or RAR4).
    fn next_shaped_block(&mut self) -> Result<SrrEntry> {
        if self.len - self.pos < 7 {
            return Err(self.malformed(7));
        }
        let mut base = [0u8; 7];
        self.reader.read_exact(&mut base)?;
        let block_type = base[2];
        let flags = u16::from_le_bytes([base[3], base[4]]);
        let header_size = u16::from_le_bytes([base[5], base[6]]);

        if header_size < 7 || self.pos + u64::from(header_size) > self.len {
            return Err(self.malformed(u64::from(header_size)));
        }

        let mut header = vec![0u8; usize::from(header_size)];
        header[..7].copy_from_slice(&base);
        self.reader.read_exact(&mut header[7..])?;
        let offset = self.pos;
        self.pos += u64::from(header_size);

        if block::is_srr_type(block_type) {
            return self.srr_entry(block_type, flags, &header, offset);
        }

        // A copied RAR4 block
        let mut payload_size = 0u64;
        if flags & rar4::flags::LONG_BLOCK != 0 || rar4::has_implicit_payload(block_type) {
            if header.len() < 11 {
                return Err(self.malformed(u64::from(header_size)));
            }
            payload_size = u64::from(u32::from_le_bytes(header[7..11].try_into().unwrap()));
            if rar4::has_implicit_payload(block_type)
                && flags & rar4::flags::LARGE != 0
                && header.len() >= 36
            {
                let high = u64::from(u32::from_le_bytes(header[32..36].try_into().unwrap()));
                payload_size |= high << 32;
            }
        }
        let stored_size = block::stored_payload_size(
            RarVersion::Rar4,
            u64::from(block_type),
            &header,
            payload_size,
        );
        self.pending = stored_size;

        Ok(SrrEntry::RarBlock {
            version: RarVersion::Rar4,
            block_type: u64::from(block_type),
            flags: u64::from(flags),
            header,
            payload_size,
            stored_size,
        })
    }

    fn srr_entry(
        &mut self,
        block_type: u8,
        flags: u16,
        header: &[u8],
        offset: u64,
    ) -> Result<SrrEntry> {
        let mut content = Region::new(header);
        content.skip(7)?;
        match block_type {
            block::block_type::HEADER => {
                if self.started {
                    return Err(self.malformed(offset));
                }
                self.started = true;
                let app_name = if flags & 0x0001 != 0 {
                    let len = content.read_u16le()?;
                    let bytes = content.take(usize::from(len))?;
                    Some(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    None
                };
                Ok(SrrEntry::Header { app_name })
            }
            block::block_type::STORED_FILE => {
                let size = content.read_u32le()?;
                let name = read_name(&mut content)?;
                self.pending = u64::from(size);
                Ok(SrrEntry::StoredFile { name, size })
            }
            block::block_type::OSO_HASH => {
                let file_size = content.read_u64le()?;
                let hash = content.read_u64le()?;
                let name = read_name(&mut content)?;
                Ok(SrrEntry::OsoHash {
                    name,
                    file_size,
                    hash,
                })
            }
            block::block_type::RAR_PADDING => {
                let pad_size = content.read_u32le()?;
                let name = read_name(&mut content)?;
                Ok(SrrEntry::RarPadding { name, pad_size })
            }
            block::block_type::RAR_FILE => {
                let name = read_name(&mut content)?;
                let (version, marker) = self.read_marker()?;
                debug!("volume {name}: {version:?}");
                self.rar_version = Some(version);
                Ok(SrrEntry::RarFile {
                    name,
                    version,
                    marker,
                })
            }
            _ => unreachable!("checked by is_srr_type"),
        }
    }

    /// Read the RAR marker that must follow an `SrrRarFile` block.
    fn read_marker(&mut self) -> Result<(RarVersion, Vec<u8>)> {
        if self.len - self.pos < 7 {
            return Err(self.malformed(7));
        }
        let mut head = [0u8; 7];
        self.reader.read_exact(&mut head)?;
        if head == rar4::MARKER {
            self.pos += 7;
            return Ok((RarVersion::Rar4, head.to_vec()));
        }
        if head == rar5::MARKER[..7] && self.len - self.pos >= 8 {
            let mut last = [0u8; 1];
            self.reader.read_exact(&mut last)?;
            if last[0] == rar5::MARKER[7] {
                self.pos += 8;
                return Ok((RarVersion::Rar5, rar5::MARKER.to_vec()));
            }
        }
        Err(self.malformed(7))
    }

    fn next_rar5_block(&mut self) -> Result<SrrEntry> {
        let mut crc = [0u8; 4];
        self.reader.read_exact(&mut crc)?;
        let (header_size, size_vint) = rar5::read_vint_from(&mut self.reader)?;

        let prefix_len = 4 + size_vint.len() as u64;
        if self.pos + prefix_len + header_size > self.len {
            return Err(self.malformed(header_size));
        }

        let mut header = Vec::with_capacity(prefix_len as usize + header_size as usize);
        header.extend_from_slice(&crc);
        header.extend_from_slice(&size_vint);
        let content_start = header.len();
        header.resize(content_start + header_size as usize, 0);
        self.reader.read_exact(&mut header[content_start..])?;
        self.pos += prefix_len + header_size;

        let view = rar5::HeaderView::parse(&header)?;
        let stored_size = block::stored_payload_size(
            RarVersion::Rar5,
            view.block_type,
            &header,
            view.data_size,
        );
        self.pending = stored_size;

        Ok(SrrEntry::RarBlock {
            version: RarVersion::Rar5,
            block_type: view.block_type,
            flags: view.flags,
            header,
            payload_size: view.data_size,
            stored_size,
        })
    }

    fn malformed(&self, size: u64) -> Error {
        Error::MalformedHeader {
            offset: self.pos,
            size,
        }
    }
}

fn read_name(content: &mut Region<'_>) -> Result<String> {
    let len = content.read_u16le()?;
    let bytes = content.take(usize::from(len))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn walks_framing_blocks() {
        let mut srr = Vec::new();
        block::write_srr_header(&mut srr, Some("app")).unwrap();
        block::write_stored_file(&mut srr, "release.nfo", b"0123456789").unwrap();
        block::write_oso_hash(&mut srr, 1000, 0x1122334455667788, "sample.avi").unwrap();

        let mut reader = SrrReader::open(Cursor::new(&srr), Path::new("t.srr")).unwrap();

        match reader.next_entry().unwrap().unwrap() {
            SrrEntry::Header { app_name } => assert_eq!(app_name.as_deref(), Some("app")),
            other => panic!("unexpected entry: {other:?}"),
        }
        match reader.next_entry().unwrap().unwrap() {
            SrrEntry::StoredFile { name, size } => {
                assert_eq!(name, "release.nfo");
                assert_eq!(size, 10);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        // Stored payload is skipped automatically
        match reader.next_entry().unwrap().unwrap() {
            SrrEntry::OsoHash {
                name,
                file_size,
                hash,
            } => {
                assert_eq!(name, "sample.avi");
                assert_eq!(file_size, 1000);
                assert_eq!(hash, 0x1122334455667788);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn stored_payload_can_be_read() {
        let mut srr = Vec::new();
        block::write_srr_header(&mut srr, None).unwrap();
        block::write_stored_file(&mut srr, "a.sfv", b"content").unwrap();

        let mut reader = SrrReader::open(Cursor::new(&srr), Path::new("t.srr")).unwrap();
        reader.next_entry().unwrap();
        reader.next_entry().unwrap();
        assert_eq!(reader.read_pending().unwrap(), b"content");
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn rejects_non_srr_input() {
        let err = SrrReader::open(Cursor::new(b"Rar!\x1a\x07\x00".as_slice()), Path::new("x"));
        assert!(matches!(err, Err(Error::NotSrr(_))));
    }
}
