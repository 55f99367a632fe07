//! Streaming scan over the block sequence of a RAR volume.
//!
//! The scanner reads every header verbatim and never consumes payloads: a
//! caller copies or skips the reported `payload_size` (anything left
//! unconsumed is skipped automatically before the next block). This is what
//! lets the SRR writer copy headers byte-for-byte while dropping file data.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, warn};

use crate::{Error, Result, rar4, rar5};

/// Buffer size for payload copies.
const COPY_CHUNK: usize = 0x14000;

/// Archive format of a scanned volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RarVersion {
    Rar4,
    Rar5,
}

/// One block emitted by the scanner.
#[derive(Debug, Clone)]
pub struct ScannedBlock {
    pub version: RarVersion,
    /// RAR4 type byte widened, or the RAR5 type vint.
    pub block_type: u64,
    /// RAR4 flags widened, or the RAR5 common flags vint.
    pub flags: u64,
    /// Complete header bytes, exactly as stored in the volume.
    pub header: Vec<u8>,
    /// Payload bytes following the header that the scanner did not consume.
    pub payload_size: u64,
    /// Offset of the header within the volume.
    pub offset: u64,
}

pub struct RarScanner<R> {
    reader: R,
    version: RarVersion,
    marker: Vec<u8>,
    len: u64,
    /// Offset of the next unread header.
    pos: u64,
    /// Payload bytes of the last emitted block not yet consumed.
    pending_payload: u64,
    finished: bool,
    warning: Option<String>,
}

impl<R: Read + Seek> RarScanner<R> {
    /// Detect the marker and position the scanner on the first real block.
    pub fn open(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut head = [0u8; 8];
        let got = read_up_to(&mut reader, &mut head)?;
        if got >= 8 && head == rar5::MARKER {
            debug!("RAR5 marker found");
            return Ok(Self {
                reader,
                version: RarVersion::Rar5,
                marker: head.to_vec(),
                len,
                pos: 8,
                pending_payload: 0,
                finished: false,
                warning: None,
            });
        }
        if got >= 7 && head[..7] == rar4::MARKER {
            debug!("RAR4 marker found");
            reader.seek(SeekFrom::Start(7))?;
            return Ok(Self {
                reader,
                version: RarVersion::Rar4,
                marker: head[..7].to_vec(),
                len,
                pos: 7,
                pending_payload: 0,
                finished: false,
                warning: None,
            });
        }
        Err(Error::NotRar(Default::default()))
    }

    pub fn version(&self) -> RarVersion {
        self.version
    }

    /// The marker bytes, verbatim (7 for RAR4, 8 for RAR5).
    pub fn marker(&self) -> &[u8] {
        &self.marker
    }

    /// Warning accumulated when the scan ended early (truncated or
    /// malformed volume). Partial volumes are not fatal.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Total size of the underlying volume.
    pub fn stream_len(&self) -> u64 {
        self.len
    }

    /// Bytes between the end of the last scanned block (header plus any
    /// unconsumed payload) and the end of the stream.
    pub fn trailing_bytes(&self) -> u64 {
        self.len.saturating_sub(self.pos + self.pending_payload)
    }

    /// Read the trailing bytes after the last scanned block.
    pub fn read_trailing(&mut self) -> Result<Vec<u8>> {
        let n = self.trailing_bytes();
        self.reader.seek(SeekFrom::Start(self.pos + self.pending_payload))?;
        let mut out = vec![0u8; n as usize];
        self.reader.read_exact(&mut out)?;
        Ok(out)
    }

    /// Scan the next block header. Returns `None` at end of volume, on a
    /// truncated tail, or on a malformed header (see [`Self::warning`]).
    pub fn next_block(&mut self) -> Result<Option<ScannedBlock>> {
        if self.finished {
            return Ok(None);
        }
        if self.pending_payload > 0 {
            self.skip_payload(self.pending_payload)?;
        }
        match self.version {
            RarVersion::Rar4 => self.next_rar4(),
            RarVersion::Rar5 => self.next_rar5(),
        }
    }

    /// Skip `n` payload bytes of the current block.
    pub fn skip_payload(&mut self, n: u64) -> Result<()> {
        let n = n.min(self.pending_payload);
        self.reader.seek(SeekFrom::Current(n as i64))?;
        self.pos += n;
        self.pending_payload -= n;
        Ok(())
    }

    /// Copy `n` payload bytes of the current block into `out`.
    pub fn copy_payload<W: Write>(&mut self, n: u64, out: &mut W) -> Result<()> {
        let n = n.min(self.pending_payload);
        let mut remaining = n;
        let mut buf = vec![0u8; COPY_CHUNK];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.reader.read_exact(&mut buf[..want])?;
            out.write_all(&buf[..want])?;
            remaining -= want as u64;
        }
        self.pos += n;
        self.pending_payload -= n;
        Ok(())
    }

    fn finish(&mut self, warning: Option<String>) {
        if let Some(w) = &warning {
            warn!("{w}");
        }
        self.warning = self.warning.take().or(warning);
        self.finished = true;
    }

    fn next_rar4(&mut self) -> Result<Option<ScannedBlock>> {
        let remaining = self.len - self.pos;
        if remaining == 0 {
            self.finish(None);
            return Ok(None);
        }
        if remaining < 7 {
            self.finish(Some(format!(
                "volume ends with {remaining} stray bytes at offset {}",
                self.pos
            )));
            return Ok(None);
        }

        let mut base = [0u8; 7];
        self.reader.read_exact(&mut base)?;
        let block_type = base[2];
        let flags = u16::from_le_bytes([base[3], base[4]]);
        let header_size = u16::from_le_bytes([base[5], base[6]]);

        if header_size < 7 {
            self.finish(Some(format!(
                "malformed header of size {header_size} at offset {}",
                self.pos
            )));
            return Ok(None);
        }
        if self.pos + u64::from(header_size) > self.len {
            self.finish(Some(format!(
                "truncated header at offset {}",
                self.pos
            )));
            return Ok(None);
        }

        let mut header = vec![0u8; usize::from(header_size)];
        header[..7].copy_from_slice(&base);
        self.reader.read_exact(&mut header[7..])?;

        let mut payload_size = 0u64;
        if flags & rar4::flags::LONG_BLOCK != 0 || rar4::has_implicit_payload(block_type) {
            if header.len() < 11 {
                self.finish(Some(format!(
                    "block at offset {} declares a payload but has no size field",
                    self.pos
                )));
                return Ok(None);
            }
            payload_size = u64::from(u32::from_le_bytes(header[7..11].try_into().unwrap()));
            // 64-bit packed size: high half sits where the name would start
            if rar4::has_implicit_payload(block_type)
                && flags & rar4::flags::LARGE != 0
                && header.len() >= 36
            {
                let high = u64::from(u32::from_le_bytes(header[32..36].try_into().unwrap()));
                payload_size |= high << 32;
            }
        }

        let offset = self.pos;
        self.pos += u64::from(header_size);
        self.pending_payload = payload_size;
        if self.pos + payload_size > self.len {
            // Emit the header but report the short payload
            self.warning = Some(format!(
                "payload of block at offset {offset} extends past end of volume"
            ));
            self.pending_payload = self.len - self.pos;
        }

        Ok(Some(ScannedBlock {
            version: RarVersion::Rar4,
            block_type: u64::from(block_type),
            flags: u64::from(flags),
            header,
            payload_size,
            offset,
        }))
    }

    fn next_rar5(&mut self) -> Result<Option<ScannedBlock>> {
        let remaining = self.len - self.pos;
        if remaining == 0 {
            self.finish(None);
            return Ok(None);
        }
        if remaining < 5 {
            self.finish(Some(format!(
                "volume ends with {remaining} stray bytes at offset {}",
                self.pos
            )));
            return Ok(None);
        }

        let mut crc = [0u8; 4];
        self.reader.read_exact(&mut crc)?;
        let (header_size, size_vint) = match rar5::read_vint_from(&mut self.reader) {
            Ok(v) => v,
            Err(_) => {
                self.finish(Some(format!(
                    "malformed header size at offset {}",
                    self.pos
                )));
                return Ok(None);
            }
        };

        let prefix_len = 4 + size_vint.len() as u64;
        if self.pos + prefix_len + header_size > self.len {
            self.finish(Some(format!(
                "truncated header at offset {}",
                self.pos
            )));
            return Ok(None);
        }

        let mut header = Vec::with_capacity(prefix_len as usize + header_size as usize);
        header.extend_from_slice(&crc);
        header.extend_from_slice(&size_vint);
        let content_start = header.len();
        header.resize(content_start + header_size as usize, 0);
        self.reader.read_exact(&mut header[content_start..])?;

        let view = match rar5::HeaderView::parse(&header) {
            Ok(v) => v,
            Err(_) => {
                self.finish(Some(format!(
                    "malformed block header at offset {}",
                    self.pos
                )));
                return Ok(None);
            }
        };

        let offset = self.pos;
        self.pos += prefix_len + header_size;
        self.pending_payload = view.data_size;
        if self.pos + view.data_size > self.len {
            self.warning = Some(format!(
                "payload of block at offset {offset} extends past end of volume"
            ));
            self.pending_payload = self.len - self.pos;
        }

        Ok(Some(ScannedBlock {
            version: RarVersion::Rar5,
            block_type: view.block_type,
            flags: view.flags,
            header,
            payload_size: view.data_size,
            offset,
        }))
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
