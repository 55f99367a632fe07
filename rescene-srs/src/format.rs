//! Media container detection.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::{Error, Result};

/// Container syntaxes an SRS can mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerType {
    Avi,
    Mkv,
    Mp4,
    Wmv,
    Flac,
    Mp3,
    /// Raw MPEG-style stream (VOB, M2TS, TS, EVO, MPG).
    Stream,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avi => "AVI",
            Self::Mkv => "MKV",
            Self::Mp4 => "MP4",
            Self::Wmv => "WMV",
            Self::Flac => "FLAC",
            Self::Mp3 => "MP3",
            Self::Stream => "Stream",
        }
    }
}

impl std::fmt::Display for ContainerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First bytes of the ASF header object GUID.
const ASF_HEADER_GUID: [u8; 4] = [0x30, 0x26, 0xB2, 0x75];

/// Extensions accepted as raw streams when no magic matches.
const STREAM_EXTENSIONS: &[&str] = &["vob", "m2ts", "ts", "mpg", "mpeg", "evo"];

/// Detect the container of a sample file by magic, falling back to the
/// extension for raw streams.
pub fn detect_container(path: &Path) -> Result<ContainerType> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let mut head = [0u8; 16];
    let got = File::open(path)?.read(&mut head)?;

    if let Some(container) = detect_bytes(&head[..got]) {
        debug!("{}: detected {container}", path.display());
        return Ok(container);
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if STREAM_EXTENSIONS.contains(&ext.as_str()) {
        debug!("{}: raw stream by extension", path.display());
        return Ok(ContainerType::Stream);
    }
    // MPEG program/transport streams have recognizable top-level bytes
    if got >= 4 && (head[..4] == [0x00, 0x00, 0x01, 0xBA] || head[0] == 0x47) {
        return Ok(ContainerType::Stream);
    }
    Err(Error::UnsupportedContainer(path.to_path_buf()))
}

/// Magic-only detection over the first bytes of a file.
pub fn detect_bytes(head: &[u8]) -> Option<ContainerType> {
    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"AVI " {
        return Some(ContainerType::Avi);
    }
    if head.len() >= 4 && head[..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        return Some(ContainerType::Mkv);
    }
    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        return Some(ContainerType::Mp4);
    }
    if head.len() >= 4 && head[..4] == ASF_HEADER_GUID {
        return Some(ContainerType::Wmv);
    }
    if head.len() >= 4 && &head[..4] == b"fLaC" {
        return Some(ContainerType::Flac);
    }
    if head.len() >= 3 && &head[..3] == b"ID3" {
        return Some(ContainerType::Mp3);
    }
    if head.len() >= 2 && head[0] == 0xFF && head[1] & 0xE0 == 0xE0 {
        return Some(ContainerType::Mp3);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_detection() {
        assert_eq!(
            detect_bytes(b"RIFF\x10\x00\x00\x00AVI LIST"),
            Some(ContainerType::Avi)
        );
        assert_eq!(
            detect_bytes(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
            Some(ContainerType::Mkv)
        );
        assert_eq!(
            detect_bytes(b"\x00\x00\x00\x20ftypisom"),
            Some(ContainerType::Mp4)
        );
        assert_eq!(
            detect_bytes(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66]),
            Some(ContainerType::Wmv)
        );
        assert_eq!(detect_bytes(b"fLaC\x00"), Some(ContainerType::Flac));
        assert_eq!(detect_bytes(b"ID3\x03\x00"), Some(ContainerType::Mp3));
        assert_eq!(detect_bytes(&[0xFF, 0xFB, 0x90]), Some(ContainerType::Mp3));
        assert_eq!(detect_bytes(b"garbage"), None);
    }

    #[test]
    fn stream_extension_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.vob");
        std::fs::write(&path, [0u8; 32]).unwrap();
        assert_eq!(detect_container(&path).unwrap(), ContainerType::Stream);

        let unknown = dir.path().join("sample.xyz");
        std::fs::write(&unknown, [0u8; 32]).unwrap();
        assert!(matches!(
            detect_container(&unknown),
            Err(Error::UnsupportedContainer(_))
        ));
    }
}
