//! Summary view over an SRS file.

use std::fs;
use std::path::Path;

use crate::{
    Error, Result, avi, flac,
    format::{ContainerType, detect_bytes},
    mkv, mp3, mp4, stream,
    track::{FileData, TrackData},
    wmv,
};

/// The descriptors an SRS carries.
#[derive(Debug, Clone)]
pub struct SrsInfo {
    pub container: ContainerType,
    pub file: FileData,
    /// Tracks in ascending track number.
    pub tracks: Vec<TrackData>,
}

impl SrsInfo {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let data = fs::read(path)?;

        let container = if data.len() >= 4 && data[..4] == stream::STRM {
            ContainerType::Stream
        } else {
            detect_bytes(&data).ok_or_else(|| Error::NotSrs(path.to_path_buf()))?
        };

        let (file, mut tracks) = match container {
            ContainerType::Avi => avi::read_records(&data),
            ContainerType::Mkv => mkv::read_records(&data),
            ContainerType::Mp4 => mp4::read_records(&data),
            ContainerType::Wmv => wmv::read_records(&data),
            ContainerType::Flac => flac::read_records(&data),
            ContainerType::Mp3 => mp3::read_records(&data),
            ContainerType::Stream => stream::read_records(&data),
        }?;
        tracks.sort_by_key(|t| t.number);

        Ok(Self {
            container,
            file,
            tracks,
        })
    }
}
