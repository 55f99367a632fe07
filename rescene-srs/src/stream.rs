//! Raw stream (VOB/M2TS/TS/EVO/MPG) profiling and SRS writing.
//!
//! Streams have no parseable container: the whole file is one track. The
//! SRS is a `STRM` header followed by the descriptors; no original bytes
//! are preserved.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use rescene_core::Region;

use crate::{
    Error, Result,
    mp3::read_tagged,
    record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

pub(crate) const STRM: [u8; 4] = *b"STRM";
const SRSF: [u8; 4] = *b"SRSF";
const SRST: [u8; 4] = *b"SRST";

const STREAM_TRACK: u32 = 1;

pub fn profile(data: &[u8]) -> Result<Profile> {
    let mut builder = ProfileBuilder::new();
    builder.track(STREAM_TRACK, data, 0);
    Ok(builder.finish())
}

/// Emit the SRS: `STRM` marker block, then the descriptors.
pub fn write_srs<W: Write>(
    _data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    out: &mut W,
) -> Result<()> {
    let big = file.sample_size >= record::BIG_FILE_THRESHOLD;

    out.write_all(&STRM)?;
    out.write_u32::<LittleEndian>(8)?;
    write_tagged(out, SRSF, &record::encode_file_data(file))?;
    for track in tracks {
        write_tagged(out, SRST, &record::encode_track_data(track, big))?;
    }
    Ok(())
}

fn write_tagged<W: Write>(out: &mut W, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    out.write_all(&tag)?;
    out.write_u32::<LittleEndian>(8 + payload.len() as u32)?;
    out.write_all(payload)?;
    Ok(())
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    if region.take(4)? != &STRM {
        return Err(Error::Malformed("missing STRM marker".into()));
    }
    let header_size = region.read_u32le()?;
    if header_size != 8 {
        return Err(Error::Malformed(format!(
            "STRM header of size {header_size}"
        )));
    }

    let payload = read_tagged(&mut region, SRSF)?
        .ok_or_else(|| Error::Malformed("no SRSF block found".into()))?;
    let file = record::decode_file_data(payload)?;

    let mut tracks = Vec::new();
    while let Some(payload) = read_tagged(&mut region, SRST)? {
        tracks.push(record::decode_track_data(payload)?);
    }
    Ok((file, tracks))
}
