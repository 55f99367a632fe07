//! RIFF/AVI profiling and SRS writing.
//!
//! Track payload chunks are the `DDcc` fourccs (two stream digits, two
//! type letters: `00dc`, `01wb`, ...). The SRS keeps every chunk header
//! (sizes untouched) and drops only the payload bytes of track chunks;
//! SRSF/SRST descriptors go in as the first children of `LIST movi`.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use rescene_core::Region;

use crate::{
    Error, Result, record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

const RIFF: [u8; 4] = *b"RIFF";
const LIST: [u8; 4] = *b"LIST";
const MOVI: [u8; 4] = *b"movi";
const SRSF: [u8; 4] = *b"SRSF";
const SRST: [u8; 4] = *b"SRST";

/// Stream number of a `DDcc` track chunk.
fn track_number(fourcc: [u8; 4]) -> Option<u32> {
    if fourcc[0].is_ascii_digit()
        && fourcc[1].is_ascii_digit()
        && fourcc[2].is_ascii_alphabetic()
        && fourcc[3].is_ascii_alphabetic()
    {
        Some(u32::from(fourcc[0] - b'0') * 10 + u32::from(fourcc[1] - b'0'))
    } else {
        None
    }
}

fn is_list(fourcc: [u8; 4]) -> bool {
    fourcc == RIFF || fourcc == LIST
}

pub fn profile(data: &[u8]) -> Result<Profile> {
    let mut builder = ProfileBuilder::new();
    let mut region = Region::new(data);
    walk_profile(&mut region, data, &mut builder)?;
    Ok(builder.finish())
}

fn walk_profile(region: &mut Region<'_>, data: &[u8], builder: &mut ProfileBuilder) -> Result<()> {
    while region.remaining() >= 8 {
        let start = region.position();
        let fourcc: [u8; 4] = region.take(4)?.try_into().unwrap();
        let size = region.read_u32le()? as usize;
        builder.container(&data[start..start + 8]);

        if is_list(fourcc) {
            if size < 4 {
                return Err(Error::Malformed(format!(
                    "RIFF list of size {size} at offset {start}"
                )));
            }
            builder.container(region.take(4)?); // sub-type
            let end = (start + 8 + size).min(region.end());
            let mut children = region.slice(region.position(), end);
            walk_profile(&mut children, data, builder)?;
            region.seek(end);
        } else if let Some(number) = track_number(fourcc) {
            let offset = region.position() as u64;
            builder.track(number, region.take(size)?, offset);
        } else {
            builder.container(region.take(size)?);
        }

        if size % 2 == 1 && !region.is_empty() {
            builder.container(region.take(1)?);
        }
    }
    // Stray bytes shorter than a chunk header still count toward the CRC
    if !region.is_empty() {
        builder.container(region.take(region.remaining())?);
    }
    Ok(())
}

/// Emit the SRS: original structure with track payloads dropped and the
/// descriptors leading `LIST movi`.
pub fn write_srs<W: Write>(
    data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    out: &mut W,
) -> Result<()> {
    let big = file.sample_size >= record::BIG_FILE_THRESHOLD;
    let mut region = Region::new(data);
    walk_write(&mut region, data, file, tracks, big, out)
}

fn walk_write<W: Write>(
    region: &mut Region<'_>,
    data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    big: bool,
    out: &mut W,
) -> Result<()> {
    while region.remaining() >= 8 {
        let start = region.position();
        let fourcc: [u8; 4] = region.take(4)?.try_into().unwrap();
        let size = region.read_u32le()? as usize;
        out.write_all(&data[start..start + 8])?;

        let mut drop_payload = false;
        if is_list(fourcc) {
            let subtype: [u8; 4] = region.take(4)?.try_into().unwrap();
            out.write_all(&subtype)?;
            if subtype == MOVI {
                write_records(file, tracks, big, out)?;
            }
            let end = (start + 8 + size).min(region.end());
            let mut children = region.slice(region.position(), end);
            walk_write(&mut children, data, file, tracks, big, out)?;
            region.seek(end);
        } else if track_number(fourcc).is_some() {
            region.skip(size)?;
            drop_payload = true;
        } else {
            out.write_all(region.take(size)?)?;
        }

        if size % 2 == 1 && !region.is_empty() {
            let pad = region.take(1)?;
            if !drop_payload {
                out.write_all(pad)?;
            }
        }
    }
    if !region.is_empty() {
        out.write_all(region.take(region.remaining())?)?;
    }
    Ok(())
}

fn write_records<W: Write>(
    file: &FileData,
    tracks: &[TrackData],
    big: bool,
    out: &mut W,
) -> Result<()> {
    write_chunk(out, SRSF, &record::encode_file_data(file))?;
    for track in tracks {
        write_chunk(out, SRST, &record::encode_track_data(track, big))?;
    }
    Ok(())
}

fn write_chunk<W: Write>(out: &mut W, fourcc: [u8; 4], payload: &[u8]) -> Result<()> {
    out.write_all(&fourcc)?;
    out.write_u32::<LittleEndian>(payload.len() as u32)?;
    out.write_all(payload)?;
    if payload.len() % 2 == 1 {
        out.write_all(&[0])?;
    }
    Ok(())
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    let mut file = None;
    let mut tracks = Vec::new();
    walk_read(&mut region, &mut file, &mut tracks)?;
    let file = file.ok_or_else(|| Error::Malformed("no SRSF chunk found".into()))?;
    Ok((file, tracks))
}

fn walk_read(
    region: &mut Region<'_>,
    file: &mut Option<FileData>,
    tracks: &mut Vec<TrackData>,
) -> Result<()> {
    while region.remaining() >= 8 {
        let start = region.position();
        let fourcc: [u8; 4] = region.take(4)?.try_into().unwrap();
        let size = region.read_u32le()? as usize;

        if is_list(fourcc) {
            region.skip(4)?;
            // Dropped payloads make the declared size overshoot; clamp
            let end = (start + 8 + size).min(region.end());
            let mut children = region.slice(region.position(), end);
            walk_read(&mut children, file, tracks)?;
            region.seek(end);
        } else if track_number(fourcc).is_some() {
            // Header-only in an SRS: no payload, no padding
            continue;
        } else if fourcc == SRSF {
            *file = Some(record::decode_file_data(region.take(size)?)?);
        } else if fourcc == SRST {
            tracks.push(record::decode_track_data(region.take(size)?)?);
        } else {
            region.skip(size.min(region.remaining()))?;
        }

        if size % 2 == 1 && !region.is_empty() {
            region.skip(1)?;
        }
    }
    Ok(())
}
