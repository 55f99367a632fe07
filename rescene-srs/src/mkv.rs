//! Matroska/EBML profiling and SRS writing.
//!
//! Block payloads live in `SimpleBlock`/`Block` elements; everything up to
//! and including the block header (track vint, 16-bit timecode, flags
//! byte) is container data, the frames after it are track payload. The SRS
//! injects a `ReSample` container element at the top of `Segment`.

use std::io::Write;

use rescene_core::{Region, ebml};
use tracing::trace;

use crate::{
    Error, Result, record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

pub mod element {
    pub const EBML_HEADER: u64 = 0x1A45DFA3;
    pub const SEGMENT: u64 = 0x18538067;
    pub const CLUSTER: u64 = 0x1F43B675;
    pub const TRACKS: u64 = 0x1654AE6B;
    pub const TRACK_ENTRY: u64 = 0xAE;
    pub const CONTENT_ENCODINGS: u64 = 0x6D80;
    pub const CONTENT_ENCODING: u64 = 0x6240;
    pub const CONTENT_COMPRESSION: u64 = 0x5034;
    pub const BLOCK_GROUP: u64 = 0xA0;
    pub const ATTACHMENTS: u64 = 0x1941A469;
    pub const ATTACHED_FILE: u64 = 0x61A7;
    pub const SIMPLE_BLOCK: u64 = 0xA3;
    pub const BLOCK: u64 = 0xA1;

    /// SRS extension elements.
    pub const RESAMPLE: u64 = 0x1F697576;
    pub const RESAMPLE_FILE: u64 = 0x6A75;
    pub const RESAMPLE_TRACK: u64 = 0x6B75;
}

/// Elements stepped into rather than treated as opaque bodies.
fn is_container(id: u64) -> bool {
    matches!(
        id,
        element::SEGMENT
            | element::CLUSTER
            | element::TRACKS
            | element::TRACK_ENTRY
            | element::CONTENT_ENCODINGS
            | element::CONTENT_ENCODING
            | element::CONTENT_COMPRESSION
            | element::BLOCK_GROUP
            | element::ATTACHMENTS
            | element::ATTACHED_FILE
    )
}

fn is_block(id: u64) -> bool {
    id == element::SIMPLE_BLOCK || id == element::BLOCK
}

/// Parsed element header: id, body size, and whether the size was the
/// reserved all-ones "unknown" value (body then runs to the region end).
struct ElementHeader {
    id: u64,
    size: u64,
    unknown_size: bool,
    header_len: usize,
}

fn read_header(region: &mut Region<'_>) -> Result<ElementHeader> {
    let start = region.position();
    let id = ebml::read_element_id(region)?;
    let size_start = region.position();
    let size = ebml::read_vint(region)?;
    let width = region.position() - size_start;
    let unknown_size = size == (1u64 << (7 * width as u32)) - 1;
    Ok(ElementHeader {
        id,
        size,
        unknown_size,
        header_len: region.position() - start,
    })
}

fn body_end(region: &Region<'_>, header: &ElementHeader) -> usize {
    if header.unknown_size {
        region.end()
    } else {
        (region.position() + header.size as usize).min(region.end())
    }
}

pub fn profile(data: &[u8]) -> Result<Profile> {
    let mut builder = ProfileBuilder::new();
    let mut region = Region::new(data);
    walk_profile(&mut region, data, &mut builder)?;
    Ok(builder.finish())
}

fn walk_profile(region: &mut Region<'_>, data: &[u8], builder: &mut ProfileBuilder) -> Result<()> {
    while region.remaining() >= 2 {
        let start = region.position();
        let header = read_header(region)?;
        builder.container(&data[start..start + header.header_len]);
        let end = body_end(region, &header);

        if is_container(header.id) {
            let mut children = region.slice(region.position(), end);
            walk_profile(&mut children, data, builder)?;
            region.seek(end);
        } else if is_block(header.id) {
            let mut body = region.slice(region.position(), end);
            let block_start = body.position();
            let track = ebml::read_vint(&mut body)?;
            body.skip(3)?; // timecode + flags
            builder.container(&data[block_start..body.position()]);

            let offset = body.position() as u64;
            let frames = body.take(body.remaining())?;
            builder.track(track as u32, frames, offset);
            region.seek(end);
        } else {
            trace!("opaque element {:#x} ({} bytes)", header.id, header.size);
            let body_start = region.position();
            region.seek(end);
            builder.container(&data[body_start..end]);
        }
    }
    if !region.is_empty() {
        builder.container(region.take(region.remaining())?);
    }
    Ok(())
}

/// Emit the SRS: block frames dropped, `ReSample` injected at the top of
/// `Segment`.
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
    while region.remaining() >= 2 {
        let start = region.position();
        let header = read_header(region)?;
        out.write_all(&data[start..start + header.header_len])?;
        let end = body_end(region, &header);

        if header.id == element::SEGMENT {
            out.write_all(&build_resample(file, tracks, big)?)?;
            let mut children = region.slice(region.position(), end);
            walk_write(&mut children, data, file, tracks, big, out)?;
            region.seek(end);
        } else if is_container(header.id) {
            let mut children = region.slice(region.position(), end);
            walk_write(&mut children, data, file, tracks, big, out)?;
            region.seek(end);
        } else if is_block(header.id) {
            let mut body = region.slice(region.position(), end);
            let block_start = body.position();
            ebml::read_vint(&mut body)?;
            body.skip(3)?;
            out.write_all(&data[block_start..body.position()])?;
            region.seek(end);
        } else {
            let body_start = region.position();
            region.seek(end);
            out.write_all(&data[body_start..end])?;
        }
    }
    if !region.is_empty() {
        out.write_all(region.take(region.remaining())?)?;
    }
    Ok(())
}

/// `ReSample(ReSampleFile, ReSampleTrack*)` as raw EBML bytes.
fn build_resample(file: &FileData, tracks: &[TrackData], big: bool) -> Result<Vec<u8>> {
    let mut inner = build_element(element::RESAMPLE_FILE, &record::encode_file_data(file))?;
    for track in tracks {
        inner.extend_from_slice(&build_element(
            element::RESAMPLE_TRACK,
            &record::encode_track_data(track, big),
        )?);
    }
    build_element(element::RESAMPLE, &inner)
}

fn build_element(id: u64, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = ebml::encode_element_id(id)?;
    out.extend_from_slice(&ebml::encode_vint(data.len() as u64)?);
    out.extend_from_slice(data);
    Ok(out)
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    while region.remaining() >= 2 {
        let header = read_header(&mut region)?;
        let end = body_end(&region, &header);
        if header.id == element::SEGMENT {
            let mut children = region.slice(region.position(), end);
            return read_segment_records(&mut children);
        }
        region.seek(end);
    }
    Err(Error::Malformed("no Segment element found".into()))
}

fn read_segment_records(region: &mut Region<'_>) -> Result<(FileData, Vec<TrackData>)> {
    while region.remaining() >= 2 {
        let header = read_header(region)?;
        let end = body_end(region, &header);
        if header.id == element::RESAMPLE {
            let mut inner = region.slice(region.position(), end);
            let mut file = None;
            let mut tracks = Vec::new();
            while inner.remaining() >= 2 {
                let child = read_header(&mut inner)?;
                let child_end = body_end(&inner, &child);
                let payload = inner.take(child_end - inner.position())?;
                match child.id {
                    element::RESAMPLE_FILE => file = Some(record::decode_file_data(payload)?),
                    element::RESAMPLE_TRACK => {
                        tracks.push(record::decode_track_data(payload)?)
                    }
                    _ => {}
                }
            }
            let file = file.ok_or_else(|| Error::Malformed("ReSample without file data".into()))?;
            return Ok((file, tracks));
        }
        if header.id == element::CLUSTER {
            // Cluster sizes are stale in an SRS; the descriptors must have
            // appeared before any cluster
            break;
        }
        region.seek(end);
    }
    Err(Error::Malformed("no ReSample element in Segment".into()))
}
