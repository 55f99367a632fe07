//! ASF (WMV/WMA) profiling and SRS writing.
//!
//! ASF files are a flat sequence of `guid (16) | size (u64 LE) | payload`
//! objects, the size covering the 24-byte object header. The Data Object
//! carries the media packets; every packet byte is treated as one logical
//! track. The SRS keeps the Data Object's own headers and appends the
//! descriptors as synthetic objects right after it.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use rescene_core::Region;

use crate::{
    Error, Result, record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

/// `guid + size` prefix of every object.
const OBJECT_HEADER: usize = 24;
/// `file id + total packets + reserved` prefix of the Data Object payload.
const DATA_HEADER: usize = 26;

/// First bytes of the Data Object GUID.
const DATA_GUID_PREFIX: [u8; 4] = [0x36, 0x26, 0xB2, 0x75];

/// Synthetic text GUIDs of the injected descriptor objects.
const SRSF_GUID: [u8; 16] = *b"SRSFSRSFSRSFSRSF";
const SRST_GUID: [u8; 16] = *b"SRSTSRSTSRSTSRST";

/// All packets fold into this one logical track.
const PACKET_TRACK: u32 = 1;

struct AsfObject {
    guid: [u8; 16],
    size: u64,
    start: usize,
}

impl AsfObject {
    fn is_data(&self) -> bool {
        self.guid[..4] == DATA_GUID_PREFIX
    }

    fn body_end(&self, region: &Region<'_>) -> usize {
        ((self.start as u64 + self.size) as usize).min(region.end())
    }
}

fn read_object(region: &mut Region<'_>) -> Result<AsfObject> {
    let start = region.position();
    let guid: [u8; 16] = region.take(16)?.try_into().unwrap();
    let size = region.read_u64le()?;
    if size < OBJECT_HEADER as u64 {
        return Err(Error::Malformed(format!(
            "ASF object of size {size} at offset {start}"
        )));
    }
    Ok(AsfObject { guid, size, start })
}

pub fn profile(data: &[u8]) -> Result<Profile> {
    let mut builder = ProfileBuilder::new();
    let mut region = Region::new(data);

    while region.remaining() >= OBJECT_HEADER {
        let object = read_object(&mut region)?;
        let end = object.body_end(&region);
        builder.container(&data[object.start..object.start + OBJECT_HEADER]);

        if object.is_data() {
            if end - region.position() < DATA_HEADER {
                return Err(Error::Malformed("truncated ASF data object".into()));
            }
            builder.container(region.take(DATA_HEADER)?);
            let offset = region.position() as u64;
            let packets = region.take(end - region.position())?;
            builder.track(PACKET_TRACK, packets, offset);
        } else {
            builder.container(region.take(end - region.position())?);
        }
    }
    if !region.is_empty() {
        builder.container(region.take(region.remaining())?);
    }
    Ok(builder.finish())
}

/// Emit the SRS: packets dropped, descriptor objects after the Data
/// Object's headers.
pub fn write_srs<W: Write>(
    data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    out: &mut W,
) -> Result<()> {
    let big = file.sample_size >= record::BIG_FILE_THRESHOLD;
    let mut region = Region::new(data);

    while region.remaining() >= OBJECT_HEADER {
        let object = read_object(&mut region)?;
        let end = object.body_end(&region);

        if object.is_data() {
            out.write_all(&data[object.start..object.start + OBJECT_HEADER + DATA_HEADER])?;
            write_object(out, SRSF_GUID, &record::encode_file_data(file))?;
            for track in tracks {
                write_object(out, SRST_GUID, &record::encode_track_data(track, big))?;
            }
            region.seek(end);
        } else {
            out.write_all(&data[object.start..end])?;
            region.seek(end);
        }
    }
    if !region.is_empty() {
        out.write_all(region.take(region.remaining())?)?;
    }
    Ok(())
}

fn write_object<W: Write>(out: &mut W, guid: [u8; 16], payload: &[u8]) -> Result<()> {
    out.write_all(&guid)?;
    out.write_u64::<LittleEndian>((OBJECT_HEADER + payload.len()) as u64)?;
    out.write_all(payload)?;
    Ok(())
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    let mut file = None;
    let mut tracks = Vec::new();

    while region.remaining() >= OBJECT_HEADER {
        let object = read_object(&mut region)?;
        if object.guid == SRSF_GUID {
            let payload = region.take(object.size as usize - OBJECT_HEADER)?;
            file = Some(record::decode_file_data(payload)?);
        } else if object.guid == SRST_GUID {
            let payload = region.take(object.size as usize - OBJECT_HEADER)?;
            tracks.push(record::decode_track_data(payload)?);
        } else if object.is_data() {
            // Packets are absent in an SRS: only the data headers remain
            region.skip(DATA_HEADER)?;
        } else {
            region.seek(object.body_end(&region));
        }
    }
    let file = file.ok_or_else(|| Error::Malformed("no SRSF object found".into()))?;
    Ok((file, tracks))
}
