//! MP3 profiling and SRS writing.
//!
//! The audio region sits between an optional ID3v2 header and an optional
//! trailing 128-byte ID3v1 tag. The SRS keeps both tags verbatim with the
//! descriptors (4-byte ASCII tag + u32 LE total size) in between.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use rescene_core::Region;

use crate::{
    Error, Result, record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

const SRSF: [u8; 4] = *b"SRSF";
const SRST: [u8; 4] = *b"SRST";

/// The audio region folds into this track.
const AUDIO_TRACK: u32 = 1;

/// `[audio_start, audio_end)` of the data.
fn audio_bounds(data: &[u8]) -> Result<(usize, usize)> {
    let start = match id3v2_size(data) {
        Some(size) => {
            let start = 10 + size;
            if start > data.len() {
                return Err(Error::Malformed(format!(
                    "ID3v2 tag of {size} bytes exceeds the file"
                )));
            }
            start
        }
        None => 0,
    };

    let end = if data.len() >= start + 128 && &data[data.len() - 128..data.len() - 125] == b"TAG" {
        data.len() - 128
    } else {
        data.len()
    };
    Ok((start, end))
}

/// Payload size of a leading ID3v2 tag: syncsafe u32 at offsets 6-9.
fn id3v2_size(data: &[u8]) -> Option<usize> {
    if data.len() < 10 || &data[..3] != b"ID3" {
        return None;
    }
    let size = data[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | usize::from(b & 0x7F));
    Some(size)
}

pub fn profile(data: &[u8]) -> Result<Profile> {
    let (start, end) = audio_bounds(data)?;
    let mut builder = ProfileBuilder::new();
    builder.container(&data[..start]);
    builder.track(AUDIO_TRACK, &data[start..end], start as u64);
    builder.container(&data[end..]);
    Ok(builder.finish())
}

/// Emit the SRS: ID3v2 verbatim, descriptors, ID3v1 tail verbatim.
pub fn write_srs<W: Write>(
    data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    out: &mut W,
) -> Result<()> {
    let big = file.sample_size >= record::BIG_FILE_THRESHOLD;
    let (start, end) = audio_bounds(data)?;

    out.write_all(&data[..start])?;
    write_tagged(out, SRSF, &record::encode_file_data(file))?;
    for track in tracks {
        write_tagged(out, SRST, &record::encode_track_data(track, big))?;
    }
    out.write_all(&data[end..])?;
    Ok(())
}

/// `tag | u32 LE total size (header included) | payload`.
fn write_tagged<W: Write>(out: &mut W, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    out.write_all(&tag)?;
    out.write_u32::<LittleEndian>(8 + payload.len() as u32)?;
    out.write_all(payload)?;
    Ok(())
}

/// Read one tagged block at the cursor, if its tag matches.
pub(crate) fn read_tagged<'a>(region: &mut Region<'a>, tag: [u8; 4]) -> Result<Option<&'a [u8]>> {
    if region.remaining() < 8 || region.peek(4)? != &tag {
        return Ok(None);
    }
    region.skip(4)?;
    let total = region.read_u32le()? as usize;
    if total < 8 {
        return Err(Error::Malformed(format!(
            "descriptor block of size {total}"
        )));
    }
    Ok(Some(region.take(total - 8)?))
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    if let Some(size) = id3v2_size(data) {
        region.skip(10 + size)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(29).wrapping_add(seed))
            .collect()
    }

    fn id3v2(payload_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"ID3");
        out.push(3); // version major
        out.push(0); // revision
        out.push(0); // flags
        // syncsafe size
        out.push(((payload_size >> 21) & 0x7F) as u8);
        out.push(((payload_size >> 14) & 0x7F) as u8);
        out.push(((payload_size >> 7) & 0x7F) as u8);
        out.push((payload_size & 0x7F) as u8);
        out.extend_from_slice(&vec![0u8; payload_size]);
        out
    }

    /// ID3v2(10 byte payload) + audio frames starting FF FB.
    pub(crate) fn build_mp3(audio_len: usize) -> Vec<u8> {
        let mut out = id3v2(10);
        let mut audio = pattern(audio_len, 1);
        audio[0] = 0xFF;
        if audio_len > 1 {
            audio[1] = 0xFB;
        }
        out.extend_from_slice(&audio);
        out
    }

    fn sample_crc(data: &[u8]) -> u32 {
        let mut crc = rescene_core::Crc32::new();
        crc.update(data);
        crc.finalize()
    }

    #[test]
    fn profiles_audio_between_the_tags() {
        let mp3 = build_mp3(512);
        let profile = profile(&mp3).unwrap();

        assert_eq!(profile.parsed_size, mp3.len() as u64);
        assert_eq!(profile.crc32, sample_crc(&mp3));
        assert_eq!(profile.tracks.len(), 1);
        assert_eq!(profile.tracks[0].number, AUDIO_TRACK);
        assert_eq!(profile.tracks[0].data_length, 512);
        assert_eq!(profile.tracks[0].match_offset, 20);
    }

    #[test]
    fn id3v1_tail_is_container_data() {
        let mut mp3 = build_mp3(512);
        let mut tail = vec![0u8; 128];
        tail[..3].copy_from_slice(b"TAG");
        mp3.extend_from_slice(&tail);

        let profile = profile(&mp3).unwrap();
        assert_eq!(profile.parsed_size, mp3.len() as u64);
        assert_eq!(profile.tracks[0].data_length, 512);
    }

    #[test]
    fn bare_audio_without_tags() {
        let mut audio = pattern(300, 2);
        audio[0] = 0xFF;
        audio[1] = 0xFB;

        let profile = profile(&audio).unwrap();
        assert_eq!(profile.tracks[0].data_length, 300);
        assert_eq!(profile.tracks[0].match_offset, 0);
    }

    #[test]
    fn srs_keeps_both_tags_and_round_trips() {
        let mut mp3 = build_mp3(512);
        let mut tail = vec![0u8; 128];
        tail[..3].copy_from_slice(b"TAG");
        mp3.extend_from_slice(&tail);

        let p = profile(&mp3).unwrap();
        let file = FileData {
            flags: FileData::DEFAULT_FLAGS,
            app_name: "test app".to_string(),
            file_name: "sample.mp3".to_string(),
            sample_size: mp3.len() as u64,
            crc32: p.crc32,
        };

        let mut srs = Vec::new();
        write_srs(&mp3, &file, &p.tracks, &mut srs).unwrap();

        assert_eq!(&srs[..3], b"ID3");
        assert_eq!(&srs[srs.len() - 128..srs.len() - 125], b"TAG");
        assert!(srs.len() < mp3.len());

        let (rfile, rtracks) = read_records(&srs).unwrap();
        assert_eq!(rfile, file);
        assert_eq!(rtracks, p.tracks);
    }

    #[test]
    fn oversized_id3_is_malformed() {
        let mut broken = id3v2(10);
        broken.truncate(12); // claims 10 payload bytes, has 2
        assert!(matches!(profile(&broken), Err(Error::Malformed(_))));
    }
}
