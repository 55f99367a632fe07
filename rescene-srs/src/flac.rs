//! FLAC profiling and SRS writing.
//!
//! A FLAC file is the `fLaC` marker, a chain of metadata blocks
//! (`is_last << 7 | type` byte and a 24-bit BE size), then frame data to
//! EOF. The SRS inserts descriptor blocks with type codes `0x73`/`0x74`
//! between the marker and the original first metadata block and drops the
//! frames.

use std::io::Write;

use rescene_core::Region;

use crate::{
    Error, Result, record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

const MARKER: [u8; 4] = *b"fLaC";

/// Metadata block type codes of the injected descriptors.
const TYPE_SRSF: u8 = 0x73; // 's'
const TYPE_SRST: u8 = 0x74; // 't'

const IS_LAST: u8 = 0x80;

/// Frame data folds into this track.
const FRAME_TRACK: u32 = 1;

pub fn profile(data: &[u8]) -> Result<Profile> {
    let mut builder = ProfileBuilder::new();
    let mut region = Region::new(data);

    let marker = region.take(4)?;
    if marker != &MARKER {
        return Err(Error::Malformed("missing fLaC marker".into()));
    }
    builder.container(marker);

    loop {
        let start = region.position();
        let header = region.read_u8()?;
        let size = region.read_u24be()? as usize;
        builder.container(&data[start..start + 4]);
        builder.container(region.take(size)?);
        if header & IS_LAST != 0 {
            break;
        }
    }

    let offset = region.position() as u64;
    let frames = region.take(region.remaining())?;
    builder.track(FRAME_TRACK, frames, offset);
    Ok(builder.finish())
}

/// Emit the SRS: marker, descriptor blocks, the original metadata chain,
/// no frames.
pub fn write_srs<W: Write>(
    data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    out: &mut W,
) -> Result<()> {
    let big = file.sample_size >= record::BIG_FILE_THRESHOLD;
    let mut region = Region::new(data);

    let marker = region.take(4)?;
    if marker != &MARKER {
        return Err(Error::Malformed("missing fLaC marker".into()));
    }
    out.write_all(marker)?;

    write_block(out, TYPE_SRSF, &record::encode_file_data(file))?;
    for track in tracks {
        write_block(out, TYPE_SRST, &record::encode_track_data(track, big))?;
    }

    loop {
        let start = region.position();
        let header = region.read_u8()?;
        let size = region.read_u24be()? as usize;
        region.skip(size)?;
        out.write_all(&data[start..start + 4 + size])?;
        if header & IS_LAST != 0 {
            break;
        }
    }
    Ok(())
}

fn write_block<W: Write>(out: &mut W, block_type: u8, payload: &[u8]) -> Result<()> {
    out.write_all(&[block_type])?;
    out.write_all(&(payload.len() as u32).to_be_bytes()[1..])?;
    out.write_all(payload)?;
    Ok(())
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    if region.take(4)? != &MARKER {
        return Err(Error::Malformed("missing fLaC marker".into()));
    }

    let mut file = None;
    let mut tracks = Vec::new();
    loop {
        let header = region.read_u8()?;
        let size = region.read_u24be()? as usize;
        let payload = region.take(size)?;
        match header & !IS_LAST {
            TYPE_SRSF => file = Some(record::decode_file_data(payload)?),
            TYPE_SRST => tracks.push(record::decode_track_data(payload)?),
            _ => {}
        }
        if header & IS_LAST != 0 {
            break;
        }
    }
    let file = file.ok_or_else(|| Error::Malformed("no SRSF metadata block found".into()))?;
    Ok((file, tracks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(23).wrapping_add(seed))
            .collect()
    }

    /// `fLaC` + STREAMINFO (marked last) + frames.
    pub(crate) fn build_flac(frames: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MARKER);
        out.push(IS_LAST); // STREAMINFO, is_last set
        out.extend_from_slice(&34u32.to_be_bytes()[1..]);
        out.extend_from_slice(&[0u8; 34]);
        out.extend_from_slice(frames);
        out
    }

    fn sample_crc(data: &[u8]) -> u32 {
        let mut crc = rescene_core::Crc32::new();
        crc.update(data);
        crc.finalize()
    }

    #[test]
    fn profiles_frames_after_the_last_block() {
        let frames = pattern(512, 1);
        let flac = build_flac(&frames);

        let profile = profile(&flac).unwrap();
        assert_eq!(profile.parsed_size, flac.len() as u64);
        assert_eq!(profile.crc32, sample_crc(&flac));
        assert_eq!(profile.tracks.len(), 1);
        assert_eq!(profile.tracks[0].number, FRAME_TRACK);
        assert_eq!(profile.tracks[0].data_length, 512);
        assert_eq!(profile.tracks[0].signature[..], frames[..256]);
        assert_eq!(profile.tracks[0].match_offset, 4 + 4 + 34);
    }

    #[test]
    fn multiple_metadata_blocks() {
        let mut flac = Vec::new();
        flac.extend_from_slice(&MARKER);
        flac.push(0x00); // STREAMINFO, not last
        flac.extend_from_slice(&34u32.to_be_bytes()[1..]);
        flac.extend_from_slice(&[0u8; 34]);
        flac.push(IS_LAST | 0x04); // VORBIS_COMMENT, last
        flac.extend_from_slice(&8u32.to_be_bytes()[1..]);
        flac.extend_from_slice(&[0u8; 8]);
        flac.extend_from_slice(&pattern(64, 2));

        let profile = profile(&flac).unwrap();
        assert_eq!(profile.parsed_size, flac.len() as u64);
        assert_eq!(profile.tracks[0].data_length, 64);
    }

    #[test]
    fn srs_keeps_metadata_and_drops_frames() {
        let frames = pattern(512, 1);
        let flac = build_flac(&frames);
        let p = profile(&flac).unwrap();
        let file = FileData {
            flags: FileData::DEFAULT_FLAGS,
            app_name: "test app".to_string(),
            file_name: "sample.flac".to_string(),
            sample_size: flac.len() as u64,
            crc32: p.crc32,
        };

        let mut srs = Vec::new();
        write_srs(&flac, &file, &p.tracks, &mut srs).unwrap();

        assert_eq!(&srs[..4], b"fLaC");
        assert_eq!(srs[4], TYPE_SRSF);
        // No frame bytes at the tail: the last 34 bytes are STREAMINFO
        assert_eq!(&srs[srs.len() - 34..], &[0u8; 34][..]);

        let (rfile, rtracks) = read_records(&srs).unwrap();
        assert_eq!(rfile, file);
        assert_eq!(rtracks, p.tracks);
    }

    #[test]
    fn missing_marker_is_malformed() {
        assert!(matches!(
            profile(b"OggS\x00\x00"),
            Err(Error::Malformed(_))
        ));
    }
}
