//! ISO-BMFF (MP4/MOV) profiling and SRS writing.
//!
//! Atom headers are `size32 (u32 BE) | type (4)`, with `size32 == 1`
//! escaping to a 64-bit size and `size32 == 0` running to the end of the
//! region. All `mdat` payload is assigned to the first `tkhd`-declared
//! track (or a synthetic track 1); the SRS injects `SRSF`/`SRST` atoms
//! immediately before the first `mdat` and keeps its header bytes.

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use rescene_core::Region;
use tracing::trace;

use crate::{
    Error, Result, record,
    track::{FileData, Profile, ProfileBuilder, TrackData},
};

const MDAT: [u8; 4] = *b"mdat";
const TKHD: [u8; 4] = *b"tkhd";
const SRSF: [u8; 4] = *b"SRSF";
const SRST: [u8; 4] = *b"SRST";

/// Atoms stepped into.
const CONTAINERS: [[u8; 4]; 9] = [
    *b"moov", *b"trak", *b"mdia", *b"minf", *b"stbl", *b"edts", *b"udta", *b"meta", *b"ilst",
];

/// Track number used for `mdat` data when no `tkhd` declared any track.
const FALLBACK_TRACK: u32 = 1;

struct Atom {
    kind: [u8; 4],
    header_len: usize,
    body_end: usize,
}

fn read_atom(region: &mut Region<'_>) -> Result<Atom> {
    let start = region.position();
    let size32 = region.read_u32be()?;
    let kind: [u8; 4] = region.take(4)?.try_into().unwrap();

    let (size, header_len) = if size32 == 1 {
        (region.read_u64be()?, 16usize)
    } else {
        (u64::from(size32), 8usize)
    };

    let body_end = if size32 == 0 {
        region.end()
    } else {
        if size < header_len as u64 {
            return Err(Error::Malformed(format!(
                "atom {} of size {size} at offset {start}",
                String::from_utf8_lossy(&kind)
            )));
        }
        ((start as u64 + size) as usize).min(region.end())
    };
    Ok(Atom {
        kind,
        header_len,
        body_end,
    })
}

#[derive(Default)]
struct ProfileState {
    builder: ProfileBuilder,
    declared_tracks: Vec<u32>,
}

pub fn profile(data: &[u8]) -> Result<Profile> {
    let mut state = ProfileState::default();
    let mut region = Region::new(data);
    walk_profile(&mut region, data, &mut state)?;

    let number = state
        .declared_tracks
        .first()
        .copied()
        .unwrap_or(FALLBACK_TRACK);
    let mut profile = state.builder.finish();
    // The walker fed mdat under a sentinel; name it after the first
    // declared track
    for track in &mut profile.tracks {
        if track.number == u32::MAX {
            track.number = number;
        }
    }
    profile.tracks.sort_by_key(|t| t.number);
    Ok(profile)
}

fn walk_profile(region: &mut Region<'_>, data: &[u8], state: &mut ProfileState) -> Result<()> {
    while region.remaining() >= 8 {
        let start = region.position();
        let atom = read_atom(region)?;
        state
            .builder
            .container(&data[start..start + atom.header_len]);

        if CONTAINERS.contains(&atom.kind) {
            let mut children = region.slice(region.position(), atom.body_end);
            walk_profile(&mut children, data, state)?;
            region.seek(atom.body_end);
        } else if atom.kind == MDAT {
            let offset = region.position() as u64;
            let body = region.take(atom.body_end - region.position())?;
            state.builder.track(u32::MAX, body, offset);
        } else {
            if atom.kind == TKHD {
                if let Some(id) = tkhd_track_id(&data[region.position()..atom.body_end]) {
                    trace!("tkhd declares track {id}");
                    state.declared_tracks.push(id);
                }
            }
            let body = region.take(atom.body_end - region.position())?;
            state.builder.container(body);
        }
    }
    if !region.is_empty() {
        state.builder.container(region.take(region.remaining())?);
    }
    Ok(())
}

/// Track id of a `tkhd` body: 4 bytes BE at offset 11 (version 0) or 19
/// (version 1).
fn tkhd_track_id(body: &[u8]) -> Option<u32> {
    let offset = match body.first()? {
        0 => 11,
        _ => 19,
    };
    let bytes = body.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(bytes.try_into().unwrap()))
}

/// Emit the SRS: descriptors before the first `mdat`, whose payload is
/// dropped (header kept).
pub fn write_srs<W: Write>(
    data: &[u8],
    file: &FileData,
    tracks: &[TrackData],
    out: &mut W,
) -> Result<()> {
    let big = file.sample_size >= record::BIG_FILE_THRESHOLD;
    let mut region = Region::new(data);
    let mut injected = false;

    while region.remaining() >= 8 {
        let start = region.position();
        let atom = read_atom(&mut region)?;

        if atom.kind == MDAT {
            if !injected {
                write_atom(out, SRSF, &record::encode_file_data(file))?;
                for track in tracks {
                    write_atom(out, SRST, &record::encode_track_data(track, big))?;
                }
                injected = true;
            }
            out.write_all(&data[start..start + atom.header_len])?;
            region.seek(atom.body_end);
        } else {
            // Copied verbatim, children included
            out.write_all(&data[start..atom.body_end])?;
            region.seek(atom.body_end);
        }
    }
    if !region.is_empty() {
        let rest = region.take(region.remaining())?;
        out.write_all(rest)?;
    }
    Ok(())
}

fn write_atom<W: Write>(out: &mut W, kind: [u8; 4], payload: &[u8]) -> Result<()> {
    out.write_u32::<BigEndian>(8 + payload.len() as u32)?;
    out.write_all(&kind)?;
    out.write_all(payload)?;
    Ok(())
}

/// Pull the SRSF/SRST records back out of an SRS file.
pub fn read_records(data: &[u8]) -> Result<(FileData, Vec<TrackData>)> {
    let mut region = Region::new(data);
    let mut file = None;
    let mut tracks = Vec::new();

    while region.remaining() >= 8 {
        let atom = read_atom(&mut region)?;
        if atom.kind == SRSF {
            let payload = region.take(atom.body_end - region.position())?;
            file = Some(record::decode_file_data(payload)?);
        } else if atom.kind == SRST {
            let payload = region.take(atom.body_end - region.position())?;
            tracks.push(record::decode_track_data(payload)?);
        } else if atom.kind == MDAT {
            // Payload absent in an SRS: only the header was written
            continue;
        } else {
            region.seek(atom.body_end);
        }
    }
    let file = file.ok_or_else(|| Error::Malformed("no SRSF atom found".into()))?;
    Ok((file, tracks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(8 + payload.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed))
            .collect()
    }

    /// `ftyp + moov + mdat` per the common sample layout.
    pub(crate) fn build_mp4(mdat: &[u8]) -> Vec<u8> {
        let mut out = atom(b"ftyp", b"isomiso2avc1mp41");
        out.extend_from_slice(&atom(b"moov", &[0u8; 32]));
        out.extend_from_slice(&atom(b"mdat", mdat));
        out
    }

    fn sample_crc(data: &[u8]) -> u32 {
        let mut crc = rescene_core::Crc32::new();
        crc.update(data);
        crc.finalize()
    }

    #[test]
    fn profiles_the_synthetic_sample() {
        let payload = pattern(1024, 1);
        let mp4 = build_mp4(&payload);

        let profile = profile(&mp4).unwrap();
        assert_eq!(profile.parsed_size, mp4.len() as u64);
        assert_eq!(profile.crc32, sample_crc(&mp4));
        assert_eq!(profile.tracks.len(), 1);
        assert_eq!(profile.tracks[0].number, FALLBACK_TRACK);
        assert_eq!(profile.tracks[0].data_length, 1024);
        assert_eq!(profile.tracks[0].signature[..], payload[..256]);
    }

    #[test]
    fn tkhd_names_the_mdat_track() {
        // moov(trak(tkhd v0, track id 3)) + mdat
        let mut tkhd_body = vec![0u8; 24];
        tkhd_body[11..15].copy_from_slice(&3u32.to_be_bytes());
        let trak = atom(b"trak", &atom(b"tkhd", &tkhd_body));
        let moov = atom(b"moov", &trak);

        let mut mp4 = atom(b"ftyp", b"isom");
        mp4.extend_from_slice(&moov);
        mp4.extend_from_slice(&atom(b"mdat", &pattern(100, 2)));

        let profile = profile(&mp4).unwrap();
        assert_eq!(profile.tracks.len(), 1);
        assert_eq!(profile.tracks[0].number, 3);
    }

    #[test]
    fn size64_atoms_parse() {
        let payload = pattern(64, 3);
        let mut mdat = Vec::new();
        mdat.extend_from_slice(&1u32.to_be_bytes());
        mdat.extend_from_slice(b"mdat");
        mdat.extend_from_slice(&(16 + payload.len() as u64).to_be_bytes());
        mdat.extend_from_slice(&payload);

        let mut mp4 = atom(b"ftyp", b"isom");
        mp4.extend_from_slice(&mdat);

        let profile = profile(&mp4).unwrap();
        assert_eq!(profile.parsed_size, mp4.len() as u64);
        assert_eq!(profile.tracks[0].data_length, 64);
    }

    #[test]
    fn srs_layout_and_record_round_trip() {
        let payload = pattern(1024, 1);
        let mp4 = build_mp4(&payload);
        let p = profile(&mp4).unwrap();
        let file = FileData {
            flags: FileData::DEFAULT_FLAGS,
            app_name: "test app".to_string(),
            file_name: "sample.mp4".to_string(),
            sample_size: mp4.len() as u64,
            crc32: p.crc32,
        };

        let mut srs = Vec::new();
        write_srs(&mp4, &file, &p.tracks, &mut srs).unwrap();

        // ftyp, moov, then the descriptors, then the bare mdat header
        assert_eq!(&srs[4..8], b"ftyp");
        let srsf = srs.windows(4).position(|w| w == b"SRSF").unwrap();
        let mdat = srs.windows(4).position(|w| w == b"mdat").unwrap();
        assert!(srsf < mdat);
        // mdat header is the last 8 bytes: payload dropped
        assert_eq!(mdat + 4, srs.len());

        let (rfile, rtracks) = read_records(&srs).unwrap();
        assert_eq!(rfile, file);
        assert_eq!(rtracks, p.tracks);
    }
}
