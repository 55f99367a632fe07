//! SRSF and SRST record payloads.
//!
//! Both records are little-endian throughout. Track records grow their
//! number and length fields when the values do not fit the small forms
//! (flag bits 2 and 3).

use byteorder::{LittleEndian, WriteBytesExt};
use rescene_core::Region;

use crate::{
    Result,
    track::{FileData, TrackData},
};

/// Track flag: `data_length` is stored as u64.
pub const TRACK_BIG_LENGTH: u16 = 0x0004;
/// Track flag: `number` is stored as u32.
pub const TRACK_BIG_NUMBER: u16 = 0x0008;

/// Samples at or past this size store u64 track lengths.
pub const BIG_FILE_THRESHOLD: u64 = 1 << 31;

/// Encode an SRSF payload.
pub fn encode_file_data(file: &FileData) -> Vec<u8> {
    let mut out = Vec::with_capacity(18 + file.app_name.len() + file.file_name.len());
    out.write_u16::<LittleEndian>(file.flags).unwrap();
    out.write_u16::<LittleEndian>(file.app_name.len() as u16)
        .unwrap();
    out.extend_from_slice(file.app_name.as_bytes());
    out.write_u16::<LittleEndian>(file.file_name.len() as u16)
        .unwrap();
    out.extend_from_slice(file.file_name.as_bytes());
    out.write_u64::<LittleEndian>(file.sample_size).unwrap();
    out.write_u32::<LittleEndian>(file.crc32).unwrap();
    out
}

/// Decode an SRSF payload.
pub fn decode_file_data(payload: &[u8]) -> Result<FileData> {
    let mut r = Region::new(payload);
    let flags = r.read_u16le()?;
    let app_len = r.read_u16le()?;
    let app_name = String::from_utf8_lossy(r.take(usize::from(app_len))?).into_owned();
    let name_len = r.read_u16le()?;
    let file_name = String::from_utf8_lossy(r.take(usize::from(name_len))?).into_owned();
    let sample_size = r.read_u64le()?;
    let crc32 = r.read_u32le()?;
    Ok(FileData {
        flags,
        app_name,
        file_name,
        sample_size,
        crc32,
    })
}

/// Encode an SRST payload. `big_length` widens `data_length` to u64 and is
/// set by the writer for samples of 2 GiB and up.
pub fn encode_track_data(track: &TrackData, big_length: bool) -> Vec<u8> {
    let big_number = track.number > 0xFFFF;
    let mut flags = 0u16;
    if big_length {
        flags |= TRACK_BIG_LENGTH;
    }
    if big_number {
        flags |= TRACK_BIG_NUMBER;
    }

    let mut out = Vec::with_capacity(24 + track.signature.len());
    out.write_u16::<LittleEndian>(flags).unwrap();
    if big_number {
        out.write_u32::<LittleEndian>(track.number).unwrap();
    } else {
        out.write_u16::<LittleEndian>(track.number as u16).unwrap();
    }
    if big_length {
        out.write_u64::<LittleEndian>(track.data_length).unwrap();
    } else {
        out.write_u32::<LittleEndian>(track.data_length as u32)
            .unwrap();
    }
    out.write_u64::<LittleEndian>(track.match_offset).unwrap();
    out.write_u16::<LittleEndian>(track.signature.len() as u16)
        .unwrap();
    out.extend_from_slice(&track.signature);
    out
}

/// Decode an SRST payload.
pub fn decode_track_data(payload: &[u8]) -> Result<TrackData> {
    let mut r = Region::new(payload);
    let flags = r.read_u16le()?;
    let number = if flags & TRACK_BIG_NUMBER != 0 {
        r.read_u32le()?
    } else {
        u32::from(r.read_u16le()?)
    };
    let data_length = if flags & TRACK_BIG_LENGTH != 0 {
        r.read_u64le()?
    } else {
        u64::from(r.read_u32le()?)
    };
    let match_offset = r.read_u64le()?;
    let sig_len = r.read_u16le()?;
    let signature = r.take(usize::from(sig_len))?.to_vec();
    Ok(TrackData {
        number,
        data_length,
        match_offset,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_data_round_trip() {
        let file = FileData {
            flags: FileData::DEFAULT_FLAGS,
            app_name: "rescene-rs 0.1.0".to_string(),
            file_name: "sample.mkv".to_string(),
            sample_size: 52_428_800,
            crc32: 0xDEADBEEF,
        };
        let encoded = encode_file_data(&file);
        assert_eq!(decode_file_data(&encoded).unwrap(), file);
    }

    #[test]
    fn track_data_round_trip_small() {
        let track = TrackData {
            number: 1,
            data_length: 512,
            match_offset: 48,
            signature: (0..=255u8).collect(),
        };
        let encoded = encode_track_data(&track, false);
        // flags(2) + number(2) + length(4) + offset(8) + siglen(2) + sig
        assert_eq!(encoded.len(), 18 + 256);
        assert_eq!(decode_track_data(&encoded).unwrap(), track);
    }

    #[test]
    fn track_data_round_trip_big_length() {
        let track = TrackData {
            number: 2,
            data_length: 5_000_000_000,
            match_offset: 0,
            signature: vec![0xAB; 16],
        };
        let encoded = encode_track_data(&track, true);
        let decoded = decode_track_data(&encoded).unwrap();
        assert_eq!(decoded.data_length, 5_000_000_000);
        assert_eq!(decoded, track);
    }

    #[test]
    fn big_track_numbers_widen_the_field() {
        let track = TrackData {
            number: 0x12345,
            data_length: 10,
            match_offset: 0,
            signature: vec![],
        };
        let encoded = encode_track_data(&track, false);
        let decoded = decode_track_data(&encoded).unwrap();
        assert_eq!(decoded.number, 0x12345);
    }
}
