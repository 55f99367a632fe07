//! Archive comments and RAR5 volumes through the whole pipeline.

mod common;

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use common::{FileSpec, crc32_hex, pattern};
use rescene_core::{CancelToken, NullSink};
use rescene_srr::{
    HashKind, ReconstructOptions, SrrInfo, SrrOptions, create_srr, reconstruct,
};

struct Setup {
    dir: tempfile::TempDir,
}

impl Setup {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// A RAR4 service block (type 0x7A) with the given sub-type in the name
/// field and a payload.
fn service_block(subtype: &str, payload: &[u8]) -> Vec<u8> {
    let mut h = common::file_header(&FileSpec {
        name: subtype,
        data: payload,
        flags: 0x8000, // LONG_BLOCK
        unpacked_size: payload.len() as u32,
    });
    h[2] = 0x7A;
    h.extend_from_slice(payload);
    h
}

#[test]
fn comment_payload_survives_the_round_trip() {
    let setup = Setup::new();
    let file_data = pattern(64, 1);
    let comment = b"Packed by a very proud group";

    let mut volume = Vec::new();
    volume.extend_from_slice(&common::RAR4_MARKER);
    volume.extend_from_slice(&common::archive_header());
    volume.extend_from_slice(&service_block("CMT", comment));
    volume.extend_from_slice(&common::file_header(&FileSpec::whole("a.bin", &file_data)));
    volume.extend_from_slice(&file_data);
    volume.extend_from_slice(&common::end_block());

    let volume_path = setup.write("c.rar", &volume);
    let srr_path = setup.path("c.srr");
    create_srr(
        &srr_path,
        &[volume_path],
        &[],
        &SrrOptions::default(),
        &NullSink,
        &CancelToken::new(),
    )
    .unwrap();

    // The comment bytes are embedded in the SRR
    let srr = fs::read(&srr_path).unwrap();
    assert!(
        srr.windows(comment.len()).any(|w| w == comment),
        "comment payload not embedded"
    );

    let input = setup.path("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("a.bin"), &file_data).unwrap();

    let hashes: HashSet<String> = [crc32_hex(&volume)].into_iter().collect();
    let matched = reconstruct(
        &ReconstructOptions {
            srr: &srr_path,
            input_dir: &input,
            output_dir: &setup.path("out"),
            volumes: &[],
            hashes: &hashes,
            hash_kind: HashKind::Crc32,
        },
        &NullSink,
        &CancelToken::new(),
    )
    .unwrap();

    assert!(matched);
    assert_eq!(fs::read(setup.path("out").join("c.rar")).unwrap(), volume);
}

#[test]
fn recovery_service_payload_is_dropped() {
    let setup = Setup::new();
    let recovery = pattern(128, 8);

    let mut volume = Vec::new();
    volume.extend_from_slice(&common::RAR4_MARKER);
    volume.extend_from_slice(&common::archive_header());
    volume.extend_from_slice(&service_block("RR", &recovery));
    volume.extend_from_slice(&common::end_block());

    let volume_path = setup.write("r.rar", &volume);
    let srr_path = setup.path("r.srr");
    create_srr(
        &srr_path,
        &[volume_path],
        &[],
        &SrrOptions::default(),
        &NullSink,
        &CancelToken::new(),
    )
    .unwrap();

    let srr = fs::read(&srr_path).unwrap();
    assert!(
        !srr.windows(recovery.len()).any(|w| w == recovery),
        "recovery payload must not be embedded"
    );
}

fn rar5_vint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

fn rar5_block(crc: u32, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&rar5_vint(content.len() as u64));
    out.extend_from_slice(content);
    out
}

/// A RAR5 volume with one stored file and an end block.
fn build_rar5_volume(name: &str, data: &[u8]) -> Vec<u8> {
    const RAR5_MARKER: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

    let mut vol = Vec::new();
    vol.extend_from_slice(&RAR5_MARKER);

    // Main archive header
    let mut content = rar5_vint(1); // type
    content.extend_from_slice(&rar5_vint(0)); // flags
    content.extend_from_slice(&rar5_vint(0)); // archive flags
    vol.extend_from_slice(&rar5_block(0x11111111, &content));

    // File header with a data area
    let mut content = rar5_vint(2);
    content.extend_from_slice(&rar5_vint(0x0002)); // data area present
    content.extend_from_slice(&rar5_vint(data.len() as u64));
    content.extend_from_slice(&rar5_vint(0)); // file flags
    content.extend_from_slice(&rar5_vint(data.len() as u64)); // unpacked
    content.extend_from_slice(&rar5_vint(0x20)); // attributes
    content.extend_from_slice(&rar5_vint(0)); // compression: store
    content.extend_from_slice(&rar5_vint(1)); // host os
    content.extend_from_slice(&rar5_vint(name.len() as u64));
    content.extend_from_slice(name.as_bytes());
    vol.extend_from_slice(&rar5_block(0x22222222, &content));
    vol.extend_from_slice(data);

    // End of archive
    let mut content = rar5_vint(5);
    content.extend_from_slice(&rar5_vint(0));
    content.extend_from_slice(&rar5_vint(0));
    vol.extend_from_slice(&rar5_block(0x33333333, &content));
    vol
}

#[test]
fn rar5_volume_round_trip() {
    let setup = Setup::new();
    let payload = pattern(2000, 2);
    let volume = build_rar5_volume("clip.mp4", &payload);
    let volume_path = setup.write("v5.rar", &volume);

    let srr_path = setup.path("v5.srr");
    let outcome = create_srr(
        &srr_path,
        &[volume_path],
        &[],
        &SrrOptions::default(),
        &NullSink,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(outcome.srr_size <= volume.len() as u64 + 200);

    let info = SrrInfo::read(&srr_path).unwrap();
    assert_eq!(info.rar_version, 50);
    assert_eq!(info.archived_files.len(), 1);
    assert_eq!(info.archived_files[0].name, "clip.mp4");
    assert_eq!(info.archived_files[0].unpacked_size, 2000);
    assert!(info.archived_files[0].stored);

    let input = setup.path("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("clip.mp4"), &payload).unwrap();

    let hashes: HashSet<String> = [crc32_hex(&volume)].into_iter().collect();
    let matched = reconstruct(
        &ReconstructOptions {
            srr: &srr_path,
            input_dir: &input,
            output_dir: &setup.path("out"),
            volumes: &[],
            hashes: &hashes,
            hash_kind: HashKind::Crc32,
        },
        &NullSink,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(matched);
    assert_eq!(fs::read(setup.path("out").join("v5.rar")).unwrap(), volume);
}
