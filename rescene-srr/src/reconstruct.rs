//! Reconstruction of RAR volumes from an SRR and the original files.
//!
//! The SRR stream is replayed block by block; wherever a file payload was
//! dropped at creation time, the matching source file is spliced back in.
//! Multi-volume files keep one source open across SPLIT_AFTER/SPLIT_BEFORE
//! transitions until their final chunk is consumed.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use rescene_core::{CancelToken, Progress, ProgressSink};
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    hash::{HashKind, hash_file},
    rar4, rar5,
    reader::{SrrEntry, SrrReader},
    scanner::RarVersion,
};

/// Buffered copy size; cancellation is polled once per chunk.
const COPY_CHUNK: usize = 0x14000;

/// Inputs of [`reconstruct`].
pub struct ReconstructOptions<'a> {
    pub srr: &'a Path,
    /// Directory holding the original (extracted) files.
    pub input_dir: &'a Path,
    /// Directory the volumes are written into.
    pub output_dir: &'a Path,
    /// Limit reconstruction to these volume names (case-insensitive).
    /// Empty means every volume in the SRR.
    pub volumes: &'a [String],
    /// Expected volume digests, lowercase hex. Empty disables verification.
    pub hashes: &'a HashSet<String>,
    pub hash_kind: HashKind,
}

/// The volume currently being written.
struct OpenVolume {
    out: BufWriter<File>,
    path: PathBuf,
    name: String,
}

/// The archived file currently being spliced.
struct OpenSource {
    reader: BufReader<File>,
    name: String,
}

/// Replay an SRR into RAR volumes. Returns true when every produced volume
/// matched a digest in the supplied set (vacuously true when the set is
/// empty); a mismatch is reported and reconstruction continues.
pub fn reconstruct(
    options: &ReconstructOptions<'_>,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<bool> {
    if !options.srr.is_file() {
        return Err(Error::NotFound(options.srr.to_path_buf()));
    }
    fs::create_dir_all(options.output_dir)?;

    let file = BufReader::new(File::open(options.srr)?);
    let mut reader = SrrReader::open(file, options.srr)?;

    let mut volume: Option<OpenVolume> = None;
    match replay(&mut reader, options, progress, cancel, &mut volume) {
        Ok(matched) => Ok(matched),
        Err(err) => {
            // The volume being written when the error hit is incomplete
            discard(volume.take());
            Err(err)
        }
    }
}

fn replay<R: Read + Seek>(
    reader: &mut SrrReader<R>,
    options: &ReconstructOptions<'_>,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
    volume: &mut Option<OpenVolume>,
) -> Result<bool> {
    let mut source: Option<OpenSource> = None;
    let mut skipping_volume = false;
    let mut all_matched = true;
    let mut completed: u64 = 0;

    while let Some(entry) = reader.next_entry()? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match entry {
            SrrEntry::Header { .. } | SrrEntry::StoredFile { .. } | SrrEntry::OsoHash { .. } => {}
            SrrEntry::RarFile { name, marker, .. } => {
                all_matched &= finish_volume(volume.take(), options)?;
                completed += 1;
                progress.report(&Progress::new(completed, 0, format!("volume {name}")));

                skipping_volume = !selected(&name, options.volumes);
                if skipping_volume {
                    debug!("skipping volume {name}");
                    continue;
                }
                let path = options.output_dir.join(&name);
                let out = BufWriter::new(File::create(&path)?);
                let mut open = OpenVolume { out, path, name };
                open.out.write_all(&marker)?;
                *volume = Some(open);
            }
            SrrEntry::RarPadding { pad_size, .. } => {
                if let Some(open) = volume.as_mut() {
                    write_zeros(&mut open.out, u64::from(pad_size))?;
                }
            }
            SrrEntry::RarBlock {
                version,
                block_type,
                flags,
                header,
                payload_size,
                stored_size,
            } => {
                if skipping_volume || volume.is_none() {
                    continue;
                }
                let open = volume.as_mut().unwrap();
                open.out.write_all(&header)?;

                let is_file = match version {
                    RarVersion::Rar4 => block_type == u64::from(rar4::block_type::FILE),
                    RarVersion::Rar5 => block_type == rar5::block_type::FILE,
                };
                if is_file {
                    let splice = match version {
                        RarVersion::Rar4 => {
                            let view = rar4::FileHeaderView::parse(&header)?;
                            let split_before = view.split_before();
                            let split_after = view.split_after();
                            SpliceRequest {
                                name: view.name,
                                size: view.packed_size,
                                split_before,
                                split_after,
                            }
                        }
                        RarVersion::Rar5 => {
                            let view = rar5::FileHeaderView::parse(&header)?;
                            SpliceRequest {
                                name: view.name,
                                size: view.common.data_size,
                                split_before: view.common.split_before(),
                                split_after: view.common.split_after(),
                            }
                        }
                    };
                    splice_file(&splice, &mut source, open, options, cancel)?;
                } else if stored_size > 0 {
                    // Comment and legacy payloads come back out of the SRR
                    reader.copy_pending(stored_size, &mut open.out)?;
                } else if payload_size > 0 {
                    // Recovery-style service payloads were not stored and
                    // cannot be regenerated here
                    warn!(
                        "block type {block_type:#x} (flags {flags:#x}) lost {payload_size} payload bytes"
                    );
                }
            }
        }
    }

    all_matched &= finish_volume(volume.take(), options)?;
    Ok(all_matched)
}

struct SpliceRequest {
    name: String,
    size: u64,
    split_before: bool,
    split_after: bool,
}

/// Copy `size` bytes of the archived file into the volume, opening or
/// reusing the source stream according to the split flags.
fn splice_file(
    request: &SpliceRequest,
    source: &mut Option<OpenSource>,
    volume: &mut OpenVolume,
    options: &ReconstructOptions<'_>,
    cancel: &CancelToken,
) -> Result<()> {
    let same = source
        .as_ref()
        .is_some_and(|s| s.name.eq_ignore_ascii_case(&request.name));

    if !request.split_before && !same {
        *source = None;
        let path = locate_source(options.input_dir, &request.name)
            .ok_or_else(|| Error::SourceNotFound(request.name.clone()))?;
        debug!("splicing {} from {}", request.name, path.display());
        *source = Some(OpenSource {
            reader: BufReader::new(File::open(&path)?),
            name: request.name.clone(),
        });
    } else if request.split_before && !same {
        // Continuation without the earlier volumes: start the source from
        // the beginning of wherever the set left off is unknowable, so the
        // file is opened fresh and a mismatch will surface in the digests.
        warn!("{}: continuation without an open source", request.name);
        let path = locate_source(options.input_dir, &request.name)
            .ok_or_else(|| Error::SourceNotFound(request.name.clone()))?;
        *source = Some(OpenSource {
            reader: BufReader::new(File::open(&path)?),
            name: request.name.clone(),
        });
    }

    if request.size > 0 {
        let open = source
            .as_mut()
            .ok_or_else(|| Error::SourceNotFound(request.name.clone()))?;
        let mut remaining = request.size;
        let mut buf = vec![0u8; COPY_CHUNK];
        while remaining > 0 {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let want = remaining.min(buf.len() as u64) as usize;
            let got = open.reader.read(&mut buf[..want])?;
            if got == 0 {
                return Err(Error::SourceExhausted {
                    name: request.name.clone(),
                    missing: remaining,
                });
            }
            volume.out.write_all(&buf[..got])?;
            remaining -= got as u64;
        }
    }

    if !request.split_after {
        *source = None;
    }
    Ok(())
}

/// Close a finished volume and verify its digest.
fn finish_volume(volume: Option<OpenVolume>, options: &ReconstructOptions<'_>) -> Result<bool> {
    let Some(mut open) = volume else {
        return Ok(true);
    };
    open.out.flush()?;
    drop(open.out);

    if options.hashes.is_empty() {
        return Ok(true);
    }
    let digest = hash_file(&open.path, options.hash_kind)?;
    if options.hashes.contains(&digest) {
        info!("{}: digest {digest} verified", open.name);
        Ok(true)
    } else {
        warn!("{}: digest {digest} not in the supplied set", open.name);
        Ok(false)
    }
}

fn discard(volume: Option<OpenVolume>) {
    if let Some(open) = volume {
        drop(open.out);
        let _ = fs::remove_file(&open.path);
    }
}

fn selected(name: &str, volumes: &[String]) -> bool {
    volumes.is_empty() || volumes.iter().any(|v| v.eq_ignore_ascii_case(name))
}

fn write_zeros<W: Write>(out: &mut W, mut n: u64) -> Result<()> {
    let zeros = [0u8; 4096];
    while n > 0 {
        let want = n.min(zeros.len() as u64) as usize;
        out.write_all(&zeros[..want])?;
        n -= want as u64;
    }
    Ok(())
}

/// Locate the original file for an archived name.
///
/// Tries the relative path as archived, then the bare filename, then a
/// case-insensitive recursive search.
fn locate_source(input_dir: &Path, archived_name: &str) -> Option<PathBuf> {
    let normalized = archived_name.replace('\\', std::path::MAIN_SEPARATOR_STR);
    let relative = input_dir.join(&normalized);
    if relative.is_file() {
        return Some(relative);
    }

    let base = Path::new(&normalized)
        .file_name()?
        .to_string_lossy()
        .into_owned();
    let flattened = input_dir.join(&base);
    if flattened.is_file() {
        return Some(flattened);
    }

    // Prefer the archived subdirectory when it exists
    let search_root = match Path::new(&normalized).parent() {
        Some(parent) if !parent.as_os_str().is_empty() && input_dir.join(parent).is_dir() => {
            input_dir.join(parent)
        }
        _ => input_dir.to_path_buf(),
    };
    find_case_insensitive(&search_root, &base)
}

fn find_case_insensitive(dir: &Path, base: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            if entry
                .file_name()
                .to_string_lossy()
                .eq_ignore_ascii_case(base)
            {
                return Some(path);
            }
        } else if path.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs
        .into_iter()
        .find_map(|sub| find_case_insensitive(&sub, base))
}
