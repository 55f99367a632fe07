//! SRR creation: copy RAR block headers verbatim, drop file payloads.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rescene_core::{CancelToken, Progress, ProgressSink};
use tracing::{debug, info, warn};

use crate::{
    Error, Result, block,
    oso::OsoAccumulator,
    rar4, rar5,
    scanner::{RarScanner, RarVersion},
    volume,
};

/// App name written when the caller does not supply one.
pub const DEFAULT_APP_NAME: &str = concat!("rescene-rs ", env!("CARGO_PKG_VERSION"));

/// Options for [`create_srr`].
#[derive(Debug, Clone)]
pub struct SrrOptions {
    /// Application name recorded in the SRR header block.
    pub app_name: String,
    /// Accept volumes whose archived files are compressed. When false,
    /// compressed files produce warnings (reconstruction from plain source
    /// files will not be possible for them).
    pub allow_compressed: bool,
    /// Keep the caller-supplied path of stored files instead of reducing
    /// them to their basename.
    pub store_paths: bool,
    /// Compute ISDb hashes of stored (uncompressed) archived files and
    /// emit `SrrOsoHash` blocks. Costs an extra pass over the volumes.
    pub compute_oso_hashes: bool,
}

impl Default for SrrOptions {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            allow_compressed: false,
            store_paths: false,
            compute_oso_hashes: false,
        }
    }
}

/// Result of a successful [`create_srr`].
#[derive(Debug, Clone)]
pub struct CreateSrrOutcome {
    pub output: PathBuf,
    pub volume_count: usize,
    pub stored_file_count: usize,
    pub srr_size: u64,
    pub warnings: Vec<String>,
}

/// Deletes the output file unless the operation completes.
struct OutputGuard {
    path: PathBuf,
    keep: bool,
}

impl OutputGuard {
    fn create(path: &Path) -> Result<(Self, BufWriter<File>)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                keep: false,
            },
            BufWriter::new(file),
        ))
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Write an SRR file for a set of RAR volumes.
///
/// Stored files are embedded first, then each volume's block stream is
/// copied with file payloads dropped and archive-comment payloads kept.
/// The partial output is removed on any error or cancellation.
pub fn create_srr(
    output: &Path,
    volumes: &[PathBuf],
    stored_files: &[(String, PathBuf)],
    options: &SrrOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<CreateSrrOutcome> {
    for path in volumes.iter().chain(stored_files.iter().map(|(_, p)| p)) {
        if !path.is_file() {
            return Err(Error::NotFound(path.clone()));
        }
    }

    let (guard, mut out) = OutputGuard::create(output)?;
    let mut warnings = Vec::new();

    block::write_srr_header(&mut out, Some(&options.app_name))?;

    for (name, path) in stored_files {
        check_cancel(cancel)?;
        let data = fs::read(path)?;
        let stored_name = if options.store_paths {
            name.as_str()
        } else {
            basename(name)
        };
        debug!("storing {stored_name} ({} bytes)", data.len());
        block::write_stored_file(&mut out, stored_name, &data)?;
    }

    if options.compute_oso_hashes {
        for acc in collect_oso_hashes(volumes, cancel)? {
            block::write_oso_hash(&mut out, acc.file_size, acc.finalize(), &acc.name)?;
        }
    }

    for (index, path) in volumes.iter().enumerate() {
        check_cancel(cancel)?;
        progress.report(&Progress::new(
            index as u64,
            volumes.len() as u64,
            format!("processing {}", path.display()),
        ));
        copy_volume(path, &mut out, options, cancel, &mut warnings)?;
    }
    progress.report(&Progress::new(
        volumes.len() as u64,
        volumes.len() as u64,
        "done",
    ));

    out.flush()?;
    drop(out);
    let srr_size = fs::metadata(output)?.len();
    guard.keep();
    info!(
        "wrote {} ({srr_size} bytes, {} volumes)",
        output.display(),
        volumes.len()
    );

    Ok(CreateSrrOutcome {
        output: output.to_path_buf(),
        volume_count: volumes.len(),
        stored_file_count: stored_files.len(),
        srr_size,
        warnings,
    })
}

/// Copy one volume's marker and block headers into the SRR.
fn copy_volume(
    path: &Path,
    out: &mut BufWriter<File>,
    options: &SrrOptions,
    cancel: &CancelToken,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    block::write_rar_file(out, &name)?;

    let file = File::open(path)?;
    let mut scanner = match RarScanner::open(file) {
        Err(Error::NotRar(_)) => return Err(Error::NotRar(path.to_path_buf())),
        other => other?,
    };
    out.write_all(scanner.marker())?;

    while let Some(scanned) = scanner.next_block()? {
        check_cancel(cancel)?;
        out.write_all(&scanned.header)?;

        if scanned.version == RarVersion::Rar4
            && scanned.block_type == u64::from(rar4::block_type::FILE)
        {
            let view = rar4::FileHeaderView::parse(&scanned.header)?;
            if !view.is_stored() && !options.allow_compressed {
                warnings.push(format!(
                    "{name}: {} uses compression method {:#04x}",
                    view.name, view.method
                ));
            }
        }
        if scanned.version == RarVersion::Rar5 && scanned.block_type == rar5::block_type::FILE {
            let view = rar5::FileHeaderView::parse(&scanned.header)?;
            if !view.is_stored() && !options.allow_compressed {
                warnings.push(format!("{name}: {} is compressed", view.name));
            }
        }

        let keep = block::stored_payload_size(
            scanned.version,
            scanned.block_type,
            &scanned.header,
            scanned.payload_size,
        );
        if keep > 0 {
            scanner.copy_payload(keep, out)?;
        }
        // Remaining payload bytes are skipped before the next block
    }

    if let Some(warning) = scanner.warning() {
        warnings.push(format!("{name}: {warning}"));
    }

    // Zero padding after the last block is preserved by count; anything
    // else trailing cannot be reproduced and becomes a warning.
    let trailing = scanner.trailing_bytes();
    if trailing > 0 && scanner.warning().is_none() {
        let bytes = scanner.read_trailing()?;
        if bytes.iter().all(|&b| b == 0) {
            debug!("{name}: preserving {trailing} bytes of zero padding");
            block::write_rar_padding(out, &name, trailing as u32)?;
        } else {
            warn!("{name}: dropping {trailing} trailing non-zero bytes");
            warnings.push(format!(
                "{name}: {trailing} trailing bytes after the last block were dropped"
            ));
        }
    }
    Ok(())
}

/// Pre-scan pass feeding stored file payloads into per-file accumulators.
fn collect_oso_hashes(
    volumes: &[PathBuf],
    cancel: &CancelToken,
) -> Result<Vec<OsoAccumulator>> {
    let mut order = Vec::new();
    let mut accs: HashMap<String, OsoAccumulator> = HashMap::new();

    for path in volumes {
        let file = File::open(path)?;
        let mut scanner = match RarScanner::open(file) {
            Err(Error::NotRar(_)) => return Err(Error::NotRar(path.clone())),
            other => other?,
        };
        while let Some(scanned) = scanner.next_block()? {
            check_cancel(cancel)?;
            if scanned.version != RarVersion::Rar4
                || scanned.block_type != u64::from(rar4::block_type::FILE)
            {
                continue;
            }
            let view = rar4::FileHeaderView::parse(&scanned.header)?;
            if !view.is_stored() {
                continue;
            }
            let acc = accs.entry(view.name.clone()).or_insert_with(|| {
                order.push(view.name.clone());
                OsoAccumulator::new(&view.name, view.unpacked_size)
            });
            scanner.copy_payload(scanned.payload_size, acc)?;
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|name| accs.remove(&name))
        .collect())
}

/// Build an SRR from an SFV file: the listed volumes (in volume order)
/// plus the SFV itself and any extra files stored alongside.
pub fn create_srr_from_sfv(
    output: &Path,
    sfv: &Path,
    extra_files: &[(String, PathBuf)],
    options: &SrrOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<CreateSrrOutcome> {
    let (entries, mut warnings) = volume::read_sfv(sfv)?;
    let base = sfv.parent().unwrap_or(Path::new(""));

    let mut names: Vec<String> = Vec::new();
    for entry in &entries {
        if volume::is_volume_name(&entry.name) {
            names.push(entry.name.clone());
        } else {
            warnings.push(format!("SFV entry is not a RAR volume: {}", entry.name));
        }
    }
    names.sort_by(|a, b| volume::compare_volume_names(a, b));
    let volumes: Vec<PathBuf> = names.iter().map(|n| base.join(n)).collect();

    let sfv_name = sfv
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut stored: Vec<(String, PathBuf)> = vec![(sfv_name, sfv.to_path_buf())];
    stored.extend(extra_files.iter().cloned());

    let mut outcome = create_srr(output, &volumes, &stored, options, progress, cancel)?;
    warnings.append(&mut outcome.warnings);
    outcome.warnings = warnings;
    Ok(outcome)
}

fn check_cancel(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
