//! SRS creation: profile a sample, then mirror its container with the
//! payloads replaced by descriptors.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rescene_core::{CancelToken, Progress, ProgressSink};
use tracing::{debug, info};

use crate::{
    Error, Result, avi, flac,
    format::{ContainerType, detect_container},
    mkv, mp3, mp4, stream,
    track::{FileData, Profile},
    wmv,
};

/// App name written when the caller does not supply one.
pub const DEFAULT_APP_NAME: &str = concat!("rescene-rs ", env!("CARGO_PKG_VERSION"));

/// Options for [`create_srs`].
#[derive(Debug, Clone)]
pub struct SrsOptions {
    /// Application name recorded in the SRSF descriptor.
    pub app_name: String,
}

impl Default for SrsOptions {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }
}

/// Result of a successful [`create_srs`].
#[derive(Debug, Clone)]
pub struct CreateSrsOutcome {
    pub output: PathBuf,
    pub container: ContainerType,
    pub track_count: usize,
    pub sample_crc32: u32,
    pub sample_size: u64,
    pub srs_size: u64,
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

/// Profile a sample file and write its SRS mirror.
pub fn create_srs(
    output: &Path,
    sample: &Path,
    options: &SrsOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<CreateSrsOutcome> {
    let container = detect_container(sample)?;
    let data = fs::read(sample)?;
    debug!(
        "{}: {container}, {} bytes",
        sample.display(),
        data.len()
    );

    check_cancel(cancel)?;
    progress.report(&Progress::new(0, 2, format!("profiling {container} sample")));
    let profile = profile_container(container, &data)?;
    if profile.parsed_size != data.len() as u64 {
        return Err(Error::Malformed(format!(
            "profiled {} of {} bytes",
            profile.parsed_size,
            data.len()
        )));
    }
    if profile.tracks.is_empty() {
        return Err(Error::NoTracks(sample.to_path_buf()));
    }

    let mut warnings = Vec::new();
    for track in &profile.tracks {
        if track.data_length == 0 {
            warnings.push(format!("track {} carries no data", track.number));
        }
    }

    let file_name = sample
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = FileData {
        flags: FileData::DEFAULT_FLAGS,
        app_name: options.app_name.clone(),
        file_name,
        sample_size: data.len() as u64,
        crc32: profile.crc32,
    };

    check_cancel(cancel)?;
    progress.report(&Progress::new(1, 2, "writing SRS"));
    let (guard, mut out) = OutputGuard::create(output)?;
    write_container(container, &data, &file, &profile, &mut out)?;
    out.flush()?;
    drop(out);
    check_cancel(cancel)?;

    let srs_size = fs::metadata(output)?.len();
    guard.keep();
    progress.report(&Progress::new(2, 2, "done"));
    info!(
        "wrote {} ({srs_size} bytes, {} tracks)",
        output.display(),
        profile.tracks.len()
    );

    Ok(CreateSrsOutcome {
        output: output.to_path_buf(),
        container,
        track_count: profile.tracks.len(),
        sample_crc32: profile.crc32,
        sample_size: data.len() as u64,
        srs_size,
        warnings,
    })
}

fn profile_container(container: ContainerType, data: &[u8]) -> Result<Profile> {
    match container {
        ContainerType::Avi => avi::profile(data),
        ContainerType::Mkv => mkv::profile(data),
        ContainerType::Mp4 => mp4::profile(data),
        ContainerType::Wmv => wmv::profile(data),
        ContainerType::Flac => flac::profile(data),
        ContainerType::Mp3 => mp3::profile(data),
        ContainerType::Stream => stream::profile(data),
    }
}

fn write_container<W: Write>(
    container: ContainerType,
    data: &[u8],
    file: &FileData,
    profile: &Profile,
    out: &mut W,
) -> Result<()> {
    match container {
        ContainerType::Avi => avi::write_srs(data, file, &profile.tracks, out),
        ContainerType::Mkv => mkv::write_srs(data, file, &profile.tracks, out),
        ContainerType::Mp4 => mp4::write_srs(data, file, &profile.tracks, out),
        ContainerType::Wmv => wmv::write_srs(data, file, &profile.tracks, out),
        ContainerType::Flac => flac::write_srs(data, file, &profile.tracks, out),
        ContainerType::Mp3 => mp3::write_srs(data, file, &profile.tracks, out),
        ContainerType::Stream => stream::write_srs(data, file, &profile.tracks, out),
    }
}

fn check_cancel(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
