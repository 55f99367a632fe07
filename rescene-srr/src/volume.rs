//! RAR volume naming: ordering, detection, and SFV-driven selection.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use tracing::trace;

use crate::{Error, Result};

/// Sort key for one volume filename.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VolumeKey {
    /// `name.partNN.rar` numbering.
    Part(u32),
    /// Classic `.rar`, `.r00` ... `.s99` extension ladder.
    Classic(i32),
    /// Plain numeric extensions `.001`, `.002`, ...
    Numeric(u32),
    /// Anything else; compared lexicographically.
    Other(String),
}

fn volume_key(name: &str) -> VolumeKey {
    let lower = name.to_ascii_lowercase();

    if let Some(number) = part_number(&lower) {
        return VolumeKey::Part(number);
    }

    let ext = match lower.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return VolumeKey::Other(lower),
    };

    if ext == "rar" {
        // Plain .rar precedes the whole .r00 ladder
        return VolumeKey::Classic(-1);
    }
    if ext.len() == 3 && ext.chars().all(|c| c.is_ascii_digit()) {
        return VolumeKey::Numeric(ext.parse().unwrap_or(0));
    }
    let mut chars = ext.chars();
    if let (Some(letter), Some(d0), Some(d1), None) =
        (chars.next(), chars.next(), chars.next(), chars.next())
    {
        if letter.is_ascii_lowercase() && d0.is_ascii_digit() && d1.is_ascii_digit() {
            let digits = (d0 as i32 - '0' as i32) * 10 + (d1 as i32 - '0' as i32);
            return VolumeKey::Classic((letter as i32 - 'r' as i32) * 100 + digits);
        }
    }
    VolumeKey::Other(lower)
}

/// `name.partNN.rar` -> NN.
fn part_number(lower: &str) -> Option<u32> {
    let stem = lower.strip_suffix(".rar")?;
    let (_, part) = stem.rsplit_once('.')?;
    let digits = part.strip_prefix("part")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Total order over RAR volume filenames.
///
/// `.rar` sorts before `.r00` .. `.r99` .. `.s00`; `.partNN.rar` and plain
/// numeric `.001` sets sort by their numbers. Filenames from different
/// schemes (or outside any scheme) fall back to a case-insensitive
/// lexicographic comparison.
pub fn compare_volume_names(a: &str, b: &str) -> Ordering {
    match (volume_key(a), volume_key(b)) {
        (VolumeKey::Part(x), VolumeKey::Part(y)) => x.cmp(&y),
        (VolumeKey::Classic(x), VolumeKey::Classic(y)) => x.cmp(&y),
        (VolumeKey::Numeric(x), VolumeKey::Numeric(y)) => x.cmp(&y),
        _ => a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()),
    }
    .then_with(|| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
}

/// True when the filename looks like a RAR volume of any naming scheme.
pub fn is_volume_name(name: &str) -> bool {
    matches!(
        volume_key(name),
        VolumeKey::Part(_) | VolumeKey::Classic(_) | VolumeKey::Numeric(_)
    )
}

/// One `name crc32` line of an SFV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfvEntry {
    pub name: String,
    pub crc32: String,
}

/// Read the entries of an SFV file. Comment lines (`;`) and blank lines
/// are ignored; a line without a trailing 8-digit hex field is skipped with
/// a warning entry left to the caller.
pub fn read_sfv(path: &Path) -> Result<(Vec<SfvEntry>, Vec<String>)> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let raw = fs::read(path)?;
    // SFVs are ASCII in practice; tolerate stray bytes
    let text = String::from_utf8_lossy(&raw);

    let mut entries = Vec::new();
    let mut warnings = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let Some((name, crc)) = line.rsplit_once(char::is_whitespace) else {
            warnings.push(format!("unparsable SFV line: {line:?}"));
            continue;
        };
        let crc = crc.trim();
        if crc.len() != 8 || !crc.chars().all(|c| c.is_ascii_hexdigit()) {
            warnings.push(format!("bad checksum field in SFV line: {line:?}"));
            continue;
        }
        trace!("sfv entry {name} {crc}");
        entries.push(SfvEntry {
            name: name.trim().to_string(),
            crc32: crc.to_ascii_lowercase(),
        });
    }
    Ok((entries, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut names: Vec<&str>) -> Vec<&str> {
        names.sort_by(|a, b| compare_volume_names(a, b));
        names
    }

    #[test]
    fn classic_ladder_order() {
        assert_eq!(
            sorted(vec!["x.r01", "x.s00", "x.rar", "x.r99", "x.r00"]),
            vec!["x.rar", "x.r00", "x.r01", "x.r99", "x.s00"]
        );
    }

    #[test]
    fn part_numbering_order() {
        assert_eq!(
            sorted(vec!["m.part03.rar", "m.part1.rar", "m.part02.rar"]),
            vec!["m.part1.rar", "m.part02.rar", "m.part03.rar"]
        );
    }

    #[test]
    fn numeric_extension_order() {
        assert_eq!(
            sorted(vec!["a.010", "a.002", "a.001"]),
            vec!["a.001", "a.002", "a.010"]
        );
    }

    #[test]
    fn plain_rar_is_not_a_part_volume() {
        // No .partNN. component: falls into the classic scheme
        assert!(matches!(volume_key("movie.rar"), VolumeKey::Classic(-1)));
        assert!(matches!(volume_key("movie.part2.rar"), VolumeKey::Part(2)));
    }

    #[test]
    fn volume_detection() {
        assert!(is_volume_name("a.rar"));
        assert!(is_volume_name("a.r00"));
        assert!(is_volume_name("a.part01.rar"));
        assert!(is_volume_name("a.001"));
        assert!(!is_volume_name("a.nfo"));
        assert!(!is_volume_name("a.sfv"));
        assert!(!is_volume_name("readme"));
    }

    #[test]
    fn sfv_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let sfv = dir.path().join("release.sfv");
        std::fs::write(
            &sfv,
            "; comment line\n\
             \n\
             group-movie.rar AABBCCDD\n\
             group-movie.r00 00112233\n\
             broken line without checksum\n",
        )
        .unwrap();

        let (entries, warnings) = read_sfv(&sfv).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "group-movie.rar");
        assert_eq!(entries[0].crc32, "aabbccdd");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn missing_sfv_is_not_found() {
        let err = read_sfv(Path::new("/nonexistent/x.sfv"));
        assert!(matches!(err, Err(Error::NotFound(_))));
    }
}
