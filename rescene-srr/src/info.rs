//! Summary view over an SRR file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::{
    Result,
    rar4, rar5,
    reader::{SrrEntry, SrrReader},
    scanner::RarVersion,
};

/// One archived file described by the copied RAR headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub name: String,
    pub unpacked_size: u64,
    pub file_crc: u32,
    pub method: u8,
    pub stored: bool,
}

/// An ISDb hash record carried by the SRR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsoHashEntry {
    pub name: String,
    pub file_size: u64,
    pub hash: u64,
}

/// Everything a host lists about an SRR before reconstructing from it.
#[derive(Debug, Clone, Default)]
pub struct SrrInfo {
    pub app_name: Option<String>,
    pub stored_files: Vec<String>,
    pub oso_hashes: Vec<OsoHashEntry>,
    /// Volume names in SRR order.
    pub rar_files: Vec<String>,
    pub archived_files: Vec<ArchivedFile>,
    /// Highest unpack version required by any archived file (RAR4 scale;
    /// 50 for RAR5 volumes).
    pub rar_version: u8,
    /// Host OS byte of the first archived file header.
    pub host_os: Option<u8>,
    /// True when any archived file uses a compression method other than
    /// store.
    pub has_compressed_files: bool,
}

impl SrrInfo {
    pub fn read(path: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        let mut reader = SrrReader::open(file, path)?;
        let mut info = Self::default();

        while let Some(entry) = reader.next_entry()? {
            match entry {
                SrrEntry::Header { app_name } => info.app_name = app_name,
                SrrEntry::StoredFile { name, .. } => info.stored_files.push(name),
                SrrEntry::OsoHash {
                    name,
                    file_size,
                    hash,
                } => info.oso_hashes.push(OsoHashEntry {
                    name,
                    file_size,
                    hash,
                }),
                SrrEntry::RarFile { name, .. } => info.rar_files.push(name),
                SrrEntry::RarPadding { .. } => {}
                SrrEntry::RarBlock {
                    version: RarVersion::Rar4,
                    block_type,
                    header,
                    ..
                } if block_type == u64::from(rar4::block_type::FILE) => {
                    let view = rar4::FileHeaderView::parse(&header)?;
                    info.rar_version = info.rar_version.max(view.unpack_version);
                    info.host_os.get_or_insert(view.host_os);
                    if !view.split_before() {
                        info.has_compressed_files |= !view.is_stored();
                        info.archived_files.push(ArchivedFile {
                            name: view.name,
                            unpacked_size: view.unpacked_size,
                            file_crc: view.file_crc,
                            method: view.method,
                            stored: view.method == rar4::METHOD_STORE,
                        });
                    }
                }
                SrrEntry::RarBlock {
                    version: RarVersion::Rar5,
                    block_type,
                    header,
                    ..
                } if block_type == rar5::block_type::FILE => {
                    let view = rar5::FileHeaderView::parse(&header)?;
                    info.rar_version = info.rar_version.max(50);
                    info.host_os.get_or_insert(view.host_os as u8);
                    if !view.common.split_before() {
                        let stored = view.is_stored();
                        info.has_compressed_files |= !stored;
                        info.archived_files.push(ArchivedFile {
                            name: view.name,
                            unpacked_size: view.unpacked_size,
                            file_crc: view.file_crc.unwrap_or(0),
                            method: view.method,
                            stored,
                        });
                    }
                }
                SrrEntry::RarBlock { .. } => {}
            }
        }
        Ok(info)
    }
}
