use std::fmt::{self, Write as _};

use chrono::NaiveDateTime;

use crate::format::Format;

/// What an archive record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
    Link,
    Symlink,
    Char,
    Block,
    Fifo,
    Contiguous,
}

impl EntryType {
    /// Only regular files and directories are written to disk.
    pub fn is_materialized(self) -> bool {
        matches!(self, Self::File | Self::Directory)
    }
}

/// Per-entry compression as recorded in a ZIP header. TAR entries are always `Stored`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Bzip2,
    Other(u16),
}

impl CompressionMethod {
    pub fn from_zip_code(code: u16) -> Self {
        match code {
            0 => Self::Stored,
            8 => Self::Deflated,
            12 => Self::Bzip2,
            other => Self::Other(other),
        }
    }

    pub fn zip_code(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
            Self::Bzip2 => 12,
            Self::Other(code) => code,
        }
    }
}

/// Unix permission bits plus the entry type, rendered `ls -l` style.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permissions {
    pub mode: u32,
    pub directory: bool,
}

impl Permissions {
    pub fn new(mode: u32, directory: bool) -> Self {
        Self { mode, directory }
    }

    pub fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const BITS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];
        f.write_char(if self.directory { 'd' } else { '-' })?;
        for (bit, c) in BITS {
            f.write_char(if self.mode & bit != 0 { c } else { '-' })?;
        }
        Ok(())
    }
}

/// One parsed archive record. Immutable once a codec has produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub size: u64,
    pub compressed_size: u64,
    pub compression: CompressionMethod,
    pub modified_at: Option<NaiveDateTime>,
    pub crc32: u32,
    /// `None` when the archive carries no usable mode information.
    pub permissions: Option<Permissions>,
    /// Absolute offset of the entry payload inside the archive buffer.
    pub payload_offset: u64,
    pub link_target: Option<String>,
    /// ZIP internal attribute bit 0; always `false` for TAR.
    pub is_text: bool,
}

impl ArchiveEntry {
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn mode(&self) -> Option<u32> {
        self.permissions.map(|p| p.mode)
    }
}

/// Entries in on-disk record order. Duplicate names are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub format: Format,
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveMetadata {
    pub fn new(format: Format, entries: Vec<ArchiveEntry>) -> Self {
        Self { format, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArchiveEntry> {
        self.entries.iter()
    }

    pub fn find(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }
}

impl<'a> IntoIterator for &'a ArchiveMetadata {
    type Item = &'a ArchiveEntry;
    type IntoIter = std::slice::Iter<'a, ArchiveEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A named buffer to be written into a new archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}
