//! From-scratch central directory walk.

use tracing::{debug, warn};

use super::dostime::DosTimestamp;
use crate::binary::{self, BinaryReader};
use crate::codec::{self, Unpacker, bzip2};
use crate::entry::{ArchiveEntry, ArchiveMetadata, CompressionMethod, EntryType, Permissions};
use crate::error::{Error, Result};
use crate::format::Format;

pub const EOCD_SIGNATURE: &[u8; 4] = b"PK\x05\x06";
pub const CENTRAL_SIGNATURE: &[u8; 4] = b"PK\x01\x02";
pub const LOCAL_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

pub const EOCD_LEN: usize = 22;
pub const CENTRAL_LEN: usize = 46;
pub const LOCAL_LEN: usize = 30;

pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_UTF8: u16 = 0x0800;

const HOST_UNIX: u16 = 3;
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;
const DOS_READONLY: u32 = 0x01;
const DOS_DIRECTORY: u32 = 0x10;

const ZIP64_U16: u16 = 0xffff;
const ZIP64_U32: u32 = 0xffff_ffff;

/// The End-Of-Central-Directory fields this reader uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub offset: usize,
    pub total_entries: u16,
    pub directory_size: u32,
    pub directory_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    /// Locate the record by its last signature match in the buffer.
    pub fn locate(data: &[u8]) -> Result<Self> {
        let r = BinaryReader::new(data);
        let offset = r
            .rfind(EOCD_SIGNATURE)
            .ok_or_else(|| Error::corrupt("end of central directory record not found"))?;

        let eocd = Self {
            offset,
            total_entries: r.u16_le(offset + 10)?,
            directory_size: r.u32_le(offset + 12)?,
            directory_offset: r.u32_le(offset + 16)?,
            comment_len: r.u16_le(offset + 20)?,
        };
        r.bytes(offset + EOCD_LEN, usize::from(eocd.comment_len))?;

        if eocd.total_entries == ZIP64_U16
            || eocd.directory_size == ZIP64_U32
            || eocd.directory_offset == ZIP64_U32
        {
            return Err(Error::UnsupportedFormat("zip64 archives".to_string()));
        }
        Ok(eocd)
    }
}

fn unix_permissions(mode: u32) -> (EntryType, Permissions) {
    let entry_type = match mode & S_IFMT {
        S_IFDIR => EntryType::Directory,
        S_IFLNK => EntryType::Symlink,
        _ => EntryType::File,
    };
    (
        entry_type,
        Permissions::new(mode & 0o777, entry_type == EntryType::Directory),
    )
}

fn dos_permissions(attributes: u32) -> (EntryType, Permissions) {
    if attributes & DOS_DIRECTORY != 0 {
        (EntryType::Directory, Permissions::new(0o755, true))
    } else if attributes & DOS_READONLY != 0 {
        (EntryType::File, Permissions::new(0o444, false))
    } else {
        (EntryType::File, Permissions::new(0o644, false))
    }
}

/// Walk the central directory, following every header to its local header.
pub fn parse(data: &[u8]) -> Result<ArchiveMetadata> {
    let r = BinaryReader::new(data);
    let eocd = EndOfCentralDirectory::locate(data)?;
    let mut entries = Vec::with_capacity(usize::from(eocd.total_entries));
    let mut offset = eocd.directory_offset as usize;

    while r.has_signature(offset, CENTRAL_SIGNATURE) {
        let made_by = r.u16_le(offset + 4)?;
        let flags = r.u16_le(offset + 8)?;
        let method = r.u16_le(offset + 10)?;
        let time = r.u16_le(offset + 12)?;
        let date = r.u16_le(offset + 14)?;
        let crc32 = r.u32_le(offset + 16)?;
        let compressed_size = r.u32_le(offset + 20)?;
        let size = r.u32_le(offset + 24)?;
        let name_len = usize::from(r.u16_le(offset + 28)?);
        let extra_len = usize::from(r.u16_le(offset + 30)?);
        let comment_len = usize::from(r.u16_le(offset + 32)?);
        let internal = r.u16_le(offset + 36)?;
        let external = r.u32_le(offset + 38)?;
        let local_offset = r.u32_le(offset + 42)?;
        let name = String::from_utf8_lossy(r.bytes(offset + CENTRAL_LEN, name_len)?);
        let name = name.into_owned();

        if compressed_size == ZIP64_U32 || size == ZIP64_U32 || local_offset == ZIP64_U32 {
            return Err(Error::UnsupportedFormat(format!("zip64 entry '{name}'")));
        }
        if flags & FLAG_ENCRYPTED != 0 {
            return Err(Error::UnsupportedFormat(format!("encrypted entry '{name}'")));
        }

        let local = local_offset as usize;
        if !r.has_signature(local, LOCAL_SIGNATURE) {
            return Err(Error::corrupt(format!(
                "entry '{name}' points at offset {local}, which holds no local file header"
            )));
        }
        let local_name_len = usize::from(r.u16_le(local + 26)?);
        let local_extra_len = usize::from(r.u16_le(local + 28)?);
        let payload_offset = local + LOCAL_LEN + local_name_len + local_extra_len;
        r.bytes(payload_offset, compressed_size as usize).map_err(|_| {
            Error::corrupt(format!("payload of '{name}' runs past end of archive"))
        })?;

        let (mut entry_type, permissions) = if made_by >> 8 == HOST_UNIX && external >> 16 != 0 {
            unix_permissions(external >> 16)
        } else {
            dos_permissions(external)
        };
        if name.ends_with('/') || name.ends_with('\\') {
            entry_type = EntryType::Directory;
        }
        let permissions = Permissions::new(permissions.mode, entry_type == EntryType::Directory);

        entries.push(ArchiveEntry {
            name,
            entry_type,
            size: u64::from(size),
            compressed_size: u64::from(compressed_size),
            compression: CompressionMethod::from_zip_code(method),
            modified_at: DosTimestamp::new(date, time).to_datetime(),
            crc32,
            permissions: Some(permissions),
            payload_offset: payload_offset as u64,
            link_target: None,
            is_text: internal & 0x0001 != 0,
        });

        offset += CENTRAL_LEN + name_len + extra_len + comment_len;
    }

    if entries.len() != usize::from(eocd.total_entries) {
        return Err(Error::corrupt(format!(
            "central directory lists {} entries, found {}",
            eocd.total_entries,
            entries.len()
        )));
    }

    Ok(ArchiveMetadata::new(Format::Zip, entries))
}

/// Decompress one entry's payload and check its size and CRC32.
pub fn read_entry(data: &[u8], entry: &ArchiveEntry) -> Result<Vec<u8>> {
    let payload = BinaryReader::new(data).bytes(
        entry.payload_offset as usize,
        entry.compressed_size as usize,
    )?;

    let out = match entry.compression {
        CompressionMethod::Stored => payload.to_vec(),
        CompressionMethod::Deflated => codec::inflate_raw(payload, entry.size as usize)?.0,
        CompressionMethod::Bzip2 => bzip2::decode(payload)?,
        CompressionMethod::Other(code) => {
            return Err(Error::UnsupportedFormat(format!(
                "zip compression method {code} for '{}'",
                entry.name
            )));
        }
    };

    if out.len() as u64 != entry.size {
        return Err(Error::corrupt(format!(
            "'{}' decoded to {} bytes, header says {}",
            entry.name,
            out.len(),
            entry.size
        )));
    }
    let actual = binary::crc32(&out);
    if actual != entry.crc32 {
        return Err(Error::corrupt(format!(
            "crc mismatch for '{}': header {:#010x}, data {actual:#010x}",
            entry.name, entry.crc32
        )));
    }
    Ok(out)
}

pub fn unpack(data: &[u8], metadata: &ArchiveMetadata, unpacker: &Unpacker) -> Result<()> {
    for entry in metadata {
        match entry.entry_type {
            EntryType::Directory => {
                unpacker.directory(&entry.name)?;
            }
            EntryType::File => {
                let out = read_entry(data, entry)?;
                unpacker.file(&entry.name, &out, entry.mode())?;
            }
            other => {
                // Still guarded, so a hostile name fails the call even when skipped.
                unpacker.target(&entry.name)?;
                warn!(entry = %entry.name, kind = ?other, "not materializing zip entry");
            }
        }
    }
    debug!(entries = metadata.len(), "zip entries unpacked");
    Ok(())
}
