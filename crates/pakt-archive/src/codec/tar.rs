//! USTAR reading and writing over in-memory buffers.
//!
//! Headers are 512-byte blocks; every payload is padded up to the next
//! block boundary. GNU `L`/`K` records carry over-long names for the header
//! that follows them.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::binary::{self, BinaryReader};
use crate::codec::{self, Adapter, Unpacker};
use crate::entry::{
    ArchiveEntry, ArchiveMetadata, CompressionMethod, EntryType, InputFile, Permissions,
};
use crate::error::{Error, Result};
use crate::format::Format;

pub const BLOCK: usize = 512;
pub const LONG_LINK_NAME: &str = "././@LongLink";

const NAME: (usize, usize) = (0, 100);
const MODE: (usize, usize) = (100, 8);
const UID: (usize, usize) = (108, 8);
const GID: (usize, usize) = (116, 8);
const SIZE: (usize, usize) = (124, 12);
const MTIME: (usize, usize) = (136, 12);
const CHECKSUM: (usize, usize) = (148, 8);
const TYPEFLAG: usize = 156;
const LINKNAME: (usize, usize) = (157, 100);
const MAGIC: (usize, usize) = (257, 6);
const VERSION: (usize, usize) = (263, 2);
const UNAME: (usize, usize) = (265, 32);
const GNAME: (usize, usize) = (297, 32);
const DEVMAJOR: (usize, usize) = (329, 8);
const DEVMINOR: (usize, usize) = (337, 8);
const PREFIX: (usize, usize) = (345, 155);

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// One raw header block, decoded field by field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    pub mtime: u64,
    pub checksum: u64,
    pub typeflag: u8,
    pub link_name: String,
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: String,
    pub gname: String,
    pub dev_major: u64,
    pub dev_minor: u64,
    pub prefix: String,
}

impl Header {
    pub fn parse(block: &[u8]) -> Result<Self> {
        let r = BinaryReader::new(block);
        let text = |(offset, width): (usize, usize)| -> Result<String> {
            Ok(String::from_utf8_lossy(r.fixed_str(offset, width)?).into_owned())
        };
        let number = |(offset, width): (usize, usize)| -> Result<u64> {
            parse_numeric(r.bytes(offset, width)?)
        };

        let mut magic = [0u8; 6];
        magic.copy_from_slice(r.bytes(MAGIC.0, MAGIC.1)?);
        let mut version = [0u8; 2];
        version.copy_from_slice(r.bytes(VERSION.0, VERSION.1)?);

        Ok(Self {
            name: text(NAME)?,
            mode: u32::try_from(number(MODE)? & 0o7777)
                .map_err(|_| Error::corrupt("tar mode out of range"))?,
            uid: number(UID)?,
            gid: number(GID)?,
            size: number(SIZE)?,
            mtime: number(MTIME)?,
            checksum: number(CHECKSUM)?,
            typeflag: r.u8_at(TYPEFLAG)?,
            link_name: text(LINKNAME)?,
            magic,
            version,
            uname: text(UNAME)?,
            gname: text(GNAME)?,
            dev_major: number(DEVMAJOR)?,
            dev_minor: number(DEVMINOR)?,
            prefix: text(PREFIX)?,
        })
    }

    pub fn is_ustar(&self) -> bool {
        &self.magic == USTAR_MAGIC
    }

    /// `prefix/name` for POSIX ustar headers, `name` otherwise.
    pub fn full_name(&self) -> String {
        if self.is_ustar() && !self.prefix.is_empty() {
            format!("{}/{}", self.prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    pub fn entry_type(&self) -> Option<EntryType> {
        let entry_type = match self.typeflag {
            0 | b'0' => EntryType::File,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Contiguous,
            _ => return None,
        };
        Some(entry_type)
    }
}

/// Octal ASCII, padded with NULs or spaces. A leading `0x80` byte marks the
/// GNU base-256 encoding used for values too large for octal.
fn parse_numeric(field: &[u8]) -> Result<u64> {
    if let Some((&first, rest)) = field.split_first() {
        if first & 0x80 != 0 {
            let mut value = u64::from(first & 0x7f);
            for &b in rest {
                value = value
                    .checked_mul(256)
                    .and_then(|v| v.checked_add(u64::from(b)))
                    .ok_or_else(|| Error::corrupt("tar base-256 field overflows"))?;
            }
            return Ok(value);
        }
    }

    let digits = binary::until_nul(field);
    let digits = digits
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != b' ')
        .copied()
        .collect::<Vec<u8>>();

    let mut value = 0u64;
    for b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return Err(Error::corrupt(format!(
                "invalid octal digit {:?} in tar header",
                char::from(b)
            )));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| Error::corrupt("tar octal field overflows"))?;
    }
    Ok(value)
}

/// Unsigned sum of the block with the checksum field counted as spaces.
fn header_checksum(block: &[u8]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if (CHECKSUM.0..CHECKSUM.0 + CHECKSUM.1).contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum()
}

fn padded(size: u64) -> u64 {
    size.div_ceil(BLOCK as u64) * BLOCK as u64
}

fn long_value(payload: &[u8]) -> String {
    String::from_utf8_lossy(binary::until_nul(payload)).into_owned()
}

/// Walk the header blocks of a TAR buffer into metadata. Nothing is written.
pub fn parse(data: &[u8]) -> Result<ArchiveMetadata> {
    let r = BinaryReader::new(data);
    let mut entries = Vec::new();
    let mut long_name: Option<String> = None;
    let mut long_link: Option<String> = None;
    let mut offset = 0usize;

    while offset < data.len() {
        let block = r
            .bytes(offset, BLOCK)
            .map_err(|_| Error::corrupt(format!("truncated tar header at offset {offset}")))?;
        if block.iter().all(|&b| b == 0) {
            break;
        }

        let header = Header::parse(block)?;
        let computed = header_checksum(block);
        if header.checksum != computed {
            return Err(Error::corrupt(format!(
                "tar header checksum mismatch at offset {offset}: stored {}, computed {computed}",
                header.checksum
            )));
        }

        let payload_offset = offset + BLOCK;
        let size = usize::try_from(header.size)
            .map_err(|_| Error::corrupt("tar entry size overflows"))?;
        let payload = r.bytes(payload_offset, size).map_err(|_| {
            Error::corrupt(format!(
                "tar entry at offset {offset} claims {size} bytes past end of archive"
            ))
        })?;
        let next = usize::try_from(payload_offset as u64 + padded(header.size))
            .map_err(|_| Error::corrupt("tar entry size overflows"))?;

        match header.typeflag {
            b'L' => {
                long_name = Some(long_value(payload));
                offset = next;
                continue;
            }
            b'K' => {
                long_link = Some(long_value(payload));
                offset = next;
                continue;
            }
            b'x' | b'g' => {
                debug!(offset, "skipping pax extended header");
                offset = next;
                continue;
            }
            _ => {}
        }

        let name = long_name.take().unwrap_or_else(|| header.full_name());
        let link_name = long_link.take().unwrap_or_else(|| header.link_name.clone());

        let Some(mut entry_type) = header.entry_type() else {
            warn!(
                entry = %name,
                typeflag = %char::from(header.typeflag),
                "skipping tar entry of unknown type"
            );
            offset = next;
            continue;
        };
        if entry_type == EntryType::File && name.ends_with('/') {
            entry_type = EntryType::Directory;
        }
        let directory = entry_type == EntryType::Directory;

        entries.push(ArchiveEntry {
            name,
            entry_type,
            size: header.size,
            compressed_size: header.size,
            compression: CompressionMethod::Stored,
            modified_at: i64::try_from(header.mtime)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.naive_utc()),
            crc32: binary::crc32(payload),
            permissions: Some(Permissions::new(header.mode & 0o777, directory)),
            payload_offset: payload_offset as u64,
            link_target: (!link_name.is_empty()).then_some(link_name),
            is_text: false,
        });

        offset = next;
    }

    Ok(ArchiveMetadata::new(Format::Tar, entries))
}

/// Write parsed entries below `destination`. Files and directories are
/// materialized; links, devices and fifos are only reported, but their names
/// must still pass the guard.
pub fn unpack(data: &[u8], metadata: &ArchiveMetadata, unpacker: &Unpacker) -> Result<()> {
    for entry in metadata {
        match entry.entry_type {
            EntryType::File => {
                let start = entry.payload_offset as usize;
                let payload = BinaryReader::new(data).bytes(start, entry.size as usize)?;
                unpacker.file(&entry.name, payload, entry.mode())?;
            }
            EntryType::Directory => {
                unpacker.directory(&entry.name)?;
            }
            other => {
                unpacker.target(&entry.name)?;
                warn!(entry = %entry.name, kind = ?other, "not materializing tar entry");
            }
        }
    }
    Ok(())
}

fn put_field(block: &mut [u8; BLOCK], (offset, width): (usize, usize), value: &[u8]) {
    let len = value.len().min(width);
    block[offset..offset + len].copy_from_slice(&value[..len]);
}

fn put_octal(block: &mut [u8; BLOCK], (offset, width): (usize, usize), value: u64) {
    let text = format!("{value:0w$o}\0", w = width - 1);
    put_field(block, (offset, width), text.as_bytes());
}

fn header_block(name: &[u8], size: u64, mode: u32, mtime: u64, typeflag: u8) -> [u8; BLOCK] {
    let mut block = [0u8; BLOCK];
    put_field(&mut block, NAME, name);
    put_octal(&mut block, MODE, u64::from(mode));
    put_octal(&mut block, UID, 0);
    put_octal(&mut block, GID, 0);
    put_octal(&mut block, SIZE, size);
    put_octal(&mut block, MTIME, mtime);
    block[TYPEFLAG] = typeflag;
    put_field(&mut block, MAGIC, USTAR_MAGIC);
    put_field(&mut block, VERSION, b"00");

    let checksum = header_checksum(&block);
    let text = format!("{checksum:06o}\0 ");
    put_field(&mut block, CHECKSUM, text.as_bytes());
    block
}

fn push_padded(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(payload);
    let pad = padded(payload.len() as u64) as usize - payload.len();
    out.resize(out.len() + pad, 0);
}

/// Build a TAR archive of regular files. Names longer than 100 bytes are
/// carried by a preceding GNU `././@LongLink` record.
pub fn build(files: &[InputFile], modified: NaiveDateTime) -> Result<Vec<u8>> {
    let mtime = u64::try_from(modified.and_utc().timestamp()).unwrap_or(0);
    let mut out = Vec::new();

    for file in files {
        let name = file.name.as_bytes();
        if name.len() > NAME.1 {
            let mut long = name.to_vec();
            long.push(0);
            out.extend_from_slice(&header_block(
                LONG_LINK_NAME.as_bytes(),
                long.len() as u64,
                0o644,
                0,
                b'L',
            ));
            push_padded(&mut out, &long);
        }
        out.extend_from_slice(&header_block(
            &name[..name.len().min(NAME.1)],
            file.data.len() as u64,
            0o644,
            mtime,
            b'0',
        ));
        push_padded(&mut out, &file.data);
    }

    out.resize(out.len() + 2 * BLOCK, 0);
    Ok(out)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TarCodec;

impl TarCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn list(&self, archive: &Path) -> Result<ArchiveMetadata> {
        parse(&codec::read_archive(archive)?)
    }

    pub fn build(files: &[InputFile], modified: NaiveDateTime) -> Result<Vec<u8>> {
        build(files, modified)
    }

    /// Unpack `archive` into `destination`, returning what was found.
    pub fn extract_to(&self, archive: &Path, destination: &Path) -> Result<ArchiveMetadata> {
        let data = codec::read_archive(archive)?;
        let metadata = parse(&data)?;
        let unpacker = Unpacker::new(destination)?;
        unpack(&data, &metadata, &unpacker)?;
        info!(
            archive = %archive.display(),
            destination = %destination.display(),
            entries = metadata.len(),
            "tar extracted"
        );
        Ok(metadata)
    }
}

impl Adapter for TarCodec {
    fn format(&self) -> Format {
        Format::Tar
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        self.extract_to(archive, destination).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    fn reference_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = ::tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o640);
            header.set_mtime(1_700_000_000);
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn octal_fields() {
        assert_eq!(parse_numeric(b"0000644\0").unwrap(), 0o644);
        assert_eq!(parse_numeric(b"   755 \0").unwrap(), 0o755);
        assert_eq!(parse_numeric(b"\0\0\0\0").unwrap(), 0);
        assert_eq!(parse_numeric(&[0x80, 0, 0, 0, 0, 0, 1, 0]).unwrap(), 256);
        assert!(parse_numeric(b"00009\0").is_err());
    }

    #[test]
    fn parses_reference_archive() {
        let data = reference_tar(&[("a.txt", b"alpha"), ("dir/b.bin", &[0u8; 700])]);
        let meta = parse(&data).unwrap();
        assert_eq!(meta.len(), 2);

        let a = &meta.entries[0];
        assert_eq!(a.name, "a.txt");
        assert_eq!(a.size, 5);
        assert_eq!(a.payload_offset, 512);
        assert_eq!(a.permissions.unwrap().to_string(), "-rw-r-----");
        assert_eq!(
            a.modified_at.unwrap().and_utc().timestamp(),
            1_700_000_000
        );

        let b = &meta.entries[1];
        assert_eq!(b.name, "dir/b.bin");
        assert_eq!(b.payload_offset, 512 + 512 + 512);
    }

    #[test]
    fn gnu_long_name_from_reference_writer() {
        let long = format!("{}/{}.txt", "d".repeat(80), "f".repeat(60));
        let data = reference_tar(&[(long.as_str(), b"long")]);
        let meta = parse(&data).unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.entries[0].name, long);
    }

    #[test]
    fn built_archive_round_trips_through_reference_reader() {
        let long = "n".repeat(150);
        let files = vec![
            InputFile::new("short.txt", b"short".to_vec()),
            InputFile::new(long.clone(), b"long name".to_vec()),
        ];
        let data = build(&files, when()).unwrap();
        assert_eq!(data.len() % BLOCK, 0);

        let mut archive = ::tar::Archive::new(&data[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["short.txt".to_string(), long.clone()]);

        let meta = parse(&data).unwrap();
        assert_eq!(meta.entries[1].name, long);
        assert_eq!(
            meta.entries[0].modified_at.unwrap(),
            when()
        );
    }

    #[test]
    fn ustar_prefix_is_joined() {
        let mut block = header_block(b"file.txt", 0, 0o644, 0, b'0');
        put_field(&mut block, PREFIX, b"some/prefix");
        put_field(&mut block, CHECKSUM, b"        ");
        let checksum = header_checksum(&block);
        put_field(&mut block, CHECKSUM, format!("{checksum:06o}\0 ").as_bytes());

        let mut data = block.to_vec();
        data.resize(data.len() + 2 * BLOCK, 0);
        let meta = parse(&data).unwrap();
        assert_eq!(meta.entries[0].name, "some/prefix/file.txt");
    }

    #[test]
    fn special_entries_are_recorded_not_written() {
        let mut data = header_block(b"dev/null", 0, 0o666, 0, b'3').to_vec();
        data.extend_from_slice(&header_block(b"link", 0, 0o777, 0, b'2'));
        data.extend_from_slice(&header_block(b"sub/", 0, 0o755, 0, b'5'));
        data.resize(data.len() + 2 * BLOCK, 0);

        let meta = parse(&data).unwrap();
        let kinds: Vec<EntryType> = meta.iter().map(|e| e.entry_type).collect();
        assert_eq!(kinds, vec![EntryType::Char, EntryType::Symlink, EntryType::Directory]);
        assert_eq!(meta.entries[2].permissions.unwrap().to_string(), "drwxr-xr-x");

        let dir = tempfile::tempdir().unwrap();
        let unpacker = Unpacker::new(dir.path()).unwrap();
        unpack(&data, &meta, &unpacker).unwrap();
        assert!(!dir.path().join("dev/null").exists());
        assert!(dir.path().join("link").symlink_metadata().is_err());
        assert!(dir.path().join("sub").is_dir());
    }

    #[test]
    fn hostile_name_on_skipped_entry_fails() {
        let mut data = header_block(b"ok.txt", 0, 0o644, 0, b'0').to_vec();
        data.extend_from_slice(&header_block(b"../outside-link", 0, 0o777, 0, b'2'));
        data.resize(data.len() + 2 * BLOCK, 0);

        let dir = tempfile::tempdir().unwrap();
        let meta = parse(&data).unwrap();
        let unpacker = Unpacker::new(&dir.path().join("dest")).unwrap();
        let result = unpack(&data, &meta, &unpacker);
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn checksum_mismatch_is_corrupt() {
        let mut data = build(&[InputFile::new("a", b"x".to_vec())], when()).unwrap();
        data[0] = b'b';
        assert!(matches!(parse(&data), Err(Error::CorruptData(_))));
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let data = build(&[InputFile::new("a", vec![1u8; 2000])], when()).unwrap();
        assert!(matches!(parse(&data[..1024]), Err(Error::CorruptData(_))));
        assert!(matches!(parse(&data[..300]), Err(Error::CorruptData(_))));
    }

    #[test]
    fn traversal_entry_fails_whole_extraction() {
        let data = build(
            &[
                InputFile::new("ok.txt", b"fine".to_vec()),
                InputFile::new("../evil.txt", b"bad".to_vec()),
            ],
            when(),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        let meta = parse(&data).unwrap();
        let unpacker = Unpacker::new(&dest).unwrap();

        let result = unpack(&data, &meta, &unpacker);
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
        assert!(!dir.path().join("evil.txt").exists());
        assert!(dest.join("ok.txt").exists());
    }
}
