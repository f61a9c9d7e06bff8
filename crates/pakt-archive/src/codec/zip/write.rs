//! Assembles stored/deflated archives in memory.

use chrono::NaiveDateTime;
use tracing::debug;

use super::dostime::DosTimestamp;
use super::parse::{CENTRAL_SIGNATURE, EOCD_SIGNATURE, FLAG_UTF8, LOCAL_SIGNATURE};
use crate::binary;
use crate::codec;
use crate::entry::{CompressionMethod, InputFile};
use crate::error::{Error, Result};

const VERSION_NEEDED: u16 = 20;
// Unix host, APPNOTE version 2.0.
const VERSION_MADE_BY: u16 = (3 << 8) | 20;
const REGULAR_FILE_MODE: u32 = 0o100644;

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn narrow_u16(value: usize, what: &str) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| Error::UnsupportedFormat(format!("{what} {value} needs zip64")))
}

fn narrow_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::UnsupportedFormat(format!("{what} {value} needs zip64")))
}

/// What the central directory needs to remember about a written entry.
struct Written {
    name: Vec<u8>,
    flags: u16,
    method: u16,
    crc32: u32,
    compressed_size: u32,
    size: u32,
    local_offset: u32,
}

/// Build a whole archive. Every entry shares `modified`; no directory
/// entries are emitted.
pub fn build(files: &[InputFile], modified: NaiveDateTime) -> Result<Vec<u8>> {
    let stamp = DosTimestamp::from_datetime(modified);
    let mut out = Vec::new();
    let mut written = Vec::with_capacity(files.len());

    for file in files {
        let deflated = codec::deflate_raw(&file.data)?;
        let (method, payload) = if deflated.len() < file.data.len() {
            (CompressionMethod::Deflated, deflated)
        } else {
            (CompressionMethod::Stored, file.data.clone())
        };

        let name = file.name.as_bytes().to_vec();
        let entry = Written {
            flags: if file.name.is_ascii() { 0 } else { FLAG_UTF8 },
            method: method.zip_code(),
            crc32: binary::crc32(&file.data),
            compressed_size: narrow_u32(payload.len(), "compressed size")?,
            size: narrow_u32(file.data.len(), "entry size")?,
            local_offset: narrow_u32(out.len(), "local header offset")?,
            name,
        };

        out.extend_from_slice(LOCAL_SIGNATURE);
        put_u16(&mut out, VERSION_NEEDED);
        put_u16(&mut out, entry.flags);
        put_u16(&mut out, entry.method);
        put_u16(&mut out, stamp.time);
        put_u16(&mut out, stamp.date);
        put_u32(&mut out, entry.crc32);
        put_u32(&mut out, entry.compressed_size);
        put_u32(&mut out, entry.size);
        put_u16(&mut out, narrow_u16(entry.name.len(), "name length")?);
        put_u16(&mut out, 0);
        out.extend_from_slice(&entry.name);
        out.extend_from_slice(&payload);

        debug!(entry = %file.name, ?method, bytes = file.data.len(), "zip entry written");
        written.push(entry);
    }

    let directory_offset = narrow_u32(out.len(), "central directory offset")?;
    for entry in &written {
        out.extend_from_slice(CENTRAL_SIGNATURE);
        put_u16(&mut out, VERSION_MADE_BY);
        put_u16(&mut out, VERSION_NEEDED);
        put_u16(&mut out, entry.flags);
        put_u16(&mut out, entry.method);
        put_u16(&mut out, stamp.time);
        put_u16(&mut out, stamp.date);
        put_u32(&mut out, entry.crc32);
        put_u32(&mut out, entry.compressed_size);
        put_u32(&mut out, entry.size);
        put_u16(&mut out, narrow_u16(entry.name.len(), "name length")?);
        put_u16(&mut out, 0); // extra
        put_u16(&mut out, 0); // comment
        put_u16(&mut out, 0); // disk
        put_u16(&mut out, 0); // internal attributes
        put_u32(&mut out, REGULAR_FILE_MODE << 16);
        put_u32(&mut out, entry.local_offset);
        out.extend_from_slice(&entry.name);
    }
    let directory_size =
        narrow_u32(out.len() - directory_offset as usize, "central directory size")?;

    let count = narrow_u16(written.len(), "entry count")?;
    if count == u16::MAX {
        return Err(Error::UnsupportedFormat(format!("entry count {count} needs zip64")));
    }
    out.extend_from_slice(EOCD_SIGNATURE);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, count);
    put_u16(&mut out, count);
    put_u32(&mut out, directory_size);
    put_u32(&mut out, directory_offset);
    put_u16(&mut out, 0);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::zip::parse;
    use chrono::NaiveDate;
    use std::io::Read;

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn chooses_store_or_deflate() {
        let files = vec![
            InputFile::new("tiny", b"ab".to_vec()),
            InputFile::new("repetitive.txt", b"abcabcabc".repeat(100)),
        ];
        let data = build(&files, when()).unwrap();
        let meta = parse::parse(&data).unwrap();

        assert_eq!(meta.entries[0].compression, CompressionMethod::Stored);
        assert_eq!(meta.entries[1].compression, CompressionMethod::Deflated);
        assert_eq!(meta.entries[1].modified_at, Some(when()));
        assert_eq!(meta.entries[1].permissions.unwrap().to_string(), "-rw-r--r--");
        for (file, entry) in files.iter().zip(&meta) {
            assert_eq!(parse::read_entry(&data, entry).unwrap(), file.data);
        }
    }

    #[test]
    fn reference_reader_accepts_output() {
        let files = vec![
            InputFile::new("a.txt", b"alpha".to_vec()),
            InputFile::new("nested/b.txt", b"beta beta beta beta beta".to_vec()),
            InputFile::new("café.txt", b"utf8 name".to_vec()),
        ];
        let data = build(&files, when()).unwrap();

        let mut archive = ::zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 3);
        for file in &files {
            let mut entry = archive.by_name(&file.name).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            assert_eq!(content, file.data);
        }
    }

    #[test]
    fn empty_archive_is_just_eocd() {
        let data = build(&[], when()).unwrap();
        assert_eq!(data.len(), 22);
        assert!(parse::parse(&data).unwrap().is_empty());
    }
}
