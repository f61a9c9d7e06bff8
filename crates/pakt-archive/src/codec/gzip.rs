//! Single-member GZIP (RFC 1952) decoding.

use std::io::BufReader;
use std::path::Path;

use pakt_fs::WriteOptions;
use tracing::{debug, info};

use crate::binary::{self, BinaryReader};
use crate::codec::{self, Adapter};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::options::CodecOptions;

pub const MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const BASE_HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;

const FTEXT: u8 = 0x01;
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const RESERVED: u8 = 0xe0;

/// The fixed GZIP header plus whichever optional sections its flags enable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GzipHeader {
    pub flags: u8,
    pub mtime: u32,
    pub os: u8,
    pub extra: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub comment: Option<String>,
    pub header_crc: Option<u16>,
    /// Offset of the first byte of the DEFLATE payload.
    pub payload_offset: usize,
}

impl GzipHeader {
    pub fn is_text(&self) -> bool {
        self.flags & FTEXT != 0
    }

    /// Walk the base header and the optional sections in the order
    /// FEXTRA, FNAME, FCOMMENT, FHCRC.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let r = BinaryReader::new(data);
        if !r.has_signature(0, &MAGIC) {
            return Err(Error::corrupt("not a gzip stream: bad magic"));
        }
        let method = r.u8_at(2)?;
        if method != METHOD_DEFLATE {
            return Err(Error::UnsupportedFormat(format!(
                "gzip compression method {method}"
            )));
        }
        let flags = r.u8_at(3)?;
        if flags & RESERVED != 0 {
            return Err(Error::corrupt(format!("gzip reserved flag bits set: {flags:#04x}")));
        }

        let mut header = GzipHeader {
            flags,
            mtime: r.u32_le(4)?,
            os: r.u8_at(9)?,
            ..Default::default()
        };
        let mut offset = BASE_HEADER_LEN;

        if flags & FEXTRA != 0 {
            let len = usize::from(r.u16_le(offset)?);
            header.extra = Some(r.bytes(offset + 2, len)?.to_vec());
            offset += 2 + len;
        }
        if flags & FNAME != 0 {
            let (name, next) = r.cstr_at(offset)?;
            header.file_name = Some(latin1(name));
            offset = next;
        }
        if flags & FCOMMENT != 0 {
            let (comment, next) = r.cstr_at(offset)?;
            header.comment = Some(latin1(comment));
            offset = next;
        }
        if flags & FHCRC != 0 {
            let stored = r.u16_le(offset)?;
            let actual = (binary::crc32(r.bytes(0, offset)?) & 0xffff) as u16;
            if stored != actual {
                return Err(Error::corrupt(format!(
                    "gzip header crc mismatch: stored {stored:#06x}, computed {actual:#06x}"
                )));
            }
            header.header_crc = Some(stored);
            offset += 2;
        }

        header.payload_offset = offset;
        Ok(header)
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Byte offset at which the compressed payload of `data` begins.
pub fn payload_offset(data: &[u8]) -> Result<usize> {
    GzipHeader::parse(data).map(|h| h.payload_offset)
}

/// Decode a whole GZIP buffer, checking the CRC32 and ISIZE trailer.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let header = GzipHeader::parse(data)?;
    let payload = &data[header.payload_offset..];
    let (out, consumed) = codec::inflate_raw(payload, payload.len().saturating_mul(3))?;

    let r = BinaryReader::new(payload);
    let trailer = consumed;
    if r.bytes(trailer, TRAILER_LEN).is_err() {
        return Err(Error::corrupt("gzip stream truncated before trailer"));
    }
    let expected_crc = r.u32_le(trailer)?;
    let expected_len = r.u32_le(trailer + 4)?;

    let actual_crc = binary::crc32(&out);
    if actual_crc != expected_crc {
        return Err(Error::corrupt(format!(
            "gzip crc mismatch: trailer {expected_crc:#010x}, data {actual_crc:#010x}"
        )));
    }
    if out.len() as u32 != expected_len {
        return Err(Error::corrupt(format!(
            "gzip length mismatch: trailer {expected_len}, data {}",
            out.len()
        )));
    }
    Ok(out)
}

#[derive(Clone, Debug, Default)]
pub struct GzipCodec {
    options: CodecOptions,
}

impl GzipCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    /// Decompress the file `src` into the file `dst`. Returns the decoded size.
    pub fn decompress(&self, src: &Path, dst: &Path) -> Result<u64> {
        let written = if self.options.use_streams {
            let file = pakt_fs::open(src)?;
            let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            codec::copy_chunks(decoder, dst)?
        } else {
            let data = codec::read_archive(src)?;
            let out = decode(&data)?;
            pakt_fs::atomic_write(dst, &out, WriteOptions::new())?;
            out.len() as u64
        };

        info!(
            src = %src.display(),
            dst = %dst.display(),
            bytes = written,
            streaming = self.options.use_streams,
            "gzip decoded"
        );
        Ok(written)
    }
}

impl Adapter for GzipCodec {
    fn format(&self) -> Format {
        Format::Gzip
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        debug!(archive = %archive.display(), "gzip extract");
        self.decompress(archive, destination).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, GzBuilder};
    use std::io::Write;

    fn gzip(data: &[u8], name: Option<&str>, comment: Option<&str>) -> Vec<u8> {
        let mut builder = GzBuilder::new();
        if let Some(name) = name {
            builder = builder.filename(name);
        }
        if let Some(comment) = comment {
            builder = builder.comment(comment);
        }
        let mut encoder = builder.write(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn offset_without_optional_fields() {
        let stream = gzip(b"abc", None, None);
        assert_eq!(payload_offset(&stream).unwrap(), 10);
    }

    #[test]
    fn offset_skips_name_and_comment() {
        let stream = gzip(b"payload", Some("data.txt"), Some("made by test"));
        let header = GzipHeader::parse(&stream).unwrap();
        let expected = 10 + "data.txt".len() + 1 + "made by test".len() + 1;
        assert_eq!(header.payload_offset, expected);
        assert_eq!(header.file_name.as_deref(), Some("data.txt"));
        assert_eq!(header.comment.as_deref(), Some("made by test"));

        let (inflated, _) = codec::inflate_raw(&stream[expected..], 0).unwrap();
        assert_eq!(inflated, b"payload");
        assert_eq!(decode(&stream).unwrap(), b"payload");
    }

    #[test]
    fn offset_skips_extra_field() {
        let mut encoder = GzBuilder::new()
            .extra(vec![1, 2, 3, 4, 5])
            .filename("x")
            .write(Vec::new(), Compression::fast());
        encoder.write_all(b"extra").unwrap();
        let stream = encoder.finish().unwrap();

        let header = GzipHeader::parse(&stream).unwrap();
        assert_eq!(header.extra.as_deref(), Some(&[1u8, 2, 3, 4, 5][..]));
        assert_eq!(header.payload_offset, 10 + 2 + 5 + 2);
        assert_eq!(decode(&stream).unwrap(), b"extra");
    }

    #[test]
    fn header_crc_is_checked() {
        let mut stream = vec![0x1f, 0x8b, 8, FHCRC, 0, 0, 0, 0, 0, 3];
        let crc = (binary::crc32(&stream) & 0xffff) as u16;
        stream.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(payload_offset(&stream).unwrap(), 12);

        let last = stream.len() - 1;
        stream[last] ^= 0xff;
        assert!(matches!(payload_offset(&stream), Err(Error::CorruptData(_))));
    }

    #[test]
    fn bad_magic_and_method() {
        assert!(matches!(
            payload_offset(b"PK\x03\x04rest-of-it"),
            Err(Error::CorruptData(_))
        ));
        assert!(matches!(
            payload_offset(&[0x1f, 0x8b, 7, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unterminated_name_is_corrupt() {
        let stream = [0x1f, 0x8b, 8, FNAME, 0, 0, 0, 0, 0, 3, b'a', b'b'];
        assert!(matches!(payload_offset(&stream), Err(Error::CorruptData(_))));
    }

    #[test]
    fn trailer_mismatch_is_corrupt() {
        let mut stream = gzip(b"checked content", None, None);
        let crc_at = stream.len() - 8;
        stream[crc_at] ^= 0x01;
        assert!(matches!(decode(&stream), Err(Error::CorruptData(_))));

        let stream = gzip(b"checked content", None, None);
        let truncated = &stream[..stream.len() - 4];
        assert!(matches!(decode(truncated), Err(Error::CorruptData(_))));
    }

    #[test]
    fn whole_buffer_and_streaming_agree() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..50_000u32).flat_map(|i| i.to_le_bytes()).collect();
        let src = dir.path().join("blob.gz");
        std::fs::write(&src, gzip(&data, Some("blob"), None)).unwrap();

        let whole = dir.path().join("whole");
        let streamed = dir.path().join("streamed");
        GzipCodec::default().decompress(&src, &whole).unwrap();
        GzipCodec::new(CodecOptions::default().use_streams(true))
            .decompress(&src, &streamed)
            .unwrap();

        assert_eq!(std::fs::read(&whole).unwrap(), data);
        assert_eq!(std::fs::read(&streamed).unwrap(), data);
    }
}
