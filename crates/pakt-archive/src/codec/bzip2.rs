use std::path::Path;

use pakt_fs::WriteOptions;
use tracing::info;

use crate::codec::{self, Adapter};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::options::CodecOptions;

pub const MAGIC: &[u8; 3] = b"BZh";

fn unsupported() -> Error {
    Error::UnsupportedFormat("bzip2 support is not compiled in".to_string())
}

/// Whether this build carries a BZIP2 implementation.
pub fn is_available() -> bool {
    cfg!(feature = "bzip2")
}

/// Decode a whole BZIP2 buffer.
#[cfg(feature = "bzip2")]
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;

    if !data.starts_with(MAGIC) {
        return Err(Error::corrupt("not a bzip2 stream: bad magic"));
    }
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    ::bzip2::read::BzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::corrupt(format!("invalid bzip2 stream: {e}")))?;
    Ok(out)
}

#[cfg(not(feature = "bzip2"))]
pub fn decode(_data: &[u8]) -> Result<Vec<u8>> {
    Err(unsupported())
}

#[cfg(feature = "bzip2")]
pub fn encode(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder = ::bzip2::write::BzEncoder::new(Vec::new(), ::bzip2::Compression::best());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::corrupt(format!("bzip2 encode failed: {e}")))
}

#[cfg(not(feature = "bzip2"))]
pub fn encode(_data: &[u8]) -> Result<Vec<u8>> {
    Err(unsupported())
}

#[derive(Clone, Debug)]
pub struct Bzip2Codec {
    options: CodecOptions,
}

impl Bzip2Codec {
    /// Fails with [`Error::UnsupportedFormat`] when BZIP2 is not compiled in.
    pub fn new(options: CodecOptions) -> Result<Self> {
        if !is_available() {
            return Err(unsupported());
        }
        Ok(Self { options })
    }

    /// Decompress the file `src` into the file `dst`. Returns the decoded size.
    pub fn decompress(&self, src: &Path, dst: &Path) -> Result<u64> {
        let written = if self.options.use_streams {
            self.decompress_streaming(src, dst)?
        } else {
            let out = decode(&codec::read_archive(src)?)?;
            pakt_fs::atomic_write(dst, &out, WriteOptions::new())?;
            out.len() as u64
        };
        info!(src = %src.display(), dst = %dst.display(), bytes = written, "bzip2 decoded");
        Ok(written)
    }

    /// Compress the file `src` into the file `dst`. Returns the compressed size.
    pub fn compress(&self, src: &Path, dst: &Path) -> Result<u64> {
        if self.options.use_streams {
            return self.compress_streaming(src, dst);
        }
        let out = encode(&pakt_fs::read(src)?)?;
        pakt_fs::atomic_write(dst, &out, WriteOptions::new())?;
        Ok(out.len() as u64)
    }

    #[cfg(feature = "bzip2")]
    fn decompress_streaming(&self, src: &Path, dst: &Path) -> Result<u64> {
        let file = std::io::BufReader::new(pakt_fs::open(src)?);
        codec::copy_chunks(::bzip2::read::BzDecoder::new(file), dst)
    }

    #[cfg(feature = "bzip2")]
    fn compress_streaming(&self, src: &Path, dst: &Path) -> Result<u64> {
        let file = std::io::BufReader::new(pakt_fs::open(src)?);
        let encoder = ::bzip2::read::BzEncoder::new(file, ::bzip2::Compression::best());
        codec::copy_chunks(encoder, dst)
    }

    #[cfg(not(feature = "bzip2"))]
    fn decompress_streaming(&self, _src: &Path, _dst: &Path) -> Result<u64> {
        Err(unsupported())
    }

    #[cfg(not(feature = "bzip2"))]
    fn compress_streaming(&self, _src: &Path, _dst: &Path) -> Result<u64> {
        Err(unsupported())
    }
}

impl Adapter for Bzip2Codec {
    fn format(&self) -> Format {
        Format::Bzip2
    }

    fn is_supported(&self) -> bool {
        is_available()
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        self.decompress(archive, destination).map(|_| ())
    }
}
