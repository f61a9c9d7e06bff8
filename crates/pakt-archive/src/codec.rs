//! Per-format codecs and the pieces they share.
//!
//! Container codecs (ZIP, TAR) parse a whole archive buffer into
//! [`ArchiveMetadata`] first and only then write entries through an
//! [`Unpacker`], which runs every entry name through the [`PathGuard`].
//! Stream codecs (GZIP, BZIP2) turn one compressed file into one plain file.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use pakt_fs::{PermissionMode, WriteOptions};
use tracing::debug;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::options::CHUNK_SIZE;
use crate::sanitize::PathGuard;

pub mod bzip2;
pub mod gzip;
pub mod tar;
pub mod zip;

/// The capability contract every registered codec satisfies.
pub trait Adapter {
    fn format(&self) -> Format;

    /// Whether the facility behind this adapter is usable in this process.
    fn is_supported(&self) -> bool {
        true
    }

    /// Container formats unpack `archive` into the directory `destination`.
    /// Stream formats decompress `archive` into the file `destination`.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<()>;
}

/// Read a whole archive into memory. Missing, unreadable and empty files
/// are all reported as [`Error::UnreadableArchive`].
pub fn read_archive(path: &Path) -> Result<Vec<u8>> {
    let data = pakt_fs::read(path)?;
    if data.is_empty() {
        return Err(Error::UnreadableArchive {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "archive is empty"),
        });
    }
    Ok(data)
}

/// Writes archive entries below one destination root, guarded against zip-slip.
pub struct Unpacker {
    guard: PathGuard,
}

impl Unpacker {
    pub fn new(destination: &Path) -> Result<Self> {
        Ok(Self {
            guard: PathGuard::new(destination)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    /// Resolve an entry name without writing anything.
    pub fn target(&self, name: &str) -> Result<PathBuf> {
        Ok(self.guard.resolve(name)?.resolved)
    }

    pub fn file(&self, name: &str, data: &[u8], mode: Option<u32>) -> Result<PathBuf> {
        let target = self.target(name)?;
        let options = WriteOptions::new().permissions(resolve_mode(mode));
        pakt_fs::atomic_write(&target, data, options)?;
        debug!(entry = name, bytes = data.len(), "wrote file");
        Ok(target)
    }

    pub fn directory(&self, name: &str) -> Result<PathBuf> {
        let target = self.target(name)?;
        pakt_fs::ensure_dir(&target)?;
        debug!(entry = name, "created directory");
        Ok(target)
    }
}

/// Archive mode bits to apply to an extracted file.
///
/// Executable modes are kept as-is; anything else gains owner read/write and
/// world read so extracted files stay usable. Without a mode the process
/// default stands.
pub fn resolve_mode(mode: Option<u32>) -> PermissionMode {
    match mode {
        Some(m) if m & 0o111 != 0 => PermissionMode::Custom(m & 0o777),
        Some(m) => PermissionMode::Custom((m & 0o777) | 0o644),
        None => PermissionMode::Inherit,
    }
}

/// Upper bound on what DEFLATE can expand one input byte into.
pub const MAX_DEFLATE_RATIO: usize = 1032;

/// Initial buffer size for decoding `compressed_len` bytes that a header
/// claims expand to `declared` bytes. Header sizes are untrusted.
pub fn bounded_capacity(declared: u64, compressed_len: usize) -> usize {
    let declared = usize::try_from(declared).unwrap_or(usize::MAX);
    declared.min(compressed_len.saturating_mul(MAX_DEFLATE_RATIO))
}

/// Inflate a raw DEFLATE stream (no zlib or gzip wrapper).
///
/// Returns the decoded bytes and how many input bytes the stream consumed,
/// so callers can find whatever trails it.
pub fn inflate_raw(input: &[u8], size_hint: usize) -> Result<(Vec<u8>, usize)> {
    let mut decoder = flate2::bufread::DeflateDecoder::new(input);
    let mut out = Vec::with_capacity(bounded_capacity(size_hint as u64, input.len()));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::corrupt(format!("invalid deflate stream: {e}")))?;
    let consumed = usize::try_from(decoder.total_in())
        .map_err(|_| Error::corrupt("deflate stream length overflows"))?;
    Ok((out, consumed))
}

pub fn deflate_raw(input: &[u8]) -> Result<Vec<u8>> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(input)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::corrupt(format!("deflate failed: {e}")))
}

/// Copy `reader` into the file at `dst` in [`CHUNK_SIZE`] pieces.
///
/// Read errors come from a decoder and are reported as corrupt input.
pub fn copy_chunks<R: Read>(mut reader: R, dst: &Path) -> Result<u64> {
    let mut out = pakt_fs::create(dst)?;
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::corrupt(format!("stream decode failed: {e}"))),
        };
        out.write_all(&buffer[..n])
            .map_err(|e| Error::write(dst.to_path_buf(), e))?;
        total += n as u64;
    }

    out.flush().map_err(|e| Error::write(dst.to_path_buf(), e))?;
    Ok(total)
}
