//! Archive extraction and creation with zip-slip protection.
//!
//! # Architecture
//!
//! - `binary.rs` - Offset-addressed little-endian reads over archive buffers
//! - `sanitize.rs` - Path guard (zip-slip prevention)
//! - `codec/` - ZIP, TAR, GZIP and BZIP2 codecs
//! - `dispatch.rs` - Extension-based codec selection and the adapter registry
//! - `entry.rs` - Parsed entry metadata
//! - `options.rs` - Codec configuration

pub use codec::Adapter;
pub use codec::bzip2::Bzip2Codec;
pub use codec::gzip::GzipCodec;
pub use codec::tar::TarCodec;
pub use codec::zip::{ZipCodec, ZipStrategy};
pub use dispatch::{AdapterRegistry, ArchiveDispatcher};
pub use entry::{
    ArchiveEntry, ArchiveMetadata, CompressionMethod, EntryType, InputFile, Permissions,
};
pub use error::{Error, ErrorKind, Result};
pub use format::{Format, Plan};
pub use options::{CHUNK_SIZE, CodecOptions};
pub use sanitize::{PathGuard, SanitizedPath};

pub mod binary;
pub mod codec;
mod dispatch;
pub mod entry;
mod error;
pub mod format;
pub mod options;
mod sanitize;
