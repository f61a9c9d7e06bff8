//! ZIP reading through one of two strategies, and ZIP creation.
//!
//! Both strategies take their entry list from the central directory walk in
//! [`parse`], so they agree on duplicates and on what [`ZipCodec::list`]
//! reports. The custom strategy also decompresses here; the native strategy
//! hands decompression to the `zip` crate.

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use pakt_fs::WriteOptions;
use tracing::info;

use crate::codec::{self, Adapter, Unpacker};
use crate::entry::{ArchiveMetadata, InputFile};
use crate::error::{Error, Result};
use crate::format::Format;

pub mod dostime;
#[cfg(feature = "native-zip")]
mod native;
pub mod parse;
mod write;

pub use dostime::DosTimestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipStrategy {
    /// Delegate decompression to the `zip` crate.
    Native,
    /// Parse headers and decompress entries here.
    Custom,
}

#[derive(Clone, Copy, Debug)]
pub struct ZipCodec {
    strategy: ZipStrategy,
}

impl Default for ZipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipCodec {
    /// Native when the `zip` crate is compiled in, custom otherwise.
    pub fn new() -> Self {
        let strategy = if cfg!(feature = "native-zip") {
            ZipStrategy::Native
        } else {
            ZipStrategy::Custom
        };
        Self { strategy }
    }

    pub fn native() -> Result<Self> {
        if !cfg!(feature = "native-zip") {
            return Err(Error::UnsupportedFormat(
                "native zip support is not compiled in".to_string(),
            ));
        }
        Ok(Self {
            strategy: ZipStrategy::Native,
        })
    }

    pub fn custom() -> Self {
        Self {
            strategy: ZipStrategy::Custom,
        }
    }

    pub fn strategy(&self) -> ZipStrategy {
        self.strategy
    }

    /// Parse a buffer into metadata without writing anything.
    pub fn parse(data: &[u8]) -> Result<ArchiveMetadata> {
        parse::parse(data)
    }

    pub fn list(&self, archive: &Path) -> Result<ArchiveMetadata> {
        parse::parse(&codec::read_archive(archive)?)
    }

    /// Unpack `archive` into `destination`. The first entry that fails the
    /// path guard or its integrity check aborts the call.
    pub fn extract_to(&self, archive: &Path, destination: &Path) -> Result<ArchiveMetadata> {
        let data = codec::read_archive(archive)?;

        let metadata = match self.strategy {
            ZipStrategy::Custom => {
                let metadata = parse::parse(&data)?;
                let unpacker = Unpacker::new(destination)?;
                parse::unpack(&data, &metadata, &unpacker)?;
                metadata
            }
            #[cfg(feature = "native-zip")]
            ZipStrategy::Native => native::extract(&data, &Unpacker::new(destination)?)?,
            #[cfg(not(feature = "native-zip"))]
            ZipStrategy::Native => {
                return Err(Error::UnsupportedFormat(
                    "native zip support is not compiled in".to_string(),
                ));
            }
        };

        info!(
            archive = %archive.display(),
            destination = %destination.display(),
            strategy = ?self.strategy,
            entries = metadata.len(),
            "zip extracted"
        );
        Ok(metadata)
    }

    /// Assemble an archive of `files` in memory, all stamped `modified`.
    pub fn build(files: &[InputFile], modified: NaiveDateTime) -> Result<Vec<u8>> {
        write::build(files, modified)
    }

    /// Write a new archive at `archive`, stamped with the current local time.
    pub fn create(&self, archive: &Path, files: &[InputFile]) -> Result<()> {
        let data = write::build(files, Local::now().naive_local())?;
        pakt_fs::atomic_write(archive, &data, WriteOptions::new())?;
        info!(
            archive = %archive.display(),
            entries = files.len(),
            bytes = data.len(),
            "zip created"
        );
        Ok(())
    }
}

impl Adapter for ZipCodec {
    fn format(&self) -> Format {
        Format::Zip
    }

    fn is_supported(&self) -> bool {
        self.strategy == ZipStrategy::Custom || cfg!(feature = "native-zip")
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        self.extract_to(archive, destination).map(|_| ())
    }
}
