//! Extension-driven entry point and the per-format adapter registry.

use std::path::Path;

use once_cell::unsync::OnceCell;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::codec::bzip2::{self, Bzip2Codec};
use crate::codec::gzip::{self, GzipCodec};
use crate::codec::tar::{self, TarCodec};
use crate::codec::zip::ZipCodec;
use crate::codec::{self, Adapter};
use crate::entry::{ArchiveEntry, ArchiveMetadata, CompressionMethod, EntryType, InputFile};
use crate::error::{Error, Result};
use crate::format::{self, Format, Plan};
use crate::options::CodecOptions;
use crate::sanitize::PathGuard;

fn slot(format: Format) -> usize {
    match format {
        Format::Zip => 0,
        Format::Tar => 1,
        Format::Gzip => 2,
        Format::Bzip2 => 3,
    }
}

fn default_adapter(format: Format, options: &CodecOptions) -> Result<Box<dyn Adapter>> {
    let adapter: Box<dyn Adapter> = match format {
        Format::Zip => Box::new(ZipCodec::new()),
        Format::Tar => Box::new(TarCodec::new()),
        Format::Gzip => Box::new(GzipCodec::new(options.clone())),
        Format::Bzip2 => Box::new(Bzip2Codec::new(options.clone())?),
    };
    debug!(%format, "constructed default adapter");
    Ok(adapter)
}

/// One lazily built adapter per format. Built-in codecs are constructed on
/// first use; a failed construction is reported and retried next time.
#[derive(Default)]
pub struct AdapterRegistry {
    slots: [OnceCell<Box<dyn Adapter>>; 4],
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, format: Format, options: &CodecOptions) -> Result<&dyn Adapter> {
        self.slots[slot(format)]
            .get_or_try_init(|| default_adapter(format, options))
            .map(|adapter| &**adapter)
    }

    /// Replace the adapter for the format called `name`.
    ///
    /// Rejected with [`Error::UnsupportedFormat`] when the adapter reports
    /// itself unsupported or handles a different format.
    pub fn register(&mut self, name: &str, adapter: Box<dyn Adapter>) -> Result<()> {
        let format: Format = name.parse()?;
        if adapter.format() != format {
            return Err(Error::UnsupportedFormat(format!(
                "adapter for {} cannot be registered as {format}",
                adapter.format()
            )));
        }
        if !adapter.is_supported() {
            return Err(Error::UnsupportedFormat(format!(
                "{format} adapter is not supported in this environment"
            )));
        }
        self.slots[slot(format)] = OnceCell::with_value(adapter);
        info!(%format, "adapter overridden");
        Ok(())
    }

    pub fn is_loaded(&self, format: Format) -> bool {
        self.slots[slot(format)].get().is_some()
    }
}

pub struct ArchiveDispatcher {
    options: CodecOptions,
    registry: AdapterRegistry,
}

impl Default for ArchiveDispatcher {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl ArchiveDispatcher {
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            registry: AdapterRegistry::new(),
        }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn register(&mut self, name: &str, adapter: Box<dyn Adapter>) -> Result<()> {
        self.registry.register(name, adapter)
    }

    /// Whether `format` can be used right now, building its adapter if needed.
    pub fn is_supported(&self, format: Format) -> bool {
        self.registry
            .get(format, &self.options)
            .is_ok_and(|adapter| adapter.is_supported())
    }

    /// Unpack `archive` into the directory `destination`.
    ///
    /// The codec chain is chosen from the file name before anything is read.
    /// For compressed streams the decoded bytes go through a temp file under
    /// `tmp_path`, which is removed however the call ends.
    pub fn extract(&self, archive: &Path, destination: &Path) -> Result<()> {
        let plan = Plan::for_path(archive)?;
        info!(
            archive = %archive.display(),
            destination = %destination.display(),
            ?plan,
            "extracting"
        );

        match plan {
            Plan::Direct(format) => self
                .registry
                .get(format, &self.options)?
                .extract(archive, destination),
            Plan::Chained { stream, inner_tar } => {
                let decoder = self.registry.get(stream, &self.options)?;
                let unpacker = if inner_tar {
                    Some(self.registry.get(Format::Tar, &self.options)?)
                } else {
                    None
                };

                let temp = self.temp_file()?;
                let run = || -> Result<()> {
                    decoder.extract(archive, &temp)?;
                    match unpacker {
                        Some(tar) => tar.extract(&temp, destination),
                        None => copy_out(&temp, archive, destination),
                    }
                };
                let result = run();
                remove_temp(temp);
                result
            }
        }
    }

    /// Read the entry list of `archive` without extracting anything.
    ///
    /// Always uses the built-in parsers. A compressed stream that does not
    /// hold a TAR is listed as one file.
    pub fn list(&self, archive: &Path) -> Result<ArchiveMetadata> {
        let plan = Plan::for_path(archive)?;
        let data = codec::read_archive(archive)?;

        match plan {
            Plan::Direct(Format::Zip) => ZipCodec::parse(&data),
            Plan::Direct(Format::Tar) => tar::parse(&data),
            Plan::Direct(other) => Err(Error::UnsupportedFormat(format!(
                "{other} is not a container format"
            ))),
            Plan::Chained { stream, inner_tar } => {
                let (decoded, compression, payload_offset) = match stream {
                    Format::Gzip => (
                        gzip::decode(&data)?,
                        CompressionMethod::Deflated,
                        gzip::payload_offset(&data)?,
                    ),
                    _ => (bzip2::decode(&data)?, CompressionMethod::Bzip2, 0),
                };
                if inner_tar {
                    return tar::parse(&decoded);
                }
                let entry = ArchiveEntry {
                    name: format::stripped_name(archive),
                    entry_type: EntryType::File,
                    size: decoded.len() as u64,
                    compressed_size: data.len() as u64,
                    compression,
                    modified_at: None,
                    crc32: crate::binary::crc32(&decoded),
                    permissions: None,
                    payload_offset: payload_offset as u64,
                    link_target: None,
                    is_text: false,
                };
                Ok(ArchiveMetadata::new(stream, vec![entry]))
            }
        }
    }

    /// Write a new ZIP archive of `files` at `archive`.
    pub fn create(&self, archive: &Path, files: &[InputFile]) -> Result<()> {
        match Plan::for_path(archive)? {
            Plan::Direct(Format::Zip) => ZipCodec::new().create(archive, files),
            plan => Err(Error::UnsupportedFormat(format!(
                "cannot create {} archives, only zip",
                plan.formats().0
            ))),
        }
    }

    fn temp_file(&self) -> Result<TempPath> {
        let dir = &self.options.tmp_path;
        pakt_fs::ensure_dir(dir)?;
        let file = tempfile::Builder::new()
            .prefix("pakt-")
            .tempfile_in(dir)
            .map_err(|e| Error::write(dir.clone(), e))?;
        Ok(file.into_temp_path())
    }
}

fn copy_out(decoded: &Path, archive: &Path, destination: &Path) -> Result<()> {
    let guard = PathGuard::new(destination)?;
    let target = guard.resolve(&format::stripped_name(archive))?.resolved;
    let bytes = pakt_fs::copy_file(decoded, &target)?;
    debug!(target = %target.display(), bytes, "copied decoded stream");
    Ok(())
}

fn remove_temp(temp: TempPath) {
    let path = temp.to_path_buf();
    if let Err(e) = temp.close() {
        warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}
