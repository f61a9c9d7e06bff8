//! Extraction with the `zip` crate doing the decompression.
//!
//! The entry list still comes from our own central directory walk, so
//! duplicate names are all processed in record order, as the custom strategy
//! does. The library's index keeps one record per name (the last); earlier
//! records it shadows are decoded by [`parse::read_entry`].

use std::collections::HashMap;
use std::io::{Cursor, Read};

use tracing::warn;

use super::parse;
use crate::codec::{self, Unpacker};
use crate::entry::{ArchiveEntry, ArchiveMetadata, EntryType};
use crate::error::{Error, Result};

fn map_err(e: ::zip::result::ZipError) -> Error {
    match e {
        ::zip::result::ZipError::UnsupportedArchive(msg) => {
            Error::UnsupportedFormat(format!("zip: {msg}"))
        }
        other => Error::corrupt(format!("zip: {other}")),
    }
}

fn read_native<R: Read + std::io::Seek>(
    archive: &mut ::zip::ZipArchive<R>,
    index: usize,
    entry: &ArchiveEntry,
) -> Result<Vec<u8>> {
    let mut file = archive.by_index(index).map_err(map_err)?;
    let mut content =
        Vec::with_capacity(codec::bounded_capacity(entry.size, entry.compressed_size as usize));
    file.read_to_end(&mut content)
        .map_err(|e| Error::corrupt(format!("zip entry '{}': {e}", entry.name)))?;
    if content.len() as u64 != entry.size {
        return Err(Error::corrupt(format!(
            "'{}' decoded to {} bytes, header says {}",
            entry.name,
            content.len(),
            entry.size
        )));
    }
    Ok(content)
}

/// Unpack every entry of `data` in central directory order.
pub fn extract(data: &[u8], unpacker: &Unpacker) -> Result<ArchiveMetadata> {
    let metadata = parse::parse(data)?;
    let mut archive = ::zip::ZipArchive::new(Cursor::new(data)).map_err(map_err)?;

    let last_of_name: HashMap<&str, usize> = metadata
        .iter()
        .enumerate()
        .map(|(position, entry)| (entry.name.as_str(), position))
        .collect();

    for (position, entry) in metadata.iter().enumerate() {
        match entry.entry_type {
            EntryType::Directory => {
                unpacker.directory(&entry.name)?;
            }
            EntryType::File => {
                let indexed = (last_of_name.get(entry.name.as_str()) == Some(&position))
                    .then(|| archive.index_for_name(&entry.name))
                    .flatten();
                let content = match indexed {
                    Some(index) => read_native(&mut archive, index, entry)?,
                    None => parse::read_entry(data, entry)?,
                };
                unpacker.file(&entry.name, &content, entry.mode())?;
            }
            other => {
                unpacker.target(&entry.name)?;
                warn!(entry = %entry.name, kind = ?other, "not materializing zip entry");
            }
        }
    }

    Ok(metadata)
}
