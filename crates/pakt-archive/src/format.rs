use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A codec the engine knows how to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Zip,
    Tar,
    Gzip,
    Bzip2,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Zip, Format::Tar, Format::Gzip, Format::Bzip2];

    pub fn name(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        }
    }

    /// Containers unpack into a directory; the rest decompress one stream.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Zip | Self::Tar)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            "gzip" => Ok(Self::Gzip),
            "bzip2" => Ok(Self::Bzip2),
            _ => Err(Error::UnsupportedFormat(format!("no codec named '{s}'"))),
        }
    }
}

/// How an archive path is unpacked: one container codec, or a stream codec
/// whose output is either a TAR to unpack or a plain file to copy out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plan {
    Direct(Format),
    Chained { stream: Format, inner_tar: bool },
}

impl Plan {
    /// Pick a plan from the archive's file name alone. No I/O happens here.
    pub fn for_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let plan = match extension.as_str() {
            "zip" => Self::Direct(Format::Zip),
            "tar" => Self::Direct(Format::Tar),
            "tgz" | "gz" | "gzip" => Self::Chained {
                stream: Format::Gzip,
                inner_tar: extension == "tgz" || file_name.contains(".tar"),
            },
            "tbz2" | "bz2" | "bzip2" => Self::Chained {
                stream: Format::Bzip2,
                inner_tar: extension == "tbz2" || file_name.contains(".tar"),
            },
            _ => return Err(Error::UnknownArchiveType { extension }),
        };
        Ok(plan)
    }

    pub fn formats(self) -> (Format, Option<Format>) {
        match self {
            Self::Direct(format) => (format, None),
            Self::Chained { stream, inner_tar } => (stream, inner_tar.then_some(Format::Tar)),
        }
    }
}

/// Name of the decompressed output for a non-TAR stream: the archive's
/// file name with its compression extension removed.
pub fn stripped_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}
