use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read archive '{path}': {source}")]
    UnreadableArchive { path: PathBuf, source: io::Error },

    #[error("corrupt archive data: {0}")]
    CorruptData(String),

    #[error("zip-slip attack detected: entry '{entry}' resolves to '{resolved}'")]
    PathTraversal { entry: PathBuf, resolved: PathBuf },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown archive type: '{extension}'")]
    UnknownArchiveType { extension: String },

    #[error("failed to write '{path}': {source}")]
    WriteFailure { path: PathBuf, source: io::Error },
}

/// Coarse classification of [`Error`], for callers that only branch on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnreadableArchive,
    CorruptData,
    PathTraversal,
    UnsupportedFormat,
    UnknownArchiveType,
    WriteFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnreadableArchive { .. } => ErrorKind::UnreadableArchive,
            Self::CorruptData(_) => ErrorKind::CorruptData,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::UnknownArchiveType { .. } => ErrorKind::UnknownArchiveType,
            Self::WriteFailure { .. } => ErrorKind::WriteFailure,
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

impl From<pakt_fs::Error> for Error {
    fn from(e: pakt_fs::Error) -> Self {
        match e {
            pakt_fs::Error::Read { path, source } => Self::UnreadableArchive { path, source },
            pakt_fs::Error::Write { path, source }
            | pakt_fs::Error::CreateDir { path, source }
            | pakt_fs::Error::Permissions { path, source } => Self::WriteFailure { path, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
