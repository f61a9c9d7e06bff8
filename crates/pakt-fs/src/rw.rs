use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::permissions::PermissionMode;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct WriteOptions {
    pub permissions: Option<PermissionMode>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissions(mut self, mode: PermissionMode) -> Self {
        self.permissions = Some(mode);
        self
    }
}

/// Write `content` to `path` through a sibling temp file and a rename.
///
/// Missing parent directories are created first. Readers never observe a
/// half-written file; on failure the temp file is removed when dropped.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8], options: WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".pakt-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    tracing::trace!(path = %path.display(), bytes = content.len(), "atomic write");

    if let Some(mode) = options.permissions {
        mode.apply_to_path(path)?;
    }

    Ok(())
}

pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| Error::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Open an existing file for reading.
pub fn open(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    File::open(path).map_err(|e| Error::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Create (or truncate) a file for writing, creating parent directories.
pub fn create(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    File::create(path).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| Error::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copy `from` to `to`, creating the destination's parent directories.
pub fn copy_file(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<u64> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    fs::copy(from, to).map_err(|e| Error::Write {
        path: to.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");
        atomic_write(&path, b"hello world", WriteOptions::new()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        atomic_write(&path, b"nested", WriteOptions::new()).unwrap();
        assert_eq!(read(&path).unwrap(), b"nested");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        atomic_write(dir.path().join("x"), b"1", WriteOptions::new()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("x")]);
    }

    #[test]
    fn test_atomic_write_with_custom_permissions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sh");
        atomic_write(
            &path,
            b"data",
            WriteOptions::new().permissions(PermissionMode::Custom(0o755)),
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&path).unwrap();
            assert_eq!(metadata.permissions().mode() & 0o777, 0o755);
        }
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let err = read(dir.path().join("missing")).unwrap_err();
        match err {
            Error::Read { source, .. } => assert_eq!(source.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_copy_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, "content to copy").unwrap();
        let dest = dir.path().join("out/copy.txt");
        assert_eq!(copy_file(&src, &dest).unwrap(), 15);
        assert_eq!(read(&dest).unwrap(), b"content to copy");
    }
}
