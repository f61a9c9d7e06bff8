use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Result of checking an archive entry name against the extraction root.
#[derive(Clone, Debug)]
pub struct SanitizedPath {
    pub original: PathBuf,
    pub resolved: PathBuf,
}

/// Zip-slip guard for one extraction root.
///
/// The root is created and canonicalized once. Every candidate is resolved
/// against it lexically, then the deepest part of the candidate that already
/// exists on disk is canonicalized too, so a symlink planted by an earlier
/// entry cannot redirect a later write outside the root.
#[derive(Clone, Debug)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        pakt_fs::ensure_dir(root)?;
        let root = root
            .canonicalize()
            .map_err(|e| Error::write(root.to_path_buf(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `entry` (an archive member name) to a path under the root.
    pub fn resolve(&self, entry: &str) -> Result<SanitizedPath> {
        if entry.contains('\0') {
            return Err(Error::corrupt(format!("entry name contains NUL: {entry:?}")));
        }

        let original = PathBuf::from(entry);
        let unified = entry.replace('\\', "/");
        if is_absolute_name(&unified) {
            return Err(Error::PathTraversal {
                entry: original,
                resolved: PathBuf::from(unified),
            });
        }

        let resolved = normalize_path(&self.root.join(&unified));
        if !resolved.starts_with(&self.root) {
            return Err(Error::PathTraversal {
                entry: original,
                resolved,
            });
        }

        let existing = deepest_existing(&resolved);
        if let Ok(real) = existing.canonicalize() {
            if !real.starts_with(&self.root) {
                return Err(Error::PathTraversal {
                    entry: original,
                    resolved: real,
                });
            }
        }

        Ok(SanitizedPath { original, resolved })
    }
}

fn is_absolute_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    name.starts_with('/')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
        || Path::new(name).is_absolute()
}

fn deepest_existing(path: &Path) -> &Path {
    let mut current = path;
    while current.symlink_metadata().is_err() {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current
}

/// Resolve `.` and `..` lexically. `..` never climbs above the first component.
fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push(component.as_os_str()),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }

    result
}
