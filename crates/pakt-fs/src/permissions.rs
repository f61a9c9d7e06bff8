use std::path::Path;

use crate::Result;

/// Permission bits to apply to an extracted path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionMode {
    /// Leave whatever the process umask produced.
    #[default]
    Inherit,

    /// Raw Unix mode bits. Only the low 12 bits are applied.
    Custom(u32),
}

impl PermissionMode {
    /// Apply the mode to an existing file or directory.
    ///
    /// On Windows only the readonly attribute is touched, and only for a
    /// custom mode without any write bit.
    pub fn apply_to_path(self, path: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match self {
                Self::Inherit => return Ok(()),
                Self::Custom(mode) => mode & 0o7777,
            };
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
                crate::Error::Permissions {
                    path: path.to_path_buf(),
                    source: e,
                }
            })
        }

        #[cfg(not(unix))]
        {
            let readonly = match self {
                Self::Inherit => return Ok(()),
                Self::Custom(mode) => mode & 0o222 == 0,
            };
            if !readonly {
                return Ok(());
            }
            let mut perms = std::fs::metadata(path)
                .map_err(|e| crate::Error::Permissions {
                    path: path.to_path_buf(),
                    source: e,
                })?
                .permissions();
            perms.set_readonly(true);
            std::fs::set_permissions(path, perms).map_err(|e| crate::Error::Permissions {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let before = std::fs::metadata(&path).unwrap().permissions();
        PermissionMode::Inherit.apply_to_path(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().permissions(), before);
    }

    #[cfg(unix)]
    #[test]
    fn custom_mode_masks_file_type_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        PermissionMode::Custom(0o100_640).apply_to_path(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PermissionMode::Custom(0o444).apply_to_path(&dir.path().join("nope"));
        assert!(matches!(result, Err(crate::Error::Permissions { .. })));
    }
}
