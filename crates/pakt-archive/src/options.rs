use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Bytes moved per read/write in streaming mode.
pub const CHUNK_SIZE: usize = 8192;

/// Recognized codec settings. Unknown configuration keys are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Directory for intermediate decompressed files.
    pub tmp_path: PathBuf,
    /// Copy through decoders in [`CHUNK_SIZE`] chunks instead of decoding whole buffers.
    pub use_streams: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            tmp_path: std::env::temp_dir(),
            use_streams: false,
        }
    }
}

impl CodecOptions {
    pub fn tmp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_path = path.into();
        self
    }

    pub fn use_streams(mut self, enabled: bool) -> Self {
        self.use_streams = enabled;
        self
    }

    /// Layer a TOML file and `PAKT_*` environment variables over the defaults.
    ///
    /// A missing file is not an error; the environment still applies.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(config_path.as_ref()))
            .merge(Env::prefixed("PAKT_"))
            .extract()
            .map_err(|e| Error::corrupt(format!("invalid codec configuration: {e}")))
    }

    /// Defaults overridden by `PAKT_*` environment variables only.
    pub fn from_env() -> Result<Self> {
        Figment::new()
            .merge(Env::prefixed("PAKT_"))
            .extract()
            .map_err(|e| Error::corrupt(format!("invalid codec configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn codec_options_default() {
        let options = CodecOptions::default();
        assert_eq!(options.tmp_path, std::env::temp_dir());
        assert!(!options.use_streams);
    }

    #[test]
    fn codec_options_builder_pattern() {
        let options = CodecOptions::default()
            .tmp_path("/scratch")
            .use_streams(true);
        assert_eq!(options.tmp_path, PathBuf::from("/scratch"));
        assert!(options.use_streams);
    }

    #[test]
    fn load_from_toml_ignores_unknown_keys() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pakt.toml",
                r#"
                    use_streams = true
                    tmp_path = "/scratch/pakt"
                    colour = "blue"
                "#,
            )?;
            let options = CodecOptions::load("pakt.toml").map_err(|e| e.to_string())?;
            assert!(options.use_streams);
            assert_eq!(options.tmp_path, PathBuf::from("/scratch/pakt"));
            Ok(())
        });
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("pakt.toml", "use_streams = true")?;
            let options = CodecOptions::load("pakt.toml").map_err(|e| e.to_string())?;
            assert_eq!(options.tmp_path, std::env::temp_dir());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("pakt.toml", "use_streams = false")?;
            jail.set_env("PAKT_USE_STREAMS", "true");
            let options = CodecOptions::load("pakt.toml").map_err(|e| e.to_string())?;
            assert!(options.use_streams);

            let options = CodecOptions::from_env().map_err(|e| e.to_string())?;
            assert!(options.use_streams);
            Ok(())
        });
    }

    #[test]
    fn malformed_value_is_corrupt() {
        Jail::expect_with(|jail| {
            jail.create_file("pakt.toml", "use_streams = \"sometimes\"")?;
            let result = CodecOptions::load("pakt.toml");
            assert!(matches!(result, Err(Error::CorruptData(_))));
            Ok(())
        });
    }
}
