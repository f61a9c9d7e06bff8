//! Filesystem primitives for the pakt archive engine.
//!
//! Every function reports failures with the offending path attached, so the
//! archive layer can surface them as read or write failures without guessing.

mod error;
pub mod permissions;
mod rw;

pub use error::{Error, Result};
pub use permissions::PermissionMode;
pub use rw::{WriteOptions, atomic_write, copy_file, create, ensure_dir, open, read};
