//! Read-only builtin files for sandboxed guests.
//!
//! A [`StaticStore`] holds files compiled into the binary under a reserved
//! path prefix. [`FsShim`] places those files in the same integer descriptor
//! namespace as the real files of the process and dispatches `open`,
//! `close`, `read`, `seek`, `stat`, `fstat`, `access` and `fileno` to either
//! the store or a [`HostFs`].
//!
//! ```
//! use builtin_fs::{FsShim, NullHostFs, StaticStore};
//!
//! let store = StaticStore::builder("builtin:")
//!     .file("motd", &b"hi"[..])
//!     .build();
//! let mut shim = FsShim::new(store, NullHostFs);
//!
//! let fd = shim.open("builtin://motd", 0, 0)?;
//! let mut buf = [0u8; 8];
//! assert_eq!(shim.read(fd, &mut buf)?, 2);
//! shim.close(fd)?;
//! # Ok::<(), builtin_fs::FsError>(())
//! ```

pub mod config;
mod error;
pub mod fd_bitmap;
mod file;
pub mod handle;
pub mod host;
mod shim;
pub mod store;

/// Descriptor integer, as used by the C library.
pub type RawFd = i32;

pub use config::{ExhaustionPolicy, FsConfig};
pub use error::{FsError, Result};
pub use fd_bitmap::FdArbiter;
pub use file::BuiltinFile;
pub use handle::{BuiltinHandle, HandleTable, StreamId};
#[cfg(all(unix, feature = "host-fs"))]
pub use host::LibcHostFs;
pub use host::{FileStat, HostFs, NullHostFs};
pub use shim::{FsShim, Stream};
pub use store::{StaticStore, StaticStoreBuilder, canonicalize};
