//! Runtime shim for guests embedded in a restricted host.
//!
//! Two independent pieces are bundled here:
//!
//! - [`builtin_fs`]: read-only files compiled into the binary, served through the
//!   same descriptor namespace as the real files of the process.
//! - [`host_async`] (feature `async`): a bounded registry of operations the
//!   host performs on behalf of the guest, polled at suspension points.
//!
//! Both are plain values owned by the embedding. Nothing here keeps global
//! state.

#![deny(unused_imports, unused_variables)]

pub use builtin_fs;
#[cfg(feature = "async")]
pub use host_async;
pub use slot_table;

/// The types most embeddings need.
pub mod prelude {
    pub use builtin_fs::{
        ExhaustionPolicy, FsConfig, FsError, FsShim, HostFs, NullHostFs, StaticStore,
    };
    #[cfg(feature = "async")]
    pub use host_async::{
        AsyncDriver, AsyncRegistry, FetchRequest, HostBridge, OpId, OpKind, OpState, Outcome,
        RegistryError, TokioHost,
    };
    #[cfg(unix)]
    pub use builtin_fs::LibcHostFs;
}
