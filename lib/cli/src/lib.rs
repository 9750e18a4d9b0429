//! Build-time tool turning a directory into builtin files.
//!
//! `builtin-pack` concatenates the files of a directory into one data blob
//! and writes a Rust source file indexing it, which a program includes and
//! hands to `builtin_fs::StaticStore::from_blob`.

#![deny(
    missing_docs,
    dead_code,
    nonstandard_style,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

pub mod logging;
pub mod pack;

pub use pack::{Pack, PackEntry, Packed};
