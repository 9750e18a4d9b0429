//! Packing a directory tree into a data blob and its index table.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use builtin_fs::{
    config::{DEFAULT_PREFIX, MAX_PATH_LEN},
    store::{canonicalize, join_virtual},
};
use clap::Parser;
use regex::Regex;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Parser)]
#[clap(name = "builtin-pack", version)]
/// Pack a directory into a data blob and a Rust index table for builtin-fs
pub struct Pack {
    /// Directory to pack
    #[clap(short = 'i', long = "input-path")]
    pub input: PathBuf,

    /// Rust file to generate. The blob is written next to it as
    /// `<stem>_data.bin`.
    #[clap(short = 'o', long = "output-path")]
    pub output: PathBuf,

    /// Prefix of every virtual path
    #[clap(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Skip entries whose path relative to the input matches this regex
    #[clap(long)]
    pub skip: Option<Regex>,

    /// Print the index instead of writing any file
    #[clap(long)]
    pub dry_run: bool,

    /// Log more, once per level
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Pack {
    /// Execute the pack command
    pub fn execute(&self) -> Result<()> {
        let packed = collect(&self.input, &self.prefix, self.skip.as_ref())?;
        let (rs_path, bin_path) = output_paths(&self.output);

        if self.dry_run {
            print!("{}", packed.summary());
            return Ok(());
        }

        fs::write(&bin_path, &packed.data)
            .with_context(|| format!("unable to write {}", bin_path.display()))?;
        info!(path = %bin_path.display(), bytes = packed.data.len(), "wrote data blob");

        let data_file = bin_path
            .file_name()
            .and_then(|name| name.to_str())
            .context("the output path must be valid UTF-8")?;
        let source = render_index(&self.prefix, data_file, &packed.entries);
        fs::write(&rs_path, source)
            .with_context(|| format!("unable to write {}", rs_path.display()))?;
        info!(path = %rs_path.display(), files = packed.entries.len(), "wrote index");

        eprintln!(
            "Packed {} files ({} bytes) into {}",
            packed.entries.len(),
            packed.data.len(),
            rs_path.display()
        );
        Ok(())
    }
}

/// One packed file: its virtual path and its byte range in the blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    /// Canonical virtual path, prefix included
    pub virtual_path: String,
    /// Offset of the first byte
    pub start: usize,
    /// Offset one past the last byte
    pub end: usize,
}

/// The concatenated contents of every packed file.
#[derive(Debug, Default)]
pub struct Packed {
    /// All file contents, back to back
    pub data: Vec<u8>,
    /// Index rows, in walk order
    pub entries: Vec<PackEntry>,
}

impl Packed {
    /// Human readable table of the index.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{:>10} {:>10}  {}",
                entry.start, entry.end, entry.virtual_path
            );
        }
        let _ = writeln!(
            out,
            "{} files, {} bytes",
            self.entries.len(),
            self.data.len()
        );
        out
    }
}

/// Walks `input` in file name order and concatenates every regular file.
///
/// Entries whose name starts with `.` are skipped, as is anything whose
/// `/`-separated path relative to `input` matches `skip`. A skipped
/// directory is not descended into.
pub fn collect(input: &Path, prefix: &str, skip: Option<&Regex>) -> Result<Packed> {
    if !input.is_dir() {
        bail!(
            "input path \"{}\" does not exist or is not a directory",
            input.display()
        );
    }

    let mut packed = Packed::default();
    let walker = WalkDir::new(input)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| keep(input, entry, skip));

    for entry in walker {
        let entry = entry.with_context(|| format!("unable to walk \"{}\"", input.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_path(input, entry.path())
            .with_context(|| format!("\"{}\" is not valid UTF-8", entry.path().display()))?;
        let virtual_path = canonicalize(&join_virtual(prefix, &relative), usize::MAX);
        if virtual_path.len() >= MAX_PATH_LEN {
            bail!(
                "virtual path \"{virtual_path}\" is longer than {} bytes",
                MAX_PATH_LEN - 1
            );
        }

        let contents = fs::read(entry.path())
            .with_context(|| format!("unable to read \"{}\"", entry.path().display()))?;
        let start = packed.data.len();
        packed.data.extend_from_slice(&contents);
        debug!(path = %virtual_path, start, len = contents.len(), "packed file");
        packed.entries.push(PackEntry {
            virtual_path,
            start,
            end: packed.data.len(),
        });
    }

    Ok(packed)
}

fn keep(root: &Path, entry: &DirEntry, skip: Option<&Regex>) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    if entry.file_name().to_string_lossy().starts_with('.') {
        return false;
    }
    match (skip, relative_path(root, entry.path())) {
        (Some(skip), Some(relative)) if skip.is_match(&relative) => {
            debug!(path = %relative, "skipped");
            false
        }
        _ => true,
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Splits `-o` into the Rust file and the blob written next to it.
pub fn output_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = if output.extension().is_some_and(|ext| ext == "rs") {
        output.with_extension("")
    } else {
        output.to_path_buf()
    };
    let mut rs = stem.clone().into_os_string();
    rs.push(".rs");
    let mut bin = stem.into_os_string();
    bin.push("_data.bin");
    (PathBuf::from(rs), PathBuf::from(bin))
}

/// Rust source defining `BUILTIN_PREFIX`, `BUILTIN_DATA` and
/// `BUILTIN_INDEX`, ready for `StaticStore::from_blob`.
pub fn render_index(prefix: &str, data_file: &str, entries: &[PackEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// @generated by builtin-pack. Do not edit.");
    let _ = writeln!(out);
    let _ = writeln!(out, "pub const BUILTIN_PREFIX: &str = {prefix:?};");
    let _ = writeln!(
        out,
        "pub static BUILTIN_DATA: &[u8] = include_bytes!({data_file:?});"
    );
    let _ = writeln!(out, "pub static BUILTIN_INDEX: &[(&str, usize, usize)] = &[");
    for entry in entries {
        let _ = writeln!(
            out,
            "    ({:?}, {}, {}),",
            entry.virtual_path, entry.start, entry.end
        );
    }
    let _ = writeln!(out, "];");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib/Foo")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("t")).unwrap();
        fs::write(root.join("lib/strict.pm"), "package strict; 1;\n").unwrap();
        fs::write(root.join("lib/Foo/Bar.pm"), "1;").unwrap();
        fs::write(root.join("lib/.hidden"), "secret").unwrap();
        fs::write(root.join(".git/HEAD"), "ref").unwrap();
        fs::write(root.join("t/basic.t"), "ok").unwrap();
        fs::write(root.join("README"), "hi").unwrap();
        dir
    }

    fn paths(packed: &Packed) -> Vec<&str> {
        packed
            .entries
            .iter()
            .map(|e| e.virtual_path.as_str())
            .collect()
    }

    #[test]
    fn walks_sorted_and_skips_dot_entries() {
        let dir = tree();
        let packed = collect(dir.path(), "builtin:", None).unwrap();
        assert_eq!(
            paths(&packed),
            vec![
                "builtin:/README",
                "builtin:/lib/Foo/Bar.pm",
                "builtin:/lib/strict.pm",
                "builtin:/t/basic.t",
            ]
        );
    }

    #[test]
    fn ranges_cover_the_blob() {
        let dir = tree();
        let packed = collect(dir.path(), "builtin:", None).unwrap();
        let mut expected_start = 0;
        for entry in &packed.entries {
            assert_eq!(entry.start, expected_start);
            expected_start = entry.end;
        }
        assert_eq!(expected_start, packed.data.len());

        let strict = &packed.entries[2];
        assert_eq!(
            &packed.data[strict.start..strict.end],
            b"package strict; 1;\n"
        );
    }

    #[test]
    fn skip_regex_prunes_directories() {
        let dir = tree();
        let skip = Regex::new(r"^t(/|$)").unwrap();
        let packed = collect(dir.path(), "builtin:", Some(&skip)).unwrap();
        assert!(!paths(&packed).contains(&"builtin:/t/basic.t"));
        assert_eq!(packed.entries.len(), 3);
    }

    #[test]
    fn empty_prefix_keeps_relative_paths() {
        let dir = tree();
        let packed = collect(dir.path(), "", None).unwrap();
        assert_eq!(packed.entries[0].virtual_path, "README");
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect(&dir.path().join("nope"), "builtin:", None).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn output_naming() {
        assert_eq!(
            output_paths(Path::new("gen/files.rs")),
            (
                PathBuf::from("gen/files.rs"),
                PathBuf::from("gen/files_data.bin")
            )
        );
        assert_eq!(
            output_paths(Path::new("gen/files")),
            (
                PathBuf::from("gen/files.rs"),
                PathBuf::from("gen/files_data.bin")
            )
        );
    }

    #[test]
    fn rendered_index() {
        let entries = vec![
            PackEntry {
                virtual_path: "builtin:/a".to_string(),
                start: 0,
                end: 3,
            },
            PackEntry {
                virtual_path: "builtin:/say \"hi\"".to_string(),
                start: 3,
                end: 5,
            },
        ];
        let source = render_index("builtin:", "files_data.bin", &entries);
        assert_eq!(
            source,
            "// @generated by builtin-pack. Do not edit.\n\
             \n\
             pub const BUILTIN_PREFIX: &str = \"builtin:\";\n\
             pub static BUILTIN_DATA: &[u8] = include_bytes!(\"files_data.bin\");\n\
             pub static BUILTIN_INDEX: &[(&str, usize, usize)] = &[\n    \
             (\"builtin:/a\", 0, 3),\n    \
             (\"builtin:/say \\\"hi\\\"\", 3, 5),\n\
             ];\n"
        );
    }

    #[test]
    fn packed_blob_loads_into_a_store() {
        let dir = tree();
        let packed = collect(dir.path(), "builtin:", None).unwrap();
        let blob: &'static [u8] = Box::leak(packed.data.clone().into_boxed_slice());
        let index = packed
            .entries
            .iter()
            .map(|e| (e.virtual_path.as_str(), e.start, e.end))
            .collect::<Vec<_>>();

        let store = builtin_fs::StaticStore::from_blob("builtin:", blob, &index).unwrap();
        assert_eq!(
            &store.lookup("builtin://lib//Foo/Bar.pm").unwrap()[..],
            b"1;"
        );
        assert!(store.lookup("builtin:/lib/.hidden").is_none());
    }
}
