/// Number of descriptor integers tracked by the arbiter.
pub const FD_MAX_TRACK: usize = 32;
/// Maximum number of builtin files open at the same time.
pub const MAX_OPEN_BUILTIN_FILES: usize = 16;
/// Descriptors below this value (stdin, stdout, stderr) are never handed out.
pub const RESERVED_FDS: usize = 3;
/// Size of the canonical path buffer, terminator included. Used by
/// [`StaticStore`](crate::StaticStore) builders.
pub const MAX_PATH_LEN: usize = 256;
/// Prefix that routes a path to the builtin store.
pub const DEFAULT_PREFIX: &str = "builtin:";
/// Exit status used by [`ExhaustionPolicy::Terminate`].
pub const FD_EXHAUSTED_EXIT_CODE: i32 = 10;

/// What the arbiter does when no descriptor integer is free.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "enable-serde", serde(rename_all = "kebab-case"))]
pub enum ExhaustionPolicy {
    /// Report [`FsError::DescriptorsExhausted`](crate::FsError::DescriptorsExhausted).
    #[default]
    Error,
    /// Exit the process with [`FD_EXHAUSTED_EXIT_CODE`].
    Terminate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "enable-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "enable-serde", serde(default))]
pub struct FsConfig {
    /// Upper bound (exclusive) of tracked descriptor integers.
    pub fd_max: usize,
    /// Capacity of the open builtin file table.
    pub max_open_files: usize,
    /// First descriptor the arbiter may allocate.
    pub reserved_fds: usize,
    pub on_fd_exhaustion: ExhaustionPolicy,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            fd_max: FD_MAX_TRACK,
            max_open_files: MAX_OPEN_BUILTIN_FILES,
            reserved_fds: RESERVED_FDS,
            on_fd_exhaustion: ExhaustionPolicy::Error,
        }
    }
}

impl FsConfig {
    pub fn with_max_open_files(mut self, max_open_files: usize) -> Self {
        self.max_open_files = max_open_files;
        self
    }

    pub fn with_fd_max(mut self, fd_max: usize) -> Self {
        self.fd_max = fd_max;
        self
    }

    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_fd_exhaustion = policy;
        self
    }
}
