//! Descriptor namespace arbiter.
//!
//! Builtin and real descriptors share one integer namespace. The arbiter
//! records every integer the shim knows to be taken, whether it handed the
//! integer out itself or observed the host allocate it, so a builtin file
//! never aliases a real one.

use tracing::{debug, error, warn};

use crate::config::{ExhaustionPolicy, FD_EXHAUSTED_EXIT_CODE, FsConfig};
use crate::{FsError, RawFd, Result};

/// Upper bound on `fd_max`. Larger configured values are clamped to it.
pub const MAX_TRACKED_FDS: usize = 1 << 16;

#[derive(Debug, Clone)]
pub struct FdArbiter {
    in_use: Vec<bool>,
    reserved: usize,
    policy: ExhaustionPolicy,
}

impl FdArbiter {
    pub fn new(config: &FsConfig) -> Self {
        Self {
            in_use: vec![false; config.fd_max.min(MAX_TRACKED_FDS)],
            reserved: config.reserved_fds,
            policy: config.on_fd_exhaustion,
        }
    }

    fn index(&self, fd: RawFd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|idx| *idx < self.in_use.len())
    }

    /// Marks and returns the lowest free integer at or above the reserved
    /// range.
    pub fn allocate(&mut self) -> Result<RawFd> {
        let start = self.reserved.min(self.in_use.len());
        let free = self.in_use[start..]
            .iter()
            .position(|used| !used)
            .map(|idx| start + idx)
            .and_then(|idx| Some((idx, RawFd::try_from(idx).ok()?)));
        if let Some((idx, fd)) = free {
            self.in_use[idx] = true;
            debug!(fd, "allocated descriptor");
            return Ok(fd);
        }

        match self.policy {
            ExhaustionPolicy::Error => {
                warn!(fd_max = self.in_use.len(), "descriptor namespace exhausted");
                Err(FsError::DescriptorsExhausted)
            }
            ExhaustionPolicy::Terminate => {
                error!(
                    fd_max = self.in_use.len(),
                    exit_code = FD_EXHAUSTED_EXIT_CODE,
                    "descriptor namespace exhausted, terminating"
                );
                std::process::exit(FD_EXHAUSTED_EXIT_CODE)
            }
        }
    }

    /// Records a descriptor allocated outside of the arbiter. Out-of-range
    /// integers are ignored.
    pub fn mark_in_use(&mut self, fd: RawFd) {
        if let Some(idx) = self.index(fd) {
            self.in_use[idx] = true;
        }
    }

    pub fn mark_free(&mut self, fd: RawFd) {
        if let Some(idx) = self.index(fd) {
            self.in_use[idx] = false;
        }
    }

    /// Out-of-range integers always count as in use.
    pub fn is_in_use(&self, fd: RawFd) -> bool {
        match self.index(fd) {
            Some(idx) => self.in_use[idx],
            None => true,
        }
    }

    /// First integer past the tracked range. Builtin descriptors are always
    /// below it.
    pub fn limit(&self) -> RawFd {
        RawFd::try_from(self.in_use.len()).unwrap_or(RawFd::MAX)
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.iter().filter(|used| **used).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter(fd_max: usize) -> FdArbiter {
        FdArbiter::new(&FsConfig::default().with_fd_max(fd_max))
    }

    #[test]
    fn allocation_skips_reserved_range() {
        let mut fds = arbiter(8);
        assert_eq!(fds.allocate().unwrap(), 3);
        assert_eq!(fds.allocate().unwrap(), 4);
        assert!(!fds.is_in_use(0));
        assert!(fds.is_in_use(3));
    }

    #[test]
    fn allocation_skips_observed_descriptors() {
        let mut fds = arbiter(8);
        fds.mark_in_use(3);
        fds.mark_in_use(5);
        assert_eq!(fds.allocate().unwrap(), 4);
        assert_eq!(fds.allocate().unwrap(), 6);
        fds.mark_free(3);
        assert_eq!(fds.allocate().unwrap(), 3);
    }

    #[test]
    fn out_of_range_is_in_use() {
        let mut fds = arbiter(8);
        assert!(fds.is_in_use(-1));
        assert!(fds.is_in_use(8));
        assert!(fds.is_in_use(1000));
        fds.mark_free(1000);
        assert!(fds.is_in_use(1000));
        fds.mark_in_use(-4);
        assert_eq!(fds.in_use_count(), 0);
    }

    #[test]
    #[tracing_test::traced_test]
    fn exhaustion_is_reported() {
        let mut fds = arbiter(5);
        assert_eq!(fds.allocate().unwrap(), 3);
        assert_eq!(fds.allocate().unwrap(), 4);
        assert!(matches!(fds.allocate(), Err(FsError::DescriptorsExhausted)));
        assert!(logs_contain("descriptor namespace exhausted"));

        fds.mark_free(4);
        assert_eq!(fds.allocate().unwrap(), 4);
    }

    #[test]
    fn oversized_fd_max_is_clamped() {
        let mut fds = FdArbiter::new(&FsConfig::default().with_fd_max(usize::MAX));
        assert_eq!(fds.limit(), MAX_TRACKED_FDS as RawFd);
        assert_eq!(fds.allocate().unwrap(), 3);
        fds.mark_in_use(RawFd::MAX);
        assert!(fds.is_in_use(RawFd::MAX));
        assert_eq!(fds.in_use_count(), 1);
        assert_eq!(arbiter(8).limit(), 8);
    }

    #[test]
    fn reserved_range_larger_than_table() {
        let mut fds = FdArbiter::new(&FsConfig {
            fd_max: 2,
            ..FsConfig::default()
        });
        assert!(matches!(fds.allocate(), Err(FsError::DescriptorsExhausted)));
    }
}
