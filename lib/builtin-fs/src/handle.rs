//! Table of open builtin files.

use bytes::Bytes;
use slot_table::SlotTable;
use std::io::SeekFrom;
use tracing::debug;

use crate::fd_bitmap::FdArbiter;
use crate::file::BuiltinFile;
use crate::{FsError, RawFd, Result};

/// Identity of the stream object behind an open builtin file, the
/// counterpart of a `FILE *` for [`fileno`](crate::FsShim::fileno).
///
/// Ids are never reused within one table, so a stale id cannot match a newer
/// handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

#[derive(Debug)]
pub struct BuiltinHandle {
    fd: RawFd,
    stream: StreamId,
    file: BuiltinFile,
}

impl BuiltinHandle {
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn position(&self) -> u64 {
        self.file.position()
    }
}

#[derive(Debug)]
pub struct HandleTable {
    slots: SlotTable<BuiltinHandle>,
    next_stream: u64,
}

impl HandleTable {
    pub fn new(max_open_files: usize) -> Self {
        Self {
            slots: SlotTable::with_capacity(max_open_files),
            next_stream: 1,
        }
    }

    /// Opens a new view over `data`, taking a descriptor from `fds`.
    ///
    /// The table is checked for room before a descriptor is allocated, so a
    /// full table never leaks an integer.
    pub fn open(&mut self, data: Bytes, fds: &mut FdArbiter) -> Result<&BuiltinHandle> {
        if self.slots.is_full() {
            return Err(FsError::TooManyOpenFiles);
        }
        let fd = fds.allocate()?;
        let stream = StreamId(self.next_stream);
        self.next_stream += 1;

        let handle = BuiltinHandle {
            fd,
            stream,
            file: BuiltinFile::new(data),
        };
        let key = match self.slots.insert(handle) {
            Ok(key) => key,
            Err(_) => {
                fds.mark_free(fd);
                return Err(FsError::TooManyOpenFiles);
            }
        };
        debug!(fd, stream = stream.0, "opened builtin file");
        self.slots.get(key).ok_or(FsError::BadDescriptor)
    }

    /// Releases the handle for `fd` and gives the integer back to `fds`.
    pub fn close(&mut self, fd: RawFd, fds: &mut FdArbiter) -> Result<()> {
        let handle = self
            .slots
            .remove_where(|h| h.fd == fd)
            .ok_or(FsError::BadDescriptor)?;
        fds.mark_free(handle.fd);
        debug!(fd, stream = handle.stream.0, "closed builtin file");
        Ok(())
    }

    pub fn get(&self, fd: RawFd) -> Option<&BuiltinHandle> {
        self.slots.find(|h| h.fd == fd)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.get(fd).is_some()
    }

    pub fn by_stream(&self, stream: StreamId) -> Option<&BuiltinHandle> {
        self.slots.find(|h| h.stream == stream)
    }

    pub fn read(&mut self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        let handle = self
            .slots
            .find_mut(|h| h.fd == fd)
            .ok_or(FsError::BadDescriptor)?;
        Ok(handle.file.read_bytes(buf))
    }

    pub fn seek(&mut self, fd: RawFd, pos: SeekFrom) -> Result<u64> {
        let handle = self
            .slots
            .find_mut(|h| h.fd == fd)
            .ok_or(FsError::BadDescriptor)?;
        handle.file.seek_to(pos)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
