//! POSIX-style dispatch between the builtin store and the host filesystem.
//!
//! Paths carrying the store prefix belong exclusively to the store: a miss
//! is reported as [`FsError::NotFound`] and is never retried against the
//! host. Descriptors are checked against the open builtin handles first and
//! fall through to the host otherwise. Descriptors the host hands out are
//! recorded in the arbiter so builtin files never reuse them. The host does
//! not know about builtin descriptors, so a real descriptor landing on a
//! live builtin integer is moved above the tracked range before it is
//! returned.

use std::io::SeekFrom;
use tracing::{debug, trace, warn};

use crate::config::FsConfig;
use crate::fd_bitmap::FdArbiter;
use crate::handle::{BuiltinHandle, HandleTable, StreamId};
use crate::host::{FileStat, HostFs};
use crate::store::StaticStore;
use crate::{FsError, RawFd, Result};

/// Stream returned by [`FsShim::fopen`].
#[derive(Debug)]
pub enum Stream<S> {
    Builtin(StreamId),
    Host(S),
}

impl<S> Stream<S> {
    pub fn is_builtin(&self) -> bool {
        matches!(self, Stream::Builtin(_))
    }
}

/// Runtime context of the file shim: the store, the open builtin files, the
/// descriptor arbiter and the host filesystem underneath.
///
/// All calls take `&mut self` or `&self`; the shim performs no locking and
/// is meant to be driven from one thread of control.
#[derive(Debug)]
pub struct FsShim<H: HostFs> {
    store: StaticStore,
    fds: FdArbiter,
    handles: HandleTable,
    host: H,
}

impl<H: HostFs> FsShim<H> {
    pub fn new(store: StaticStore, host: H) -> Self {
        Self::with_config(store, host, FsConfig::default())
    }

    pub fn with_config(store: StaticStore, host: H, config: FsConfig) -> Self {
        Self {
            store,
            fds: FdArbiter::new(&config),
            handles: HandleTable::new(config.max_open_files),
            host,
        }
    }

    pub fn store(&self) -> &StaticStore {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn fds(&self) -> &FdArbiter {
        &self.fds
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn is_builtin_fd(&self, fd: RawFd) -> bool {
        self.handles.contains(fd)
    }

    /// Takes ownership of a descriptor the host just opened. If a builtin
    /// handle holds the same integer, the real one is moved to `fd_max` or
    /// above, where builtin descriptors never go.
    fn claim_host_fd(&mut self, fd: RawFd) -> Result<RawFd> {
        if !self.handles.contains(fd) {
            self.fds.mark_in_use(fd);
            return Ok(fd);
        }
        match self.host.relocate(fd, self.fds.limit()) {
            Ok(moved) => {
                debug!(from = fd, to = moved, "moved host descriptor off a builtin one");
                self.fds.mark_in_use(moved);
                Ok(moved)
            }
            Err(err) => {
                warn!(fd, error = %err, "unable to move host descriptor off a builtin one");
                let _ = self.host.close(fd);
                Err(err.into())
            }
        }
    }

    fn open_builtin(&mut self, path: &str) -> Result<&BuiltinHandle> {
        let data = self.store.lookup(path).ok_or(FsError::NotFound)?.clone();
        self.handles.open(data, &mut self.fds)
    }

    pub fn open(&mut self, path: &str, flags: i32, mode: u32) -> Result<RawFd> {
        if self.store.has_prefix(path) {
            let result = self.open_builtin(path).map(|h| h.fd());
            trace!(path, builtin = true, ?result, "open");
            return result;
        }

        let fd = self.host.open(path, flags, mode)?;
        let fd = self.claim_host_fd(fd)?;
        trace!(path, fd, builtin = false, "open");
        Ok(fd)
    }

    pub fn close(&mut self, fd: RawFd) -> Result<()> {
        if self.handles.contains(fd) {
            trace!(fd, builtin = true, "close");
            return self.handles.close(fd, &mut self.fds);
        }

        trace!(fd, builtin = false, "close");
        self.fds.mark_free(fd);
        self.host.close(fd)?;
        Ok(())
    }

    /// Reads up to `buf.len()` bytes. A short count at the end of a builtin
    /// file is not an error.
    pub fn read(&mut self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        if self.handles.contains(fd) {
            return self.handles.read(fd, buf);
        }
        Ok(self.host.read(fd, buf)?)
    }

    /// Repositions `fd` and returns the new absolute offset.
    pub fn seek(&mut self, fd: RawFd, pos: SeekFrom) -> Result<u64> {
        if self.handles.contains(fd) {
            let result = self.handles.seek(fd, pos);
            trace!(fd, ?pos, ?result, "seek");
            return result;
        }
        Ok(self.host.seek(fd, pos)?)
    }

    /// [`FsShim::seek`] with C `lseek` arguments.
    pub fn lseek(&mut self, fd: RawFd, offset: i64, whence: i32) -> Result<u64> {
        let pos = match whence {
            libc::SEEK_SET => {
                SeekFrom::Start(u64::try_from(offset).map_err(|_| FsError::InvalidSeek)?)
            }
            libc::SEEK_CUR => SeekFrom::Current(offset),
            libc::SEEK_END => SeekFrom::End(offset),
            _ => return Err(FsError::InvalidInput),
        };
        self.seek(fd, pos)
    }

    pub fn stat(&self, path: &str) -> Result<FileStat> {
        if self.store.has_prefix(path) {
            let data = self.store.lookup(path).ok_or(FsError::NotFound)?;
            return Ok(FileStat::builtin(data.len() as u64));
        }
        Ok(self.host.stat(path)?)
    }

    pub fn fstat(&self, fd: RawFd) -> Result<FileStat> {
        if let Some(handle) = self.handles.get(fd) {
            return Ok(FileStat::builtin(handle.size()));
        }
        Ok(self.host.fstat(fd)?)
    }

    /// Builtin paths are accessible iff the store holds them, whatever
    /// `amode` asks for.
    pub fn access(&self, path: &str, amode: i32) -> Result<()> {
        if self.store.has_prefix(path) {
            if self.store.contains(path) {
                return Ok(());
            }
            return Err(FsError::NotFound);
        }
        Ok(self.host.access(path, amode)?)
    }

    /// Opens a stream. Builtin streams are always read-only; `mode` only
    /// matters for host paths.
    pub fn fopen(&mut self, path: &str, mode: &str) -> Result<Stream<H::Stream>> {
        if self.store.has_prefix(path) {
            let stream = self.open_builtin(path)?.stream();
            trace!(path, mode, builtin = true, "fopen");
            return Ok(Stream::Builtin(stream));
        }

        let mut stream = self.host.fopen(path, mode)?;
        if let Ok(fd) = self.host.fileno(&stream) {
            if self.handles.contains(fd) {
                stream = self.host.relocate_stream(stream, self.fds.limit())?;
                debug!(from = fd, "moved host stream off a builtin descriptor");
            }
        }
        if let Ok(fd) = self.host.fileno(&stream) {
            self.fds.mark_in_use(fd);
        }
        trace!(path, mode, builtin = false, "fopen");
        Ok(Stream::Host(stream))
    }

    pub fn fileno(&mut self, stream: &Stream<H::Stream>) -> Result<RawFd> {
        match stream {
            Stream::Builtin(id) => self
                .handles
                .by_stream(*id)
                .map(BuiltinHandle::fd)
                .ok_or(FsError::BadDescriptor),
            Stream::Host(stream) => {
                let fd = self.host.fileno(stream)?;
                // only streams opened elsewhere can sit on a builtin integer
                if self.handles.contains(fd) {
                    warn!(fd, "host stream shares a builtin descriptor");
                    return Err(FsError::InvalidInput);
                }
                self.fds.mark_in_use(fd);
                Ok(fd)
            }
        }
    }

    pub fn fclose(&mut self, stream: Stream<H::Stream>) -> Result<()> {
        match stream {
            Stream::Builtin(id) => {
                let fd = self
                    .handles
                    .by_stream(id)
                    .map(BuiltinHandle::fd)
                    .ok_or(FsError::BadDescriptor)?;
                self.handles.close(fd, &mut self.fds)
            }
            Stream::Host(stream) => {
                if let Ok(fd) = self.host.fileno(&stream) {
                    self.fds.mark_free(fd);
                }
                self.host.fclose(stream)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHostFs;
    use pretty_assertions::assert_eq;

    fn shim() -> FsShim<NullHostFs> {
        let store = StaticStore::builder("builtin:")
            .file("hello.txt", &b"hello, world"[..])
            .file("lib/x.pm", &b"1;"[..])
            .build();
        FsShim::new(store, NullHostFs)
    }

    #[test]
    fn open_read_seek_close() {
        let mut shim = shim();
        let fd = shim.open("builtin:/hello.txt", libc::O_RDONLY, 0).unwrap();
        assert_eq!(fd, 3);
        assert!(shim.is_builtin_fd(fd));

        let mut buf = [0u8; 5];
        assert_eq!(shim.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        assert_eq!(shim.lseek(fd, 7, libc::SEEK_SET).unwrap(), 7);
        let mut rest = [0u8; 16];
        let n = shim.read(fd, &mut rest).unwrap();
        assert_eq!(&rest[..n], b"world");

        assert_eq!(shim.fstat(fd).unwrap().size, 12);
        shim.close(fd).unwrap();
        assert!(!shim.fds().is_in_use(fd));
    }

    #[test]
    fn prefixed_misses_do_not_fall_through() {
        let mut shim = shim();
        let err = shim.open("builtin:/missing", libc::O_RDONLY, 0).unwrap_err();
        assert_eq!(err.errno(), libc::ENOENT);
        assert!(matches!(shim.stat("builtin:/missing"), Err(FsError::NotFound)));
        assert!(matches!(
            shim.access("builtin:/missing", libc::F_OK),
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            shim.fopen("builtin:/missing", "r"),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn unprefixed_paths_reach_the_host() {
        let mut shim = shim();
        // NullHostFs has no files, so the host's own errno comes back
        let err = shim.open("/etc/hostname", libc::O_RDONLY, 0).unwrap_err();
        assert!(matches!(err, FsError::Host(_)));
        assert_eq!(err.errno(), libc::ENOENT);
        let err = shim.read(17, &mut [0u8; 4]).unwrap_err();
        assert_eq!(err.errno(), libc::EBADF);
    }

    #[test]
    fn stat_and_access_builtin() {
        let shim = shim();
        let st = shim.stat("builtin://lib//x.pm").unwrap();
        assert!(st.is_file());
        assert_eq!(st.size, 2);
        shim.access("builtin:/lib/x.pm", libc::W_OK).unwrap();
    }

    #[test]
    fn bad_whence_and_negative_start() {
        let mut shim = shim();
        let fd = shim.open("builtin:/hello.txt", 0, 0).unwrap();
        assert!(matches!(shim.lseek(fd, 0, 42), Err(FsError::InvalidInput)));
        assert!(matches!(
            shim.lseek(fd, -1, libc::SEEK_SET),
            Err(FsError::InvalidSeek)
        ));
        assert_eq!(shim.lseek(fd, -2, libc::SEEK_END).unwrap(), 10);
    }

    #[test]
    fn streams_map_to_descriptors() {
        let mut shim = shim();
        let stream = shim.fopen("builtin:/lib/x.pm", "r").unwrap();
        assert!(stream.is_builtin());
        let fd = shim.fileno(&stream).unwrap();
        assert!(shim.is_builtin_fd(fd));

        let mut buf = [0u8; 4];
        assert_eq!(shim.read(fd, &mut buf).unwrap(), 2);

        let Stream::Builtin(id) = stream else {
            unreachable!()
        };
        shim.fclose(Stream::Builtin(id)).unwrap();
        assert!(matches!(
            shim.fileno(&Stream::Builtin(id)),
            Err(FsError::BadDescriptor)
        ));
        assert!(matches!(
            shim.fclose(Stream::Builtin(id)),
            Err(FsError::BadDescriptor)
        ));
    }

    /// Host that knows nothing of builtin descriptors and always hands out 3.
    #[derive(Default)]
    struct CollidingHost {
        relocated: std::cell::RefCell<Vec<(RawFd, RawFd)>>,
        closed: std::cell::RefCell<Vec<RawFd>>,
        refuse_relocation: bool,
    }

    impl HostFs for CollidingHost {
        type Stream = RawFd;

        fn open(&self, _path: &str, _flags: i32, _mode: u32) -> std::io::Result<RawFd> {
            Ok(3)
        }
        fn close(&self, fd: RawFd) -> std::io::Result<()> {
            self.closed.borrow_mut().push(fd);
            Ok(())
        }
        fn read(&self, _fd: RawFd, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
        fn seek(&self, _fd: RawFd, _pos: SeekFrom) -> std::io::Result<u64> {
            Ok(0)
        }
        fn stat(&self, _path: &str) -> std::io::Result<FileStat> {
            Ok(FileStat::builtin(0))
        }
        fn fstat(&self, _fd: RawFd) -> std::io::Result<FileStat> {
            Ok(FileStat::builtin(0))
        }
        fn access(&self, _path: &str, _amode: i32) -> std::io::Result<()> {
            Ok(())
        }
        fn fopen(&self, _path: &str, _mode: &str) -> std::io::Result<RawFd> {
            Ok(3)
        }
        fn fileno(&self, stream: &RawFd) -> std::io::Result<RawFd> {
            Ok(*stream)
        }
        fn fclose(&self, _stream: RawFd) -> std::io::Result<()> {
            Ok(())
        }
        fn relocate(&self, fd: RawFd, min: RawFd) -> std::io::Result<RawFd> {
            if self.refuse_relocation {
                return Err(std::io::Error::from_raw_os_error(libc::EMFILE));
            }
            self.relocated.borrow_mut().push((fd, min));
            Ok(min)
        }
        fn relocate_stream(&self, stream: RawFd, min: RawFd) -> std::io::Result<RawFd> {
            self.relocate(stream, min)
        }
    }

    fn colliding_shim(host: CollidingHost) -> FsShim<CollidingHost> {
        let store = StaticStore::builder("builtin:")
            .file("hello.txt", &b"hello, world"[..])
            .build();
        FsShim::with_config(store, host, FsConfig::default().with_fd_max(8))
    }

    #[test]
    fn host_descriptor_is_moved_off_a_builtin_one() {
        let mut shim = colliding_shim(CollidingHost::default());
        let builtin = shim.open("builtin:/hello.txt", 0, 0).unwrap();
        assert_eq!(builtin, 3);

        let real = shim.open("/tmp/anything", libc::O_RDONLY, 0).unwrap();
        assert_eq!(real, 8);
        assert_eq!(*shim.host().relocated.borrow(), vec![(3, 8)]);
        assert!(shim.is_builtin_fd(builtin));
        assert!(!shim.is_builtin_fd(real));

        let stream = shim.fopen("/tmp/other", "r").unwrap();
        assert_eq!(shim.fileno(&stream).unwrap(), 8);

        // the builtin file still reads its own bytes
        let mut buf = [0u8; 5];
        assert_eq!(shim.read(builtin, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn without_a_collision_the_host_descriptor_is_kept() {
        let mut shim = colliding_shim(CollidingHost::default());
        assert_eq!(shim.open("/tmp/anything", 0, 0).unwrap(), 3);
        assert!(shim.host().relocated.borrow().is_empty());
        assert!(shim.fds().is_in_use(3));
        // the builtin file goes elsewhere
        assert_eq!(shim.open("builtin:/hello.txt", 0, 0).unwrap(), 4);
    }

    #[test]
    fn failed_move_closes_the_host_descriptor() {
        let mut shim = colliding_shim(CollidingHost {
            refuse_relocation: true,
            ..Default::default()
        });
        shim.open("builtin:/hello.txt", 0, 0).unwrap();
        let err = shim.open("/tmp/anything", 0, 0).unwrap_err();
        assert_eq!(err.errno(), libc::EMFILE);
        assert_eq!(*shim.host().closed.borrow(), vec![3]);
        assert!(shim.is_builtin_fd(3));
    }

    #[test]
    fn foreign_stream_on_a_builtin_descriptor_is_rejected() {
        let mut shim = colliding_shim(CollidingHost::default());
        shim.open("builtin:/hello.txt", 0, 0).unwrap();
        assert!(matches!(
            shim.fileno(&Stream::Host(3)),
            Err(FsError::InvalidInput)
        ));
    }

    #[test]
    fn closing_an_unknown_descriptor_fails() {
        let mut shim = shim();
        let fd = shim.open("builtin:/hello.txt", 0, 0).unwrap();
        shim.close(fd).unwrap();
        // Not builtin anymore, so the host sees it and rejects it
        assert_eq!(shim.close(fd).unwrap_err().errno(), libc::EBADF);
    }
}
