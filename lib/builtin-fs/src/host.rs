//! The real filesystem underneath the shim.
//!
//! [`HostFs`] is the seam the dispatch layer falls through to for anything
//! outside the builtin namespace. [`LibcHostFs`] forwards to the C library;
//! [`NullHostFs`] is a host without any filesystem at all.

use std::io::{self, SeekFrom};

use crate::RawFd;

/// `stat` record returned by both builtin and host lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileStat {
    /// The record reported for builtin entries: a regular file of `size`
    /// bytes, everything else zeroed.
    pub fn builtin(size: u64) -> Self {
        Self {
            mode: libc::S_IFREG as u32,
            size,
            ..Self::default()
        }
    }

    pub fn is_file(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFREG as u32
    }

    pub fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }
}

/// Real counterparts of the intercepted calls.
///
/// Errors carry the OS errno so the shim can report it unchanged.
pub trait HostFs {
    /// Stream object returned by [`HostFs::fopen`].
    type Stream;

    fn open(&self, path: &str, flags: i32, mode: u32) -> io::Result<RawFd>;
    fn close(&self, fd: RawFd) -> io::Result<()>;
    fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize>;
    fn seek(&self, fd: RawFd, pos: SeekFrom) -> io::Result<u64>;
    fn stat(&self, path: &str) -> io::Result<FileStat>;
    fn fstat(&self, fd: RawFd) -> io::Result<FileStat>;
    fn access(&self, path: &str, amode: i32) -> io::Result<()>;
    fn fopen(&self, path: &str, mode: &str) -> io::Result<Self::Stream>;
    fn fileno(&self, stream: &Self::Stream) -> io::Result<RawFd>;
    fn fclose(&self, stream: Self::Stream) -> io::Result<()>;

    /// Moves descriptor `fd` to the lowest free integer `>= min` and closes
    /// the original. On failure `fd` is left open.
    fn relocate(&self, fd: RawFd, min: RawFd) -> io::Result<RawFd>;

    /// [`HostFs::relocate`] for the descriptor behind a stream. On failure
    /// the stream is closed.
    fn relocate_stream(&self, stream: Self::Stream, min: RawFd) -> io::Result<Self::Stream>;
}

/// A host with no filesystem. Every path is missing and every descriptor
/// is invalid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHostFs;

#[derive(Debug)]
pub enum NoStream {}

impl HostFs for NullHostFs {
    type Stream = NoStream;

    fn open(&self, _path: &str, _flags: i32, _mode: u32) -> io::Result<RawFd> {
        Err(io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn close(&self, _fd: RawFd) -> io::Result<()> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn read(&self, _fd: RawFd, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn seek(&self, _fd: RawFd, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn stat(&self, _path: &str) -> io::Result<FileStat> {
        Err(io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn fstat(&self, _fd: RawFd) -> io::Result<FileStat> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn access(&self, _path: &str, _amode: i32) -> io::Result<()> {
        Err(io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn fopen(&self, _path: &str, _mode: &str) -> io::Result<NoStream> {
        Err(io::Error::from_raw_os_error(libc::ENOENT))
    }

    fn fileno(&self, stream: &NoStream) -> io::Result<RawFd> {
        match *stream {}
    }

    fn fclose(&self, stream: NoStream) -> io::Result<()> {
        match stream {}
    }

    fn relocate(&self, _fd: RawFd, _min: RawFd) -> io::Result<RawFd> {
        Err(io::Error::from_raw_os_error(libc::EBADF))
    }

    fn relocate_stream(&self, stream: NoStream, _min: RawFd) -> io::Result<NoStream> {
        match stream {}
    }
}

#[cfg(all(unix, feature = "host-fs"))]
pub use self::libc_host::LibcHostFs;

#[cfg(all(unix, feature = "host-fs"))]
mod libc_host {
    use std::ffi::CString;
    use std::fs::{File, OpenOptions};
    use std::io::{self, SeekFrom};
    use std::os::fd::{AsRawFd, FromRawFd};

    use super::{FileStat, HostFs};
    use crate::RawFd;

    /// Forwards every call to the C library of the running process.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct LibcHostFs;

    fn c_path(path: &str) -> io::Result<CString> {
        CString::new(path).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
    }

    fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    impl From<libc::stat> for FileStat {
        fn from(st: libc::stat) -> Self {
            Self {
                dev: st.st_dev as u64,
                ino: st.st_ino as u64,
                mode: st.st_mode as u32,
                nlink: st.st_nlink as u64,
                uid: st.st_uid,
                gid: st.st_gid,
                size: st.st_size as u64,
                atime: st.st_atime as i64,
                mtime: st.st_mtime as i64,
                ctime: st.st_ctime as i64,
            }
        }
    }

    /// Duplicates `fd` onto the lowest free integer `>= min`, keeping its
    /// close-on-exec flag.
    fn dup_at_least(fd: RawFd, min: RawFd) -> io::Result<RawFd> {
        let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
        let cmd = if flags & libc::FD_CLOEXEC != 0 {
            libc::F_DUPFD_CLOEXEC
        } else {
            libc::F_DUPFD
        };
        cvt(unsafe { libc::fcntl(fd, cmd, min) })
    }

    /// Translates an `fopen` mode string (`r`, `w+`, `ab`, ...).
    fn fopen_options(mode: &str) -> io::Result<OpenOptions> {
        let plus = mode.contains('+');
        let mut opts = OpenOptions::new();
        match mode.chars().next() {
            Some('r') => {
                opts.read(true).write(plus);
            }
            Some('w') => {
                opts.write(true).create(true).truncate(true).read(plus);
            }
            Some('a') => {
                opts.append(true).create(true).read(plus);
            }
            _ => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
        Ok(opts)
    }

    impl HostFs for LibcHostFs {
        type Stream = File;

        fn open(&self, path: &str, flags: i32, mode: u32) -> io::Result<RawFd> {
            let path = c_path(path)?;
            cvt(unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) })
        }

        fn close(&self, fd: RawFd) -> io::Result<()> {
            cvt(unsafe { libc::close(fd) }).map(drop)
        }

        fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
            let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as usize)
            }
        }

        fn seek(&self, fd: RawFd, pos: SeekFrom) -> io::Result<u64> {
            let (offset, whence) = match pos {
                SeekFrom::Start(off) => (off as libc::off_t, libc::SEEK_SET),
                SeekFrom::Current(off) => (off as libc::off_t, libc::SEEK_CUR),
                SeekFrom::End(off) => (off as libc::off_t, libc::SEEK_END),
            };
            let ret = unsafe { libc::lseek(fd, offset, whence) };
            if ret < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(ret as u64)
            }
        }

        fn stat(&self, path: &str) -> io::Result<FileStat> {
            let path = c_path(path)?;
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            cvt(unsafe { libc::stat(path.as_ptr(), &mut st) })?;
            Ok(st.into())
        }

        fn fstat(&self, fd: RawFd) -> io::Result<FileStat> {
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            cvt(unsafe { libc::fstat(fd, &mut st) })?;
            Ok(st.into())
        }

        fn access(&self, path: &str, amode: i32) -> io::Result<()> {
            let path = c_path(path)?;
            cvt(unsafe { libc::access(path.as_ptr(), amode) }).map(drop)
        }

        fn fopen(&self, path: &str, mode: &str) -> io::Result<File> {
            fopen_options(mode)?.open(path)
        }

        fn fileno(&self, stream: &File) -> io::Result<RawFd> {
            Ok(stream.as_raw_fd())
        }

        fn fclose(&self, stream: File) -> io::Result<()> {
            drop(stream);
            Ok(())
        }

        fn relocate(&self, fd: RawFd, min: RawFd) -> io::Result<RawFd> {
            let moved = dup_at_least(fd, min)?;
            if let Err(err) = self.close(fd) {
                unsafe { libc::close(moved) };
                return Err(err);
            }
            Ok(moved)
        }

        fn relocate_stream(&self, stream: File, min: RawFd) -> io::Result<File> {
            let moved = dup_at_least(stream.as_raw_fd(), min)?;
            drop(stream);
            // `moved` is a fresh descriptor owned by nothing else
            Ok(unsafe { File::from_raw_fd(moved) })
        }
    }

}
