use bytes::Bytes;
use std::io::{self, SeekFrom};

use crate::{FsError, Result};

/// Position-tracking, read-only view over the bytes of one builtin entry.
///
/// Cloning the underlying [`Bytes`] is cheap, so every open handle gets its
/// own view with an independent cursor.
#[derive(Debug, Clone)]
pub struct BuiltinFile {
    data: Bytes,
    cursor: u64,
}

impl BuiltinFile {
    pub fn new(data: Bytes) -> Self {
        Self { data, cursor: 0 }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Copies up to `buf.len()` bytes from the cursor. Returns 0 at end of
    /// data.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        let start = usize::try_from(self.cursor)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        let remaining = &self.data[start..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n as u64;
        n
    }

    /// Moves the cursor. The target must lie within `[0, size]`.
    pub fn seek_to(&mut self, pos: SeekFrom) -> Result<u64> {
        let (from, delta) = match pos {
            SeekFrom::Start(offset) => return self.set_cursor(offset),
            SeekFrom::Current(delta) => (self.cursor, delta),
            SeekFrom::End(delta) => (self.size(), delta),
        };
        let target = if delta >= 0 {
            from.checked_add(delta as u64)
        } else {
            from.checked_sub(delta.unsigned_abs())
        }
        .ok_or(FsError::InvalidSeek)?;
        self.set_cursor(target)
    }

    fn set_cursor(&mut self, target: u64) -> Result<u64> {
        if target > self.size() {
            return Err(FsError::InvalidSeek);
        }
        self.cursor = target;
        Ok(target)
    }
}

impl io::Read for BuiltinFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf))
    }
}

impl io::Seek for BuiltinFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_to(pos)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn file() -> BuiltinFile {
        BuiltinFile::new(Bytes::from_static(b"0123456789"))
    }

    #[test]
    fn short_reads_at_end() {
        let mut f = file();
        let mut buf = [0u8; 4];
        assert_eq!(f.read_bytes(&mut buf), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(f.read_bytes(&mut buf), 4);
        assert_eq!(f.read_bytes(&mut buf), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(f.read_bytes(&mut buf), 0);
    }

    #[test]
    fn seek_whence_variants() {
        let mut f = file();
        assert_eq!(f.seek_to(SeekFrom::Start(3)).unwrap(), 3);
        assert_eq!(f.seek_to(SeekFrom::Current(2)).unwrap(), 5);
        assert_eq!(f.seek_to(SeekFrom::Current(-5)).unwrap(), 0);
        assert_eq!(f.seek_to(SeekFrom::End(-1)).unwrap(), 9);
        assert_eq!(f.seek_to(SeekFrom::End(0)).unwrap(), 10);
    }

    #[test]
    fn seek_outside_data_fails_and_keeps_position() {
        let mut f = file();
        f.seek_to(SeekFrom::Start(4)).unwrap();
        assert!(matches!(f.seek_to(SeekFrom::Start(11)), Err(FsError::InvalidSeek)));
        assert!(matches!(f.seek_to(SeekFrom::Current(-5)), Err(FsError::InvalidSeek)));
        assert!(matches!(f.seek_to(SeekFrom::End(1)), Err(FsError::InvalidSeek)));
        assert!(matches!(
            f.seek_to(SeekFrom::Current(i64::MIN)),
            Err(FsError::InvalidSeek)
        ));
        assert_eq!(f.position(), 4);
    }

    #[test]
    fn io_traits() {
        let mut f = file();
        io::Seek::seek(&mut f, SeekFrom::Start(7)).unwrap();
        let mut rest = Vec::new();
        f.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"789");
    }
}
