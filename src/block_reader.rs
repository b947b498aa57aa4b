//! Random-access byte source over the image file.
//!
//! Reads are buffered so that a read of up to [`BLOCK_SIZE`](crate::BLOCK_SIZE)
//! bytes that falls inside the previously buffered window does not re-issue
//! host I/O. The buffer window is aligned to [`WINDOW_SIZE`].

use crate::error::Result;
use std::ffi::c_long;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;

/// Size of the buffered read window; large enough to cover a whole block
/// plus some slack so back-to-back sequential block reads mostly hit it.
const WINDOW_SIZE: u64 = 8192;

macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
    };
}

/// ioctl command: get the size of a block device, in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// Buffered, random-access reader over the image.
pub struct BlockReader {
    file: File,
    /// Byte offset of `buf[0]` within the file, if a window is buffered.
    window_start: Option<u64>,
    buf: Vec<u8>,
}

impl BlockReader {
    /// Opens the image at `path` for reading.
    pub fn new(file: File) -> Self {
        Self {
            file,
            window_start: None,
            buf: Vec::new(),
        }
    }

    /// Reads exactly `len` bytes at byte offset `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if let Some(start) = self.window_start {
            let end = start + self.buf.len() as u64;
            if offset >= start && offset + len as u64 <= end {
                let rel = (offset - start) as usize;
                return Ok(self.buf[rel..rel + len].to_vec());
            }
        }

        // Miss: refill a window aligned to `WINDOW_SIZE` covering the read,
        // sized to also cover `len` should it exceed one window.
        let win_start = (offset / WINDOW_SIZE) * WINDOW_SIZE;
        let win_len = ((offset + len as u64 - win_start).max(WINDOW_SIZE)) as usize;

        self.file.seek(SeekFrom::Start(win_start))?;
        let mut buf = vec![0u8; win_len];
        read_exact_or_eof(&mut self.file, &mut buf)?;

        let rel = (offset - win_start) as usize;
        if rel + len > buf.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into());
        }
        let out = buf[rel..rel + len].to_vec();

        self.window_start = Some(win_start);
        self.buf = buf;

        Ok(out)
    }

    /// Returns the total length of the image in bytes: `stat` for a regular
    /// file, `BLKGETSIZE64` for a block (or char) device, since a device's
    /// metadata length is not reliable (§6).
    pub fn len(&self) -> Result<u64> {
        let metadata = self.file.metadata()?;
        let file_type = metadata.file_type();
        if file_type.is_block_device() || file_type.is_char_device() {
            let mut size: u64 = 0;
            let ret =
                unsafe { libc::ioctl(self.file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
            if ret < 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(size)
        } else {
            Ok(metadata.len())
        }
    }
}

/// Reads as many bytes as available into `buf`, leaving the unread tail
/// zeroed. Used so a short final window near EOF doesn't hard-fail; callers
/// validate actual image length separately against the superblock.
fn read_exact_or_eof(f: &mut File, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match f.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn make_file(data: &[u8]) -> File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(data).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f
    }

    #[test]
    fn read_within_window() {
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 256) as u8).collect();
        let mut r = BlockReader::new(make_file(&data));
        let a = r.read_at(10, 100).unwrap();
        assert_eq!(a, data[10..110]);
        // Second read stays within the buffered window, no re-issued I/O
        // (can't observe directly here, but the result must still be correct).
        let b = r.read_at(200, 50).unwrap();
        assert_eq!(b, data[200..250]);
    }

    #[test]
    fn read_across_window_boundary() {
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 256) as u8).collect();
        let mut r = BlockReader::new(make_file(&data));
        let a = r.read_at(8190, 20).unwrap();
        assert_eq!(a, data[8190..8210]);
    }

    #[test]
    fn len_matches_file_size() {
        let data = vec![0u8; 4096];
        let mut r = BlockReader::new(make_file(&data));
        assert_eq!(r.len().unwrap(), 4096);
    }
}
