//! The block device interface consumed by the aligned I/O layer.
//!
//! A device exposes a native I/O unit (`io_size`); reads and writes must be
//! exactly one unit long, at a cursor aligned to that unit. Nothing above
//! [`crate::aligned_io`] is allowed to call these methods directly.

use libc::{c_long, ioctl};
use std::fs::File;
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;

/// A block device handle: seek/read/write plus the two geometry ioctls.
pub trait BlockDevice {
    /// Moves the device's cursor to `offset`, shared by `read_unit`/`write_unit`.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Reads exactly `buf.len()` bytes, which must equal `io_size()`.
    fn read_unit(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Writes exactly `buf.len()` bytes, which must equal `io_size()`.
    fn write_unit(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Total byte capacity of the device.
    fn device_size(&self) -> io::Result<u64>;

    /// The device's native (minimum) I/O transfer size, in bytes.
    fn io_size(&self) -> io::Result<u64>;
}

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

/// ioctl command: total device size in bytes, for a real block device.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);
/// ioctl command: logical sector size, i.e. the device's native I/O unit.
const BLKSSZGET: c_long = ior!(0x12, 104, i32);

/// Default native I/O unit assumed for a plain regular-file disk image.
const DEFAULT_IMAGE_IO_SZ: u64 = 512;

/// A device backed by a real file: a block device or a flat disk image.
pub struct FileDevice {
    file: File,
}

impl FileDevice {
    /// Opens `path` read-write for use as the filesystem's backing device.
    pub fn open(path: &std::path::Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self { file })
    }

    fn is_block_device(&self) -> io::Result<bool> {
        Ok(self.file.metadata()?.file_type().is_block_device())
    }
}

impl BlockDevice for FileDevice {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read_unit(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    fn write_unit(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn device_size(&self) -> io::Result<u64> {
        if self.is_block_device()? {
            let mut size: u64 = 0;
            let ret = unsafe { ioctl(self.file.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(size)
        } else {
            Ok(self.file.metadata()?.len())
        }
    }

    fn io_size(&self) -> io::Result<u64> {
        if self.is_block_device()? {
            let mut size: i32 = 0;
            let ret = unsafe { ioctl(self.file.as_raw_fd(), BLKSSZGET as _, &mut size) };
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(size as u64)
        } else {
            Ok(DEFAULT_IMAGE_IO_SZ)
        }
    }
}

/// An in-memory device: no real file, no ioctls. Used by this crate's own
/// tests and available to callers that want to exercise the filesystem
/// without a real backing device.
pub struct MemDevice {
    data: Vec<u8>,
    cursor: u64,
    io_sz: u64,
}

impl MemDevice {
    /// Creates a zero-filled device of `size` bytes with native unit `io_sz`.
    pub fn new(size: u64, io_sz: u64) -> Self {
        Self {
            data: vec![0; size as usize],
            cursor: 0,
            io_sz,
        }
    }
}

impl BlockDevice for MemDevice {
    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.cursor = offset;
        Ok(())
    }

    fn read_unit(&mut self, buf: &mut [u8]) -> io::Result<()> {
        assert_eq!(buf.len() as u64, self.io_sz, "short read from MemDevice");
        let start = self.cursor as usize;
        let end = start + buf.len();
        buf.copy_from_slice(&self.data[start..end]);
        self.cursor += buf.len() as u64;
        Ok(())
    }

    fn write_unit(&mut self, buf: &[u8]) -> io::Result<()> {
        assert_eq!(buf.len() as u64, self.io_sz, "short write to MemDevice");
        let start = self.cursor as usize;
        let end = start + buf.len();
        self.data[start..end].copy_from_slice(buf);
        self.cursor += buf.len() as u64;
        Ok(())
    }

    fn device_size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn io_size(&self) -> io::Result<u64> {
        Ok(self.io_sz)
    }
}
