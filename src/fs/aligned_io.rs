//! Read-modify-write alignment layer over a [`BlockDevice`](crate::device::BlockDevice).
//!
//! The device only accepts exactly-`io_size()`-byte transfers at
//! `io_size()`-aligned offsets. This layer lets the rest of the filesystem
//! issue arbitrarily sized and aligned reads/writes, preserving unrelated
//! bytes in the bracketing native blocks on every partial write.

use crate::device::BlockDevice;
use std::io;

/// Wraps a [`BlockDevice`] and exposes aligned, arbitrarily-sized I/O.
pub struct AlignedDevice<D> {
    device: D,
    io_sz: u64,
}

impl<D: BlockDevice> AlignedDevice<D> {
    /// Wraps `device`, querying its native I/O unit once.
    pub fn new(device: D) -> io::Result<Self> {
        let io_sz = device.io_size()?;
        Ok(Self { device, io_sz })
    }

    /// The device's native I/O unit, in bytes.
    pub fn io_size(&self) -> u64 {
        self.io_sz
    }

    /// The device's total byte capacity.
    pub fn device_size(&self) -> io::Result<u64> {
        self.device.device_size()
    }

    /// Releases the wrapped device.
    pub fn into_inner(self) -> D {
        self.device
    }

    /// Reads `size` bytes starting at `offset`, round-tripping through an
    /// aligned scratch window as large as the native unit requires.
    pub fn read_at(&mut self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let (aligned_offset, bias, aligned_size) = self.align(offset, size);
        let mut window = vec![0u8; aligned_size as usize];
        self.read_aligned_window(aligned_offset, &mut window)?;
        Ok(window[bias as usize..bias as usize + size].to_vec())
    }

    /// Writes `bytes` starting at `offset`, preserving the untouched part of
    /// the bracketing native blocks by reading the full aligned window first.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let (aligned_offset, bias, aligned_size) = self.align(offset, bytes.len());
        let mut window = vec![0u8; aligned_size as usize];
        self.read_aligned_window(aligned_offset, &mut window)?;
        window[bias as usize..bias as usize + bytes.len()].copy_from_slice(bytes);
        self.write_aligned_window(aligned_offset, &window)
    }

    /// Computes `(aligned_offset, bias, aligned_size)` for a `size`-byte
    /// transfer at `offset`, per the driver's native I/O unit.
    fn align(&self, offset: u64, size: usize) -> (u64, u64, u64) {
        let io_sz = self.io_sz;
        let aligned_offset = (offset / io_sz) * io_sz;
        let bias = offset - aligned_offset;
        let aligned_size = (bias + size as u64).div_ceil(io_sz) * io_sz;
        (aligned_offset, bias, aligned_size)
    }

    fn read_aligned_window(&mut self, offset: u64, window: &mut [u8]) -> io::Result<()> {
        self.device.seek(offset)?;
        for chunk in window.chunks_mut(self.io_sz as usize) {
            self.device.read_unit(chunk)?;
        }
        Ok(())
    }

    fn write_aligned_window(&mut self, offset: u64, window: &[u8]) -> io::Result<()> {
        self.device.seek(offset)?;
        for chunk in window.chunks(self.io_sz as usize) {
            self.device.write_unit(chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::MemDevice;

    fn dev() -> AlignedDevice<MemDevice> {
        AlignedDevice::new(MemDevice::new(4096, 512)).unwrap()
    }

    #[test]
    fn identity_aligned() {
        let mut d = dev();
        d.write_at(512, b"hello").unwrap();
        assert_eq!(d.read_at(512, 5).unwrap(), b"hello");
    }

    #[test]
    fn identity_unaligned() {
        let mut d = dev();
        d.write_at(3, b"hello world, this crosses a boundary")
            .unwrap();
        assert_eq!(
            d.read_at(3, 37).unwrap(),
            b"hello world, this crosses a boundary"
        );
    }

    #[test]
    fn preserves_bracketing_bytes() {
        let mut d = dev();
        d.write_at(0, b"ABCDEFGH").unwrap();
        d.write_at(3, b"hello").unwrap();
        assert_eq!(&d.read_at(0, 8).unwrap(), b"ABChelloH"[..8].as_ref());
    }
}
