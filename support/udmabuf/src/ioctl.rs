// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Abstraction of a `/dev/udmabufN` device.

use crate::protocol::SyncDescriptor;
use crate::protocol::UDMABUF_IOCTL_SET_SYNC;
use crate::protocol::UDMABUF_IOCTL_TYPE;
use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::path::Path;
use thiserror::Error;

/// Device node of the first u-dma-buf instance.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/udmabuf0";

#[expect(missing_docs)] // self-explanatory fields
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open DMA buffer device")]
    OpenDevice(#[source] std::io::Error),
    #[error("failed to map {len:#x} bytes of the DMA buffer")]
    MapRegion {
        len: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("U_DMA_BUF_IOCTL_SET_SYNC ioctl failed")]
    SyncIoctl(#[source] nix::Error),
}

nix::ioctl_write_ptr!(
    /// `U_DMA_BUF_IOCTL_SET_SYNC` ioctl defined by the u-dma-buf driver.
    udmabuf_set_sync,
    UDMABUF_IOCTL_TYPE,
    UDMABUF_IOCTL_SET_SYNC,
    SyncDescriptor
);

struct Mapping {
    addr: *mut c_void,
    len: usize,
}

impl Mapping {
    fn new(file: &impl AsRawFd, len: usize) -> std::io::Result<Self> {
        // SAFETY: No address is being passed, the fd is open for the
        // duration of the call, and the result is validated.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { addr, len })
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: self contains a valid mmap result.
        if unsafe { libc::munmap(self.addr, self.len) } < 0 {
            panic!("{:?}", std::io::Error::last_os_error());
        }
    }
}

/// An open and mapped u-dma-buf region.
///
/// Dropping the device unmaps the region and then closes the file.
pub struct UdmabufDevice {
    // Must be declared before `file` so it is dropped first.
    mapping: Mapping,
    file: fs_err::File,
}

impl UdmabufDevice {
    /// Opens the device at `path` read-write and maps the first `len` bytes
    /// of its buffer shared, at offset zero.
    pub fn open(path: impl AsRef<Path>, len: usize) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = fs_err::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::OpenDevice)?;

        let mapping =
            Mapping::new(&file, len).map_err(|source| Error::MapRegion { len, source })?;

        tracing::trace!(path = %path.display(), len, "mapped dma buffer");
        Ok(Self { mapping, file })
    }

    /// Length of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.mapping.len
    }

    /// Invokes the `U_DMA_BUF_IOCTL_SET_SYNC` ioctl with `desc`.
    pub fn sync(&self, desc: &SyncDescriptor) -> Result<(), Error> {
        // SAFETY: Make the SET_SYNC ioctl call to the device with the
        // correct argument type, which outlives the call.
        unsafe {
            udmabuf_set_sync(self.file.as_raw_fd(), desc).map_err(Error::SyncIoctl)?;
        }
        Ok(())
    }

    /// Copies `dst.len()` bytes starting at `offset` in the region into
    /// `dst`.
    ///
    /// Panics if the range is not within the mapped region.
    pub fn read_into(&self, offset: usize, dst: &mut [MaybeUninit<u8>]) {
        assert!(
            offset
                .checked_add(dst.len())
                .is_some_and(|end| end <= self.mapping.len),
            "read of {:#x} bytes at {:#x} is outside the {:#x} byte region",
            dst.len(),
            offset,
            self.mapping.len
        );
        // SAFETY: The source range was just checked to be within the
        // mapping, which stays valid for reads while `self` is borrowed. `dst`
        // is an exclusively borrowed, separate allocation.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.mapping.addr.cast::<u8>().add(offset),
                dst.as_mut_ptr().cast::<u8>(),
                dst.len(),
            );
        }
    }
}
