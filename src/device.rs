//! V4L2 device implementation over raw `ioctl(2)` and `mmap(2)`.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::ptr::{self, NonNull};
use std::time::{Duration, Instant};

use libc::{c_int, c_void};
use log::{debug, warn};

use crate::codec::{self, Request};
use crate::error::{Error, IoctlError, Result};
use crate::sys;
use crate::traits::{DeviceOpener, RawDevice};

/// An open V4L2 device node.
#[derive(Debug)]
pub struct V4L2Device {
    file: File,
    path: String,
}

impl V4L2Device {
    /// Open a V4L2 device node (e.g. `/dev/video0`) for read-write.
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::DeviceOpen {
                path: path.to_owned(),
                source,
            })?;
        debug!("{path}: opened as fd {}", file.as_raw_fd());
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Issue `request` with `payload` as its in/out argument.
    ///
    /// `T` must be the ABI struct `request` was encoded with; every caller in
    /// this module pairs them from [`crate::codec`].
    fn ioctl<T>(&self, request: Request, payload: &mut T) -> std::result::Result<(), IoctlError> {
        let arg = ptr::from_mut(payload).cast::<c_void>();
        loop {
            // SAFETY: `arg` points to a live, exclusively borrowed `T` whose size
            // is the one encoded in `request`, so the kernel stays within it.
            let ret = unsafe { libc::ioctl(self.fd(), request_arg(request.code), arg) };
            if ret >= 0 {
                return Ok(());
            }
            let err = IoctlError::last_os_error(request.name);
            // Interrupted before the driver did anything; not a device answer.
            if err.errno != libc::EINTR {
                return Err(err);
            }
        }
    }

    fn wait_readable(&self, timeout: Duration) -> std::result::Result<(), IoctlError> {
        let mut pollfd = libc::pollfd {
            fd: self.fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Restarts after EINTR only get what is left of the bound.
            let remaining = deadline.map_or(timeout, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            let millis = poll_millis(remaining);
            // SAFETY: one valid pollfd, count 1.
            let ret = unsafe { libc::poll(ptr::from_mut(&mut pollfd), 1, millis) };
            match ret {
                0 => {
                    return Err(IoctlError::new(
                        codec::VIDIOC_DQBUF.name,
                        libc::ETIMEDOUT,
                    ))
                }
                n if n > 0 => return Ok(()),
                _ => {
                    let err = IoctlError::last_os_error("poll");
                    if err.errno != libc::EINTR {
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// `ioctl(2)` takes the request as `c_ulong` on glibc.
#[cfg(not(any(target_env = "musl", target_os = "android")))]
fn request_arg(code: u32) -> libc::c_ulong {
    libc::c_ulong::from(code)
}

/// musl and bionic declare the request as `c_int`; codes above `i32::MAX`
/// keep their bit pattern.
#[cfg(any(target_env = "musl", target_os = "android"))]
#[allow(clippy::cast_possible_wrap)]
const fn request_arg(code: u32) -> c_int {
    code as c_int
}

/// Whole milliseconds for `poll(2)`, rounded up so a short remainder is
/// still waited for.
fn poll_millis(remaining: Duration) -> c_int {
    c_int::try_from(remaining.as_nanos().div_ceil(1_000_000)).unwrap_or(c_int::MAX)
}

/// A buffer mapped from a V4L2 device, unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    fn munmap(&mut self) -> std::result::Result<(), IoctlError> {
        // SAFETY: `ptr`/`len` are exactly what mmap returned, and this is
        // called at most once per region (`unmap` forgets the value).
        let ret = unsafe { libc::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) };
        if ret == 0 {
            Ok(())
        } else {
            Err(IoctlError::last_os_error("munmap"))
        }
    }

    fn unmap(self) -> std::result::Result<(), IoctlError> {
        let mut region = std::mem::ManuallyDrop::new(self);
        region.munmap()
    }
}

impl AsRef<[u8]> for MappedRegion {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: the mapping is readable for `len` bytes until unmapped,
        // which needs `self` by value or `&mut self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Err(err) = self.munmap() {
            warn!("mapped region of {} bytes leaked: {err}", self.len);
        }
    }
}

impl RawDevice for V4L2Device {
    type Region = MappedRegion;

    fn path(&self) -> &str {
        &self.path
    }

    fn query_capability(&self) -> std::result::Result<sys::v4l2_capability, IoctlError> {
        let mut raw = <sys::v4l2_capability as sys::Zeroed>::zeroed();
        self.ioctl(codec::VIDIOC_QUERYCAP, &mut raw)?;
        Ok(raw)
    }

    fn enum_format(&self, desc: &mut sys::v4l2_fmtdesc) -> std::result::Result<(), IoctlError> {
        self.ioctl(codec::VIDIOC_ENUM_FMT, desc)
    }

    fn enum_frame_size(
        &self,
        entry: &mut sys::v4l2_frmsizeenum,
    ) -> std::result::Result<(), IoctlError> {
        self.ioctl(codec::VIDIOC_ENUM_FRAMESIZES, entry)
    }

    fn set_format(&self, format: &mut sys::v4l2_format) -> std::result::Result<(), IoctlError> {
        self.ioctl(codec::VIDIOC_S_FMT, format)
    }

    fn request_buffers(
        &self,
        request: &mut sys::v4l2_requestbuffers,
    ) -> std::result::Result<(), IoctlError> {
        self.ioctl(codec::VIDIOC_REQBUFS, request)
    }

    fn query_buffer(&self, buffer: &mut sys::v4l2_buffer) -> std::result::Result<(), IoctlError> {
        self.ioctl(codec::VIDIOC_QUERYBUF, buffer)
    }

    fn map(&self, offset: u32, length: u32) -> std::result::Result<MappedRegion, IoctlError> {
        let len = length as usize;
        // `off_t` is 32 bits on some targets.
        #[allow(clippy::unnecessary_fallible_conversions)]
        let offset =
            libc::off_t::try_from(offset).map_err(|_| IoctlError::new("mmap", libc::EOVERFLOW))?;
        // SAFETY: a fresh shared mapping of the device at a kernel-supplied
        // offset; no existing memory is affected.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(IoctlError::last_os_error("mmap"));
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or(IoctlError::new("mmap", libc::EFAULT))?;
        Ok(MappedRegion { ptr, len })
    }

    fn unmap(&self, region: MappedRegion) -> std::result::Result<(), IoctlError> {
        region.unmap()
    }

    fn stream_on(&self, buf_type: u32) -> std::result::Result<(), IoctlError> {
        let mut buf_type = c_int::try_from(buf_type).unwrap_or(c_int::MAX);
        self.ioctl(codec::VIDIOC_STREAMON, &mut buf_type)
    }

    fn stream_off(&self, buf_type: u32) -> std::result::Result<(), IoctlError> {
        let mut buf_type = c_int::try_from(buf_type).unwrap_or(c_int::MAX);
        self.ioctl(codec::VIDIOC_STREAMOFF, &mut buf_type)
    }

    fn queue_buffer(&self, buffer: &mut sys::v4l2_buffer) -> std::result::Result<(), IoctlError> {
        self.ioctl(codec::VIDIOC_QBUF, buffer)
    }

    fn dequeue_buffer(
        &self,
        buffer: &mut sys::v4l2_buffer,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), IoctlError> {
        if let Some(timeout) = timeout {
            self.wait_readable(timeout)?;
        }
        self.ioctl(codec::VIDIOC_DQBUF, buffer)
    }

    fn close(self) -> Result<()> {
        let Self { file, path } = self;
        let fd = file.into_raw_fd();
        // SAFETY: `fd` was just released from its owning `File`.
        if unsafe { libc::close(fd) } == 0 {
            debug!("{path}: closed");
            Ok(())
        } else {
            Err(Error::Ioctl {
                path,
                source: IoctlError::last_os_error("close"),
            })
        }
    }
}

/// Opens real device nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelOpener;

impl DeviceOpener for KernelOpener {
    type Device = V4L2Device;

    fn open(&self, path: &str) -> Result<V4L2Device> {
        V4L2Device::open(path)
    }
}
