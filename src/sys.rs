//! Kernel ABI mirror of the V4L2 structures used by this crate.
//!
//! Every struct here is `#[repr(C)]` and laid out field-for-field like its
//! `linux/videodev2.h` counterpart, reserved fields included. The sizes are
//! checked at compile time at the bottom of this file: the ioctl request codes
//! in [`crate::codec`] embed `size_of` of these structs, so any drift breaks
//! the build here instead of corrupting kernel-side parsing.

#![allow(unsafe_code)]
#![allow(non_camel_case_types, missing_docs)]

use std::mem::size_of;

use libc::{c_ulong, c_void, timeval};

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_FIELD_NONE: u32 = 1;

pub const V4L2_FRMSIZE_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMSIZE_TYPE_CONTINUOUS: u32 = 2;
pub const V4L2_FRMSIZE_TYPE_STEPWISE: u32 = 3;

/// `struct v4l2_capability`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

/// `struct v4l2_fmtdesc`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct v4l2_fmtdesc {
    pub index: u32,
    pub type_: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixelformat: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

/// `struct v4l2_frmsize_discrete`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_frmsize_discrete {
    pub width: u32,
    pub height: u32,
}

/// `struct v4l2_frmsize_stepwise`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_frmsize_stepwise {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

/// Anonymous union inside `struct v4l2_frmsizeenum`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_frmsize_union {
    pub discrete: v4l2_frmsize_discrete,
    pub stepwise: v4l2_frmsize_stepwise,
}

/// `struct v4l2_frmsizeenum`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_frmsizeenum {
    pub index: u32,
    pub pixel_format: u32,
    pub type_: u32,
    pub size: v4l2_frmsize_union,
    pub reserved: [u32; 2],
}

impl v4l2_frmsizeenum {
    /// The discrete (width, height) pair, if the driver reported one.
    pub const fn discrete(&self) -> Option<v4l2_frmsize_discrete> {
        if self.type_ == V4L2_FRMSIZE_TYPE_DISCRETE {
            // SAFETY: the driver fills the `discrete` member when `type` is DISCRETE,
            // and both members are plain integers so any bit pattern is valid.
            Some(unsafe { self.size.discrete })
        } else {
            None
        }
    }
}

/// `struct v4l2_pix_format`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// The `fmt` union of `struct v4l2_format`.
///
/// The kernel union also holds `struct v4l2_window`, which contains pointers,
/// so the union is pointer-aligned. `_align` reproduces that without
/// mirroring the unused members.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_format_union {
    pub pix: v4l2_pix_format,
    pub raw_data: [u8; 200],
    _align: [c_ulong; 0],
}

/// `struct v4l2_format`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_union,
}

impl v4l2_format {
    /// Single-planar format payload for `buf_type`.
    pub const fn with_pix(buf_type: u32, pix: v4l2_pix_format) -> Self {
        let mut format = Self {
            type_: buf_type,
            fmt: v4l2_format_union { raw_data: [0; 200] },
        };
        format.fmt.pix = pix;
        format
    }

    /// The single-planar payload.
    pub const fn pix(&self) -> v4l2_pix_format {
        // SAFETY: every constructor initializes all 200 bytes, and
        // `v4l2_pix_format` is plain integers, so any bit pattern is valid.
        unsafe { self.fmt.pix }
    }
}

/// `struct v4l2_requestbuffers`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

/// `struct v4l2_timecode`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

/// The `m` union of `struct v4l2_buffer`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut c_void,
    pub fd: i32,
}

/// `struct v4l2_buffer`
#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl v4l2_buffer {
    /// A zeroed descriptor addressing mmap buffer `index` of `buf_type`.
    pub fn mmap(index: u32, buf_type: u32) -> Self {
        Self {
            index,
            type_: buf_type,
            bytesused: 0,
            flags: 0,
            field: 0,
            timestamp: timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            timecode: v4l2_timecode::default(),
            sequence: 0,
            memory: V4L2_MEMORY_MMAP,
            m: v4l2_buffer_m { userptr: 0 },
            length: 0,
            reserved2: 0,
            request_fd: 0,
        }
    }

    /// Kernel-assigned mmap offset. Only meaningful for `V4L2_MEMORY_MMAP`.
    pub const fn offset(&self) -> u32 {
        // SAFETY: `mmap` zeroes the widest member, and the kernel writes
        // `offset` for MMAP buffers; reading a u32 is valid for any bits.
        unsafe { self.m.offset }
    }

    /// Set the mmap offset member.
    pub const fn set_offset(&mut self, offset: u32) {
        self.m.offset = offset;
    }
}

impl std::fmt::Debug for v4l2_buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("v4l2_buffer")
            .field("index", &self.index)
            .field("type", &self.type_)
            .field("bytesused", &self.bytesused)
            .field("memory", &self.memory)
            .field("offset", &self.offset())
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

const _: () = assert!(size_of::<v4l2_capability>() == 104);
const _: () = assert!(size_of::<v4l2_fmtdesc>() == 64);
const _: () = assert!(size_of::<v4l2_frmsizeenum>() == 44);
const _: () = assert!(size_of::<v4l2_pix_format>() == 48);
const _: () = assert!(size_of::<v4l2_requestbuffers>() == 20);

#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<v4l2_format>() == 208);
#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<v4l2_buffer>() == 88);

#[cfg(target_pointer_width = "32")]
const _: () = assert!(size_of::<v4l2_format>() == 204);

/// Zero-initialized ABI structs, as the kernel expects for reserved fields.
pub trait Zeroed: Copy {
    /// All-zero value.
    fn zeroed() -> Self;
}

macro_rules! impl_zeroed {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Zeroed for $ty {
                fn zeroed() -> Self {
                    // SAFETY: plain-old-data kernel struct; all-zero is a valid value
                    // (null for the pointer member of unions).
                    unsafe { std::mem::zeroed() }
                }
            }
        )*
    };
}

impl_zeroed!(
    v4l2_capability,
    v4l2_fmtdesc,
    v4l2_frmsizeenum,
    v4l2_format,
    v4l2_requestbuffers,
    v4l2_buffer,
);
