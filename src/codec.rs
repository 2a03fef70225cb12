//! ioctl request-number encoding.
//!
//! Linux packs every ioctl request into one integer:
//!
//! | bits  | field                          |
//! |-------|--------------------------------|
//! | 0-7   | command number                 |
//! | 8-15  | subsystem tag (`'V'` for V4L2) |
//! | 16-29 | payload size in bytes          |
//! | 30-31 | transfer direction             |
//!
//! The payload size is taken from the [`crate::sys`] mirrors, so the codes
//! below are only as correct as those layouts.

use std::mem::size_of;

use crate::sys;

const NR_BITS: u32 = 8;
const TYPE_BITS: u32 = 8;
const SIZE_BITS: u32 = 14;

const NR_SHIFT: u32 = 0;
const TYPE_SHIFT: u32 = NR_SHIFT + NR_BITS;
const SIZE_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;
const DIR_SHIFT: u32 = SIZE_SHIFT + SIZE_BITS;

/// V4L2 ioctl family tag.
pub const V4L2_TAG: u8 = b'V';

/// Data transfer direction, seen from user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    /// No payload.
    None = 0,
    /// User space writes, kernel reads (`_IOW`).
    Write = 1,
    /// Kernel writes, user space reads (`_IOR`).
    Read = 2,
    /// Both ways (`_IOWR`).
    ReadWrite = 3,
}

/// Encode an ioctl request number.
///
/// Panics (at compile time when used in a `const`) if `size` does not fit
/// in the 14-bit size field.
#[must_use]
pub const fn encode(direction: Direction, tag: u8, number: u8, size: usize) -> u32 {
    assert!(size < (1 << SIZE_BITS), "ioctl payload too large");
    #[allow(clippy::cast_possible_truncation)]
    let size = size as u32;
    ((direction as u32) << DIR_SHIFT)
        | ((tag as u32) << TYPE_SHIFT)
        | ((number as u32) << NR_SHIFT)
        | (size << SIZE_SHIFT)
}

/// A named, encoded V4L2 request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Kernel macro name, used in error messages and logs.
    pub name: &'static str,
    /// Encoded request number.
    pub code: u32,
}

impl Request {
    const fn v4l2<T>(name: &'static str, direction: Direction, number: u8) -> Self {
        Self {
            name,
            code: encode(direction, V4L2_TAG, number, size_of::<T>()),
        }
    }
}

/// `VIDIOC_QUERYCAP`
pub const VIDIOC_QUERYCAP: Request =
    Request::v4l2::<sys::v4l2_capability>("VIDIOC_QUERYCAP", Direction::Read, 0);
/// `VIDIOC_ENUM_FMT`
pub const VIDIOC_ENUM_FMT: Request =
    Request::v4l2::<sys::v4l2_fmtdesc>("VIDIOC_ENUM_FMT", Direction::ReadWrite, 2);
/// `VIDIOC_S_FMT`
pub const VIDIOC_S_FMT: Request =
    Request::v4l2::<sys::v4l2_format>("VIDIOC_S_FMT", Direction::ReadWrite, 5);
/// `VIDIOC_REQBUFS`
pub const VIDIOC_REQBUFS: Request =
    Request::v4l2::<sys::v4l2_requestbuffers>("VIDIOC_REQBUFS", Direction::ReadWrite, 8);
/// `VIDIOC_QUERYBUF`
pub const VIDIOC_QUERYBUF: Request =
    Request::v4l2::<sys::v4l2_buffer>("VIDIOC_QUERYBUF", Direction::ReadWrite, 9);
/// `VIDIOC_QBUF`
pub const VIDIOC_QBUF: Request =
    Request::v4l2::<sys::v4l2_buffer>("VIDIOC_QBUF", Direction::ReadWrite, 15);
/// `VIDIOC_DQBUF`
pub const VIDIOC_DQBUF: Request =
    Request::v4l2::<sys::v4l2_buffer>("VIDIOC_DQBUF", Direction::ReadWrite, 17);
/// `VIDIOC_STREAMON`
pub const VIDIOC_STREAMON: Request =
    Request::v4l2::<libc::c_int>("VIDIOC_STREAMON", Direction::Write, 18);
/// `VIDIOC_STREAMOFF`
pub const VIDIOC_STREAMOFF: Request =
    Request::v4l2::<libc::c_int>("VIDIOC_STREAMOFF", Direction::Write, 19);
/// `VIDIOC_ENUM_FRAMESIZES`
pub const VIDIOC_ENUM_FRAMESIZES: Request =
    Request::v4l2::<sys::v4l2_frmsizeenum>("VIDIOC_ENUM_FRAMESIZES", Direction::ReadWrite, 74);
