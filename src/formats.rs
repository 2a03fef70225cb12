//! Pixel format and frame size enumeration.
//!
//! Both enumerations walk an index from 0 until the kernel answers `EINVAL`,
//! which marks the end of the list. Each call starts a fresh walk; nothing is
//! cached between calls.

use log::{debug, trace};

use crate::capability::c_str_field;
use crate::error::{Error, IoctlError, Result};
use crate::sys::{self, Zeroed};
use crate::traits::{FourCC, FrameSize, PixelFormatDescriptor, RawDevice};

/// Lazy walk over `VIDIOC_ENUM_FMT`.
pub struct Formats<'d, D: RawDevice> {
    device: &'d D,
    buf_type: u32,
    index: u32,
    done: bool,
}

impl<D: RawDevice> Iterator for Formats<'_, D> {
    type Item = Result<PixelFormatDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut desc = sys::v4l2_fmtdesc::zeroed();
        desc.index = self.index;
        desc.type_ = self.buf_type;

        match self.device.enum_format(&mut desc) {
            Ok(()) => {
                self.index += 1;
                let fourcc = FourCC::from_u32(desc.pixelformat);
                trace!("{}: format #{} {fourcc}", self.device.path(), desc.index);
                Some(Ok(PixelFormatDescriptor {
                    index: desc.index,
                    fourcc,
                    description: c_str_field(&desc.description),
                }))
            }
            Err(err) => {
                self.done = true;
                enumeration_end(self.device, err)
            }
        }
    }
}

/// Lazy walk over `VIDIOC_ENUM_FRAMESIZES`, yielding discrete sizes only.
///
/// Stepwise and continuous entries are skipped.
pub struct FrameSizes<'d, D: RawDevice> {
    device: &'d D,
    fourcc: FourCC,
    index: u32,
    done: bool,
}

impl<D: RawDevice> Iterator for FrameSizes<'_, D> {
    type Item = Result<FrameSize>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let mut entry = sys::v4l2_frmsizeenum::zeroed();
            entry.index = self.index;
            entry.pixel_format = self.fourcc.to_u32();

            if let Err(err) = self.device.enum_frame_size(&mut entry) {
                self.done = true;
                return enumeration_end(self.device, err);
            }
            self.index += 1;

            if let Some(discrete) = entry.discrete() {
                return Some(Ok(FrameSize::new(discrete.width, discrete.height)));
            }
            debug!(
                "{}: skipping non-discrete frame size entry #{} (type {}) for {}",
                self.device.path(),
                entry.index,
                entry.type_,
                self.fourcc
            );
        }
        None
    }
}

fn enumeration_end<D: RawDevice, T>(device: &D, err: IoctlError) -> Option<Result<T>> {
    if err.is_end_of_enumeration() {
        None
    } else {
        Some(Err(Error::FormatEnumeration {
            path: device.path().to_owned(),
            source: err,
        }))
    }
}

/// Enumerate the pixel formats the device advertises for `buf_type`.
pub const fn list_formats<D: RawDevice>(device: &D, buf_type: u32) -> Formats<'_, D> {
    Formats {
        device,
        buf_type,
        index: 0,
        done: false,
    }
}

/// Enumerate the discrete frame sizes the device advertises for `fourcc`.
pub const fn list_discrete_frame_sizes<D: RawDevice>(
    device: &D,
    fourcc: FourCC,
) -> FrameSizes<'_, D> {
    FrameSizes {
        device,
        fourcc,
        index: 0,
        done: false,
    }
}

/// Collect [`list_discrete_frame_sizes`] into a vector.
pub fn discrete_frame_sizes<D: RawDevice>(device: &D, fourcc: FourCC) -> Result<Vec<FrameSize>> {
    list_discrete_frame_sizes(device, fourcc).collect()
}

/// Whether `fourcc` is among the advertised formats for `buf_type`.
pub fn supports_format<D: RawDevice>(device: &D, buf_type: u32, fourcc: FourCC) -> Result<bool> {
    for format in list_formats(device, buf_type) {
        if format?.fourcc == fourcc {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether `width`x`height` is an advertised discrete size for `fourcc`.
pub fn supports_discrete<D: RawDevice>(
    device: &D,
    fourcc: FourCC,
    width: u32,
    height: u32,
) -> Result<bool> {
    let wanted = FrameSize::new(width, height);
    for size in list_discrete_frame_sizes(device, fourcc) {
        if size? == wanted {
            return Ok(true);
        }
    }
    Ok(false)
}
