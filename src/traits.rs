//! Core traits and types for V4L2 snapshot capture.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{IoctlError, Result};
use crate::sys;

/// Pixel format representation (e.g., MJPG, YUYV).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");

    /// The little-endian `u32` the kernel uses for `pixelformat` fields.
    #[must_use]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Decode a kernel `pixelformat` value.
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("pixel format must be exactly 4 ASCII characters, got {s:?}"))?;
        Ok(Self(bytes))
    }
}

/// A discrete (width, height) capture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameSize {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a new frame size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Identification and feature bits read once from a freshly opened device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Driver version, `KERNEL_VERSION`-encoded.
    pub version: u32,
    /// Raw `capabilities` bitmask.
    #[serde(skip)]
    pub capabilities: u32,
}

impl Capability {
    /// Human-readable device name (the card name).
    pub fn name(&self) -> &str {
        &self.card
    }

    /// Whether the bitmask has `bit` set.
    #[must_use]
    pub const fn has(&self, bit: u32) -> bool {
        self.capabilities & bit == bit
    }

    /// Whether the device can capture video.
    #[must_use]
    pub const fn can_capture(&self) -> bool {
        self.has(sys::V4L2_CAP_VIDEO_CAPTURE)
    }

    /// Whether the device supports streaming I/O.
    #[must_use]
    pub const fn can_stream(&self) -> bool {
        self.has(sys::V4L2_CAP_STREAMING)
    }
}

/// A pixel format the device advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    /// Enumeration index.
    pub index: u32,
    /// Pixel format code.
    pub fourcc: FourCC,
    /// Driver's description of the format.
    pub description: String,
}

/// A partially specified resolution, as received from a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Requested width, if any.
    pub width: Option<u32>,
    /// Requested height, if any.
    pub height: Option<u32>,
}

impl ResolutionRequest {
    /// No preference.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            width: None,
            height: None,
        }
    }

    /// Whether neither dimension is given.
    #[must_use]
    pub const fn is_unspecified(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// One captured still frame: the encoded bytes and the size they were captured at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Resolution the driver captured at.
    pub size: FrameSize,
    /// Pixel format of `data`.
    pub fourcc: FourCC,
    /// Encoded frame bytes, exactly as the driver produced them.
    pub data: Vec<u8>,
}

impl Snapshot {
    /// Payload length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the driver delivered an empty frame.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Device description returned by [`crate::SnapshotService::describe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescription {
    /// Capability snapshot.
    pub capability: Capability,
    /// Discrete resolutions offered for the configured pixel format.
    pub resolutions: Vec<FrameSize>,
}

/// The syscall surface of one open V4L2 device node.
///
/// Each method issues exactly one kernel call with the matching ABI struct.
/// No method retries or interprets errors; that policy belongs to callers.
pub trait RawDevice {
    /// A mapped buffer region. Dropping it without [`RawDevice::unmap`]
    /// must still release the mapping.
    type Region: AsRef<[u8]>;

    /// Path the device was opened from.
    fn path(&self) -> &str;

    /// `VIDIOC_QUERYCAP`
    fn query_capability(&self) -> std::result::Result<sys::v4l2_capability, IoctlError>;

    /// `VIDIOC_ENUM_FMT`
    fn enum_format(&self, desc: &mut sys::v4l2_fmtdesc) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_ENUM_FRAMESIZES`
    fn enum_frame_size(
        &self,
        entry: &mut sys::v4l2_frmsizeenum,
    ) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_S_FMT`
    fn set_format(&self, format: &mut sys::v4l2_format) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_REQBUFS`
    fn request_buffers(
        &self,
        request: &mut sys::v4l2_requestbuffers,
    ) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_QUERYBUF`
    fn query_buffer(&self, buffer: &mut sys::v4l2_buffer) -> std::result::Result<(), IoctlError>;

    /// `mmap` of a queried buffer, read-write and shared.
    fn map(&self, offset: u32, length: u32) -> std::result::Result<Self::Region, IoctlError>;

    /// `munmap` of a region returned by [`RawDevice::map`].
    fn unmap(&self, region: Self::Region) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_STREAMON`
    fn stream_on(&self, buf_type: u32) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_STREAMOFF`
    fn stream_off(&self, buf_type: u32) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_QBUF`
    fn queue_buffer(&self, buffer: &mut sys::v4l2_buffer) -> std::result::Result<(), IoctlError>;

    /// `VIDIOC_DQBUF`. Blocks until the driver fills a buffer, or at most
    /// `timeout` when one is given (`ETIMEDOUT` on expiry).
    fn dequeue_buffer(
        &self,
        buffer: &mut sys::v4l2_buffer,
        timeout: Option<Duration>,
    ) -> std::result::Result<(), IoctlError>;

    /// Release the file descriptor. No mapped region may be outstanding.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens device nodes by path.
pub trait DeviceOpener {
    /// The handle type produced.
    type Device: RawDevice;

    /// Open `path` for read-write.
    fn open(&self, path: &str) -> Result<Self::Device>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_kernel_encoding() {
        // v4l2_fourcc('M', 'J', 'P', 'G')
        assert_eq!(FourCC::MJPG.to_u32(), 0x4750_4A4D);
        assert_eq!(FourCC::from_u32(0x5659_5559), FourCC::YUYV);
    }

    #[test]
    fn test_fourcc_parse_and_display() {
        let fourcc: FourCC = "MJPG".parse().expect("parse should succeed");
        assert_eq!(fourcc, FourCC::MJPG);
        assert_eq!(fourcc.to_string(), "MJPG");
        assert!("MJPEG".parse::<FourCC>().is_err());
        assert_eq!(FourCC([b'A', 0, b'B', 0xFF]).to_string(), "A.B.");
    }

    #[test]
    fn test_capability_bits() {
        let cap = Capability {
            driver: "uvcvideo".to_owned(),
            card: "Webcam".to_owned(),
            bus_info: "usb-0000:00:14.0-1".to_owned(),
            version: 0x0006_0100,
            capabilities: sys::V4L2_CAP_VIDEO_CAPTURE,
        };
        assert!(cap.can_capture());
        assert!(!cap.can_stream());
        assert_eq!(cap.name(), "Webcam");
    }

    #[test]
    fn test_resolution_request() {
        assert!(ResolutionRequest::any().is_unspecified());
        let req = ResolutionRequest {
            width: None,
            height: Some(480),
        };
        assert!(!req.is_unspecified());
    }

    #[test]
    fn test_frame_size_display() {
        assert_eq!(FrameSize::new(1280, 720).to_string(), "1280x720");
    }
}
