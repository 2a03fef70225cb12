//! Error taxonomy for device control.
//!
//! Every stage of a capture has its own variant so callers can tell which
//! step failed; each carries the device path for user-facing messages.

use std::io;

use thiserror::Error;

use crate::traits::FourCC;

/// A failed system call against a device: which request, which errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{request} failed: {}", os_error(.errno))]
pub struct IoctlError {
    /// Kernel request name (`VIDIOC_*`, or `mmap`/`munmap`/`close`).
    pub request: &'static str,
    /// Raw errno reported by the kernel.
    pub errno: i32,
}

impl IoctlError {
    /// Build an error for `request` with an explicit errno.
    #[must_use]
    pub const fn new(request: &'static str, errno: i32) -> Self {
        Self { request, errno }
    }

    /// Build an error for `request` from the calling thread's `errno`.
    #[must_use]
    pub fn last_os_error(request: &'static str) -> Self {
        let errno = io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO);
        Self { request, errno }
    }

    /// Whether the kernel signalled "index out of range", which ends an
    /// enumeration rather than failing it.
    #[must_use]
    pub const fn is_end_of_enumeration(&self) -> bool {
        self.errno == libc::EINVAL
    }

    /// Whether a bounded wait expired before the driver answered.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        self.errno == libc::ETIMEDOUT
    }
}

// `#[error]` arguments receive fields by reference.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn os_error(errno: &i32) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

impl From<IoctlError> for io::Error {
    fn from(err: IoctlError) -> Self {
        Self::from_raw_os_error(err.errno)
    }
}

/// Capability bit required for snapshot capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCapability {
    /// `V4L2_CAP_VIDEO_CAPTURE`
    VideoCapture,
    /// `V4L2_CAP_STREAMING`
    Streaming,
}

impl std::fmt::Display for MissingCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VideoCapture => write!(f, "video capture"),
            Self::Streaming => write!(f, "streaming I/O"),
        }
    }
}

/// Error type for device operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The device node could not be opened.
    #[error("cannot open device {path}: {source}")]
    DeviceOpen {
        /// Device node path.
        path: String,
        /// Underlying open error.
        #[source]
        source: io::Error,
    },

    /// A generic kernel call failure outside any named stage.
    #[error("{path}: {source}")]
    Ioctl {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// `VIDIOC_QUERYCAP` failed.
    #[error("{path}: cannot query capability: {source}")]
    CapabilityQuery {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// The device lacks a capability this crate requires.
    #[error("device {path} ({card}) does not support {missing}")]
    UnsupportedDevice {
        /// Device node path.
        path: String,
        /// Card name reported by the driver.
        card: String,
        /// The absent capability.
        missing: MissingCapability,
    },

    /// Format or frame size enumeration failed mid-sequence.
    #[error("{path}: format enumeration failed: {source}")]
    FormatEnumeration {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// The target pixel format is not among the advertised ones.
    #[error("device {path} does not advertise pixel format {fourcc}")]
    FormatNotAdvertised {
        /// Device node path.
        path: String,
        /// Requested pixel format.
        fourcc: FourCC,
    },

    /// `VIDIOC_S_FMT` failed.
    #[error("{path}: cannot set format: {source}")]
    FormatSet {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// `VIDIOC_REQBUFS` failed or granted no buffer.
    #[error("{path}: cannot request buffer: {source}")]
    BufferRequest {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// `VIDIOC_QUERYBUF` or `mmap` failed.
    #[error("{path}: cannot map buffer: {source}")]
    BufferMap {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// `VIDIOC_STREAMON` failed.
    #[error("{path}: cannot start streaming: {source}")]
    StreamOn {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// `VIDIOC_QBUF` failed.
    #[error("{path}: cannot queue buffer: {source}")]
    BufferQueue {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// `VIDIOC_DQBUF` failed or timed out.
    #[error("{path}: cannot dequeue buffer: {source}")]
    BufferDequeue {
        /// Device node path.
        path: String,
        /// Failed call.
        #[source]
        source: IoctlError,
    },

    /// Frame size resolution needed candidates but the device offers none.
    #[error("{path}: no discrete frame sizes advertised")]
    NoCandidates {
        /// Device node path.
        path: String,
    },
}

impl Error {
    /// Device path the error refers to.
    pub fn path(&self) -> &str {
        match self {
            Self::DeviceOpen { path, .. }
            | Self::Ioctl { path, .. }
            | Self::CapabilityQuery { path, .. }
            | Self::UnsupportedDevice { path, .. }
            | Self::FormatEnumeration { path, .. }
            | Self::FormatNotAdvertised { path, .. }
            | Self::FormatSet { path, .. }
            | Self::BufferRequest { path, .. }
            | Self::BufferMap { path, .. }
            | Self::StreamOn { path, .. }
            | Self::BufferQueue { path, .. }
            | Self::BufferDequeue { path, .. }
            | Self::NoCandidates { path } => path,
        }
    }

    /// Short name of the failing stage, for logs and status lines.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::DeviceOpen { .. } => "open",
            Self::Ioctl { .. } => "ioctl",
            Self::CapabilityQuery { .. } | Self::UnsupportedDevice { .. } => "capability",
            Self::FormatEnumeration { .. } | Self::FormatNotAdvertised { .. } => "enumeration",
            Self::FormatSet { .. } => "set-format",
            Self::BufferRequest { .. } => "request-buffer",
            Self::BufferMap { .. } => "map-buffer",
            Self::StreamOn { .. } => "stream-on",
            Self::BufferQueue { .. } => "queue-buffer",
            Self::BufferDequeue { .. } => "dequeue-buffer",
            Self::NoCandidates { .. } => "resolve",
        }
    }

    /// Underlying errno, when the failure came from a kernel call.
    pub const fn errno(&self) -> Option<i32> {
        match self {
            Self::Ioctl { source, .. }
            | Self::CapabilityQuery { source, .. }
            | Self::FormatEnumeration { source, .. }
            | Self::FormatSet { source, .. }
            | Self::BufferRequest { source, .. }
            | Self::BufferMap { source, .. }
            | Self::StreamOn { source, .. }
            | Self::BufferQueue { source, .. }
            | Self::BufferDequeue { source, .. } => Some(source.errno),
            Self::DeviceOpen { .. }
            | Self::UnsupportedDevice { .. }
            | Self::FormatNotAdvertised { .. }
            | Self::NoCandidates { .. } => None,
        }
    }
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, Error>;
