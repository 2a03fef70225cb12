//! Single-frame capture state machine.
//!
//! One call to [`CaptureEngine::capture`] walks
//!
//! ```text
//! Idle -> FormatSet -> BufferRequested -> BufferMapped -> Streaming
//!      -> BufferQueued -> BufferDequeued -> Stopped
//! ```
//!
//! exactly once, using a single mmap buffer. The mapping and the streaming
//! state are held by guards, so every exit path after `BufferMapped` turns
//! streaming off (if it was turned on) and unmaps, in that order.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, IoctlError, Result};
use crate::sys::{self, Zeroed};
use crate::traits::{FourCC, FrameSize, RawDevice, Snapshot};

/// Where a capture cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CaptureState {
    /// Nothing issued yet.
    Idle,
    /// `VIDIOC_S_FMT` accepted.
    FormatSet,
    /// One mmap buffer granted by `VIDIOC_REQBUFS`.
    BufferRequested,
    /// Buffer queried and mapped into the process.
    BufferMapped,
    /// `VIDIOC_STREAMON` accepted.
    Streaming,
    /// Buffer 0 handed to the driver.
    BufferQueued,
    /// Driver returned the filled buffer.
    BufferDequeued,
    /// Streaming off and buffer unmapped.
    Stopped,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Parameters of one capture cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Pixel format to select.
    pub fourcc: FourCC,
    /// Resolution to request.
    pub size: FrameSize,
    /// Upper bound on the wait for a filled buffer. `None` waits forever.
    pub dequeue_timeout: Option<Duration>,
}

/// A mapped buffer region, unmapped when dropped.
struct Mapping<'d, D: RawDevice> {
    device: &'d D,
    region: Option<D::Region>,
}

impl<'d, D: RawDevice> Mapping<'d, D> {
    const fn new(device: &'d D, region: D::Region) -> Self {
        Self {
            device,
            region: Some(region),
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.region {
            Some(region) => region.as_ref(),
            None => &[],
        }
    }

    fn release(&mut self) {
        if let Some(region) = self.region.take() {
            if let Err(err) = self.device.unmap(region) {
                warn!(
                    "{}: mapped buffer may have leaked: {err}",
                    self.device.path()
                );
            }
        }
    }
}

impl<D: RawDevice> Drop for Mapping<'_, D> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Streaming is on for `buf_type` until this is dropped.
struct Streaming<'d, D: RawDevice> {
    device: &'d D,
    buf_type: u32,
    active: bool,
}

impl<'d, D: RawDevice> Streaming<'d, D> {
    fn start(device: &'d D, buf_type: u32) -> std::result::Result<Self, IoctlError> {
        device.stream_on(buf_type)?;
        Ok(Self {
            device,
            buf_type,
            active: true,
        })
    }

    fn stop(&mut self) {
        if std::mem::replace(&mut self.active, false) {
            if let Err(err) = self.device.stream_off(self.buf_type) {
                warn!(
                    "{}: streaming may still be active: {err}",
                    self.device.path()
                );
            }
        }
    }
}

impl<D: RawDevice> Drop for Streaming<'_, D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives one device through a single-frame capture.
pub struct CaptureEngine<'d, D: RawDevice> {
    device: &'d D,
    buf_type: u32,
    state: CaptureState,
}

impl<'d, D: RawDevice> CaptureEngine<'d, D> {
    /// Engine for the single-planar video capture queue of `device`.
    pub const fn new(device: &'d D) -> Self {
        Self {
            device,
            buf_type: sys::V4L2_BUF_TYPE_VIDEO_CAPTURE,
            state: CaptureState::Idle,
        }
    }

    /// The furthest state reached by the last [`CaptureEngine::capture`] call.
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    fn advance(&mut self, next: CaptureState) {
        debug_assert!(next > self.state, "capture state went backwards");
        debug!("{}: {} -> {}", self.device.path(), self.state, next);
        self.state = next;
    }

    fn path(&self) -> String {
        self.device.path().to_owned()
    }

    /// Run one full capture cycle and return an owned copy of the frame.
    pub fn capture(&mut self, settings: &CaptureSettings) -> Result<Snapshot> {
        self.state = CaptureState::Idle;
        let device = self.device;

        let size = self.set_format(settings)?;
        self.advance(CaptureState::FormatSet);

        self.request_buffer()?;
        self.advance(CaptureState::BufferRequested);

        let mut buffer = sys::v4l2_buffer::mmap(0, self.buf_type);
        device
            .query_buffer(&mut buffer)
            .map_err(|source| Error::BufferMap {
                path: self.path(),
                source,
            })?;
        debug!(
            "{}: buffer 0 at offset={:#x} length={}",
            device.path(),
            buffer.offset(),
            buffer.length
        );
        let region = device
            .map(buffer.offset(), buffer.length)
            .map_err(|source| Error::BufferMap {
                path: self.path(),
                source,
            })?;
        let mut mapping = Mapping::new(device, region);
        self.advance(CaptureState::BufferMapped);

        let mut streaming =
            Streaming::start(device, self.buf_type).map_err(|source| Error::StreamOn {
                path: self.path(),
                source,
            })?;
        self.advance(CaptureState::Streaming);

        let mut buffer = sys::v4l2_buffer::mmap(0, self.buf_type);
        device
            .queue_buffer(&mut buffer)
            .map_err(|source| Error::BufferQueue {
                path: self.path(),
                source,
            })?;
        self.advance(CaptureState::BufferQueued);

        device
            .dequeue_buffer(&mut buffer, settings.dequeue_timeout)
            .map_err(|source| Error::BufferDequeue {
                path: self.path(),
                source,
            })?;
        self.advance(CaptureState::BufferDequeued);

        let data = copy_frame(device.path(), mapping.bytes(), buffer.bytesused);

        streaming.stop();
        mapping.release();
        self.advance(CaptureState::Stopped);

        info!(
            "{}: captured {} bytes at {size} ({})",
            device.path(),
            data.len(),
            settings.fourcc
        );
        Ok(Snapshot {
            size,
            fourcc: settings.fourcc,
            data,
        })
    }

    /// Select format and size; returns the size the driver actually applied.
    fn set_format(&self, settings: &CaptureSettings) -> Result<FrameSize> {
        let pix = sys::v4l2_pix_format {
            width: settings.size.width,
            height: settings.size.height,
            pixelformat: settings.fourcc.to_u32(),
            field: sys::V4L2_FIELD_NONE,
            ..sys::v4l2_pix_format::default()
        };
        let mut format = sys::v4l2_format::with_pix(self.buf_type, pix);

        self.device
            .set_format(&mut format)
            .map_err(|source| Error::FormatSet {
                path: self.path(),
                source,
            })?;

        let applied = format.pix();
        let size = FrameSize::new(applied.width, applied.height);
        if size != settings.size {
            warn!(
                "{}: requested {} but driver applied {size}",
                self.device.path(),
                settings.size
            );
        }
        let fourcc = FourCC::from_u32(applied.pixelformat);
        if fourcc != settings.fourcc {
            warn!(
                "{}: requested {} but driver applied {fourcc}",
                self.device.path(),
                settings.fourcc
            );
        }
        Ok(size)
    }

    fn request_buffer(&self) -> Result<()> {
        let mut request = sys::v4l2_requestbuffers::zeroed();
        request.count = 1;
        request.type_ = self.buf_type;
        request.memory = sys::V4L2_MEMORY_MMAP;

        self.device
            .request_buffers(&mut request)
            .map_err(|source| Error::BufferRequest {
                path: self.path(),
                source,
            })?;

        if request.count == 0 {
            return Err(Error::BufferRequest {
                path: self.path(),
                source: IoctlError::new("VIDIOC_REQBUFS", libc::ENOMEM),
            });
        }
        Ok(())
    }
}

/// Copy the valid prefix of a dequeued buffer out of its mapping.
fn copy_frame(path: &str, mapped: &[u8], bytes_used: u32) -> Vec<u8> {
    let wanted = usize::try_from(bytes_used).unwrap_or(usize::MAX);
    if wanted > mapped.len() {
        warn!(
            "{path}: driver reported {wanted} bytes in a {} byte buffer",
            mapped.len()
        );
    }
    mapped.get(..wanted.min(mapped.len())).unwrap_or_default().to_vec()
}
