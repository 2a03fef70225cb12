//! Mock device implementation for testing without hardware.
//!
//! `MockDevice` answers every V4L2 request from scripted data and records
//! each call, so tests can assert on the exact sequence of kernel calls and
//! inject a failure at any single one of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, IoctlError, Result};
use crate::sys;
use crate::traits::{DeviceOpener, FourCC, FrameSize, RawDevice};

/// One recorded kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// `open(2)`, recorded by [`MockOpener`].
    Open,
    /// `VIDIOC_QUERYCAP`
    QueryCapability,
    /// `VIDIOC_ENUM_FMT` at an index.
    EnumFormat(u32),
    /// `VIDIOC_ENUM_FRAMESIZES` at an index.
    EnumFrameSize(u32),
    /// `VIDIOC_S_FMT`
    SetFormat,
    /// `VIDIOC_REQBUFS`
    RequestBuffers,
    /// `VIDIOC_QUERYBUF`
    QueryBuffer,
    /// `mmap(2)`
    Map,
    /// `munmap(2)`
    Unmap,
    /// `VIDIOC_STREAMON`
    StreamOn,
    /// `VIDIOC_STREAMOFF`
    StreamOff,
    /// `VIDIOC_QBUF`
    QueueBuffer,
    /// `VIDIOC_DQBUF`
    DequeueBuffer,
    /// `close(2)`
    Close,
}

impl Call {
    /// Whether this call belongs to the buffer/streaming stages.
    pub const fn is_buffer_stage(self) -> bool {
        matches!(
            self,
            Self::SetFormat
                | Self::RequestBuffers
                | Self::QueryBuffer
                | Self::Map
                | Self::Unmap
                | Self::StreamOn
                | Self::StreamOff
                | Self::QueueBuffer
                | Self::DequeueBuffer
        )
    }
}

#[derive(Debug, Default)]
struct Log {
    calls: Vec<Call>,
    mappings: usize,
    streaming: bool,
    queued: bool,
}

/// Mapped region handed out by [`MockDevice::map`].
#[derive(Debug)]
pub struct MockRegion {
    data: Vec<u8>,
}

impl AsRef<[u8]> for MockRegion {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Mock device for testing without hardware.
///
/// Clones share the call log.
#[derive(Debug, Clone)]
pub struct MockDevice {
    path: String,
    driver: String,
    card: String,
    bus_info: String,
    capabilities: u32,
    formats: Vec<FourCC>,
    frame_size_format: FourCC,
    frame_sizes: Vec<FrameSize>,
    stepwise_at: Option<usize>,
    frame: Vec<u8>,
    region_len: usize,
    bytes_used: Option<u32>,
    applied_size: Option<FrameSize>,
    granted_buffers: u32,
    dequeue_times_out: bool,
    failures: HashMap<Call, i32>,
    log: Arc<Mutex<Log>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A capture + streaming MJPG camera with three discrete sizes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: "/dev/mock0".to_owned(),
            driver: "mock".to_owned(),
            card: "Mock Camera".to_owned(),
            bus_info: "mock:0".to_owned(),
            capabilities: sys::V4L2_CAP_VIDEO_CAPTURE | sys::V4L2_CAP_STREAMING,
            formats: vec![FourCC::YUYV, FourCC::MJPG],
            frame_size_format: FourCC::MJPG,
            frame_sizes: vec![
                FrameSize::new(320, 240),
                FrameSize::new(640, 480),
                FrameSize::new(1280, 960),
            ],
            stepwise_at: None,
            frame: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9],
            region_len: 4096,
            bytes_used: None,
            applied_size: None,
            granted_buffers: 1,
            dequeue_times_out: false,
            failures: HashMap::new(),
            log: Arc::default(),
        }
    }

    /// Set the device path.
    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        path.clone_into(&mut self.path);
        self
    }

    /// Set the raw capability bitmask.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: u32) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the advertised pixel formats.
    #[must_use]
    pub fn with_formats(mut self, formats: &[FourCC]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Set the discrete sizes advertised for the frame size format (MJPG by default).
    #[must_use]
    pub fn with_frame_sizes(mut self, sizes: &[FrameSize]) -> Self {
        self.frame_sizes = sizes.to_vec();
        self
    }

    /// Set the pixel format whose frame sizes are advertised.
    #[must_use]
    pub const fn with_frame_size_format(mut self, fourcc: FourCC) -> Self {
        self.frame_size_format = fourcc;
        self
    }

    /// Insert a stepwise entry at enumeration index `index`.
    #[must_use]
    pub const fn with_stepwise_entry_at(mut self, index: usize) -> Self {
        self.stepwise_at = Some(index);
        self
    }

    /// Frame bytes placed at the start of a zero-filled region of `region_len`.
    #[must_use]
    pub fn with_frame(mut self, frame: &[u8], region_len: usize) -> Self {
        self.frame = frame.to_vec();
        self.region_len = region_len;
        self
    }

    /// Override the `bytesused` the dequeued descriptor reports.
    #[must_use]
    pub const fn with_bytes_used(mut self, bytes_used: u32) -> Self {
        self.bytes_used = Some(bytes_used);
        self
    }

    /// Make `VIDIOC_S_FMT` adjust the size to `size`.
    #[must_use]
    pub const fn with_applied_size(mut self, size: FrameSize) -> Self {
        self.applied_size = Some(size);
        self
    }

    /// Number of buffers `VIDIOC_REQBUFS` grants.
    #[must_use]
    pub const fn with_granted_buffers(mut self, count: u32) -> Self {
        self.granted_buffers = count;
        self
    }

    /// Make `VIDIOC_DQBUF` report `ETIMEDOUT`.
    #[must_use]
    pub const fn with_dequeue_timeout(mut self) -> Self {
        self.dequeue_times_out = true;
        self
    }

    /// Fail `call` with `errno`.
    #[must_use]
    pub fn fail_at(mut self, call: Call, errno: i32) -> Self {
        self.failures.insert(call, errno);
        self
    }

    /// Every call recorded so far, across all clones.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Regions mapped and not yet unmapped.
    pub fn outstanding_mappings(&self) -> usize {
        self.lock().mappings
    }

    /// Whether streaming is currently on.
    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().expect("mock log poisoned")
    }

    fn record(&self, call: Call, request: &'static str) -> std::result::Result<(), IoctlError> {
        self.lock().calls.push(call);
        match self.failures.get(&call) {
            Some(&errno) => Err(IoctlError::new(request, errno)),
            None => Ok(()),
        }
    }

    fn frame_size_entries(&self) -> Vec<Option<FrameSize>> {
        let mut entries: Vec<_> = self.frame_sizes.iter().copied().map(Some).collect();
        if let Some(index) = self.stepwise_at {
            entries.insert(index.min(entries.len()), None);
        }
        entries
    }
}

fn einval(request: &'static str) -> IoctlError {
    IoctlError::new(request, libc::EINVAL)
}

impl RawDevice for MockDevice {
    type Region = MockRegion;

    fn path(&self) -> &str {
        &self.path
    }

    fn query_capability(&self) -> std::result::Result<sys::v4l2_capability, IoctlError> {
        self.record(Call::QueryCapability, "VIDIOC_QUERYCAP")?;
        let mut raw = <sys::v4l2_capability as sys::Zeroed>::zeroed();
        raw.driver = fill_c_str(&self.driver);
        raw.card = fill_c_str(&self.card);
        raw.bus_info = fill_c_str(&self.bus_info);
        raw.version = 0x0006_0100;
        raw.capabilities = self.capabilities;
        raw.device_caps = self.capabilities;
        Ok(raw)
    }

    fn enum_format(&self, desc: &mut sys::v4l2_fmtdesc) -> std::result::Result<(), IoctlError> {
        self.record(Call::EnumFormat(desc.index), "VIDIOC_ENUM_FMT")?;
        if desc.type_ != sys::V4L2_BUF_TYPE_VIDEO_CAPTURE {
            return Err(einval("VIDIOC_ENUM_FMT"));
        }
        let fourcc = usize::try_from(desc.index)
            .ok()
            .and_then(|index| self.formats.get(index))
            .ok_or_else(|| einval("VIDIOC_ENUM_FMT"))?;
        desc.pixelformat = fourcc.to_u32();
        desc.description = fill_c_str(&fourcc.to_string());
        Ok(())
    }

    fn enum_frame_size(
        &self,
        entry: &mut sys::v4l2_frmsizeenum,
    ) -> std::result::Result<(), IoctlError> {
        self.record(Call::EnumFrameSize(entry.index), "VIDIOC_ENUM_FRAMESIZES")?;
        if entry.pixel_format != self.frame_size_format.to_u32() {
            return Err(einval("VIDIOC_ENUM_FRAMESIZES"));
        }
        let entries = self.frame_size_entries();
        let slot = usize::try_from(entry.index)
            .ok()
            .and_then(|index| entries.get(index))
            .ok_or_else(|| einval("VIDIOC_ENUM_FRAMESIZES"))?;
        match slot {
            Some(size) => {
                entry.type_ = sys::V4L2_FRMSIZE_TYPE_DISCRETE;
                entry.size.discrete = sys::v4l2_frmsize_discrete {
                    width: size.width,
                    height: size.height,
                };
            }
            None => {
                entry.type_ = sys::V4L2_FRMSIZE_TYPE_STEPWISE;
                entry.size.stepwise = sys::v4l2_frmsize_stepwise {
                    min_width: 16,
                    max_width: 4096,
                    step_width: 16,
                    min_height: 16,
                    max_height: 2160,
                    step_height: 16,
                };
            }
        }
        Ok(())
    }

    fn set_format(&self, format: &mut sys::v4l2_format) -> std::result::Result<(), IoctlError> {
        self.record(Call::SetFormat, "VIDIOC_S_FMT")?;
        let mut pix = format.pix();
        if let Some(size) = self.applied_size {
            pix.width = size.width;
            pix.height = size.height;
        }
        pix.sizeimage = u32::try_from(self.region_len).unwrap_or(u32::MAX);
        format.fmt.pix = pix;
        Ok(())
    }

    fn request_buffers(
        &self,
        request: &mut sys::v4l2_requestbuffers,
    ) -> std::result::Result<(), IoctlError> {
        self.record(Call::RequestBuffers, "VIDIOC_REQBUFS")?;
        if request.memory != sys::V4L2_MEMORY_MMAP {
            return Err(einval("VIDIOC_REQBUFS"));
        }
        request.count = request.count.min(self.granted_buffers);
        Ok(())
    }

    fn query_buffer(&self, buffer: &mut sys::v4l2_buffer) -> std::result::Result<(), IoctlError> {
        self.record(Call::QueryBuffer, "VIDIOC_QUERYBUF")?;
        if buffer.index != 0 {
            return Err(einval("VIDIOC_QUERYBUF"));
        }
        buffer.set_offset(0);
        buffer.length = u32::try_from(self.region_len).unwrap_or(u32::MAX);
        Ok(())
    }

    fn map(&self, _offset: u32, length: u32) -> std::result::Result<MockRegion, IoctlError> {
        self.record(Call::Map, "mmap")?;
        let mut data = vec![0u8; length as usize];
        let n = self.frame.len().min(data.len());
        data.get_mut(..n)
            .unwrap_or_default()
            .copy_from_slice(self.frame.get(..n).unwrap_or_default());
        self.lock().mappings += 1;
        Ok(MockRegion { data })
    }

    fn unmap(&self, region: MockRegion) -> std::result::Result<(), IoctlError> {
        drop(region);
        // The kernel drops the mapping even when munmap reports an error.
        let mut log = self.lock();
        log.mappings = log.mappings.saturating_sub(1);
        drop(log);
        self.record(Call::Unmap, "munmap")
    }

    fn stream_on(&self, _buf_type: u32) -> std::result::Result<(), IoctlError> {
        self.record(Call::StreamOn, "VIDIOC_STREAMON")?;
        self.lock().streaming = true;
        Ok(())
    }

    fn stream_off(&self, _buf_type: u32) -> std::result::Result<(), IoctlError> {
        let mut log = self.lock();
        log.streaming = false;
        log.queued = false;
        drop(log);
        self.record(Call::StreamOff, "VIDIOC_STREAMOFF")
    }

    fn queue_buffer(&self, buffer: &mut sys::v4l2_buffer) -> std::result::Result<(), IoctlError> {
        self.record(Call::QueueBuffer, "VIDIOC_QBUF")?;
        if buffer.index != 0 || buffer.memory != sys::V4L2_MEMORY_MMAP {
            return Err(einval("VIDIOC_QBUF"));
        }
        self.lock().queued = true;
        Ok(())
    }

    fn dequeue_buffer(
        &self,
        buffer: &mut sys::v4l2_buffer,
        _timeout: Option<Duration>,
    ) -> std::result::Result<(), IoctlError> {
        self.record(Call::DequeueBuffer, "VIDIOC_DQBUF")?;
        if self.dequeue_times_out {
            return Err(IoctlError::new("VIDIOC_DQBUF", libc::ETIMEDOUT));
        }
        let log = self.lock();
        if !(log.streaming && log.queued) {
            return Err(einval("VIDIOC_DQBUF"));
        }
        drop(log);
        let frame_len = u32::try_from(self.frame.len()).unwrap_or(u32::MAX);
        buffer.index = 0;
        buffer.bytesused = self.bytes_used.unwrap_or(frame_len);
        buffer.length = u32::try_from(self.region_len).unwrap_or(u32::MAX);
        self.lock().queued = false;
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.record(Call::Close, "close")
            .map_err(|source| Error::Ioctl {
                path: self.path.clone(),
                source,
            })
    }
}

/// Copy `s` into a NUL-padded fixed array, truncating to leave one NUL.
pub fn fill_c_str<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    for (dst, src) in out.iter_mut().zip(s.bytes().take(N.saturating_sub(1))) {
        *dst = src;
    }
    out
}

/// Opener that hands out clones of a template [`MockDevice`].
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    devices: HashMap<String, MockDevice>,
}

impl MockOpener {
    /// Empty opener; every path fails with `ENOENT`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `device` at its own path.
    #[must_use]
    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.devices.insert(device.path.clone(), device);
        self
    }
}

impl DeviceOpener for MockOpener {
    type Device = MockDevice;

    fn open(&self, path: &str) -> Result<MockDevice> {
        let open_error = |errno| Error::DeviceOpen {
            path: path.to_owned(),
            source: std::io::Error::from_raw_os_error(errno),
        };
        let device = self
            .devices
            .get(path)
            .ok_or_else(|| open_error(libc::ENOENT))?;
        device
            .record(Call::Open, "open")
            .map_err(|err| open_error(err.errno))?;
        Ok(device.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::Zeroed;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        let raw = device.query_capability().expect("query should succeed");
        assert_eq!(&raw.driver[..5], b"mock\0");
        assert_eq!(
            raw.capabilities,
            sys::V4L2_CAP_VIDEO_CAPTURE | sys::V4L2_CAP_STREAMING
        );
    }

    #[test]
    fn test_mock_clones_share_log() {
        let device = MockDevice::new();
        let clone = device.clone();
        clone.stream_on(sys::V4L2_BUF_TYPE_VIDEO_CAPTURE).expect("stream on");
        assert_eq!(device.calls(), vec![Call::StreamOn]);
        assert!(device.is_streaming());
    }

    #[test]
    fn test_mock_dequeue_requires_queued_buffer() {
        let device = MockDevice::new();
        let mut buffer = sys::v4l2_buffer::mmap(0, sys::V4L2_BUF_TYPE_VIDEO_CAPTURE);
        let err = device
            .dequeue_buffer(&mut buffer, None)
            .expect_err("dequeue without stream should fail");
        assert_eq!(err.errno, libc::EINVAL);
    }

    #[test]
    fn test_mock_map_pads_frame() {
        let device = MockDevice::new().with_frame(b"abc", 6);
        let region = device.map(0, 6).expect("map should succeed");
        assert_eq!(region.as_ref(), b"abc\0\0\0");
        assert_eq!(device.outstanding_mappings(), 1);
        device.unmap(region).expect("unmap should succeed");
        assert_eq!(device.outstanding_mappings(), 0);
    }

    #[test]
    fn test_mock_failure_injection() {
        let device = MockDevice::new().fail_at(Call::EnumFrameSize(0), libc::EIO);
        let mut entry = sys::v4l2_frmsizeenum::zeroed();
        entry.pixel_format = FourCC::MJPG.to_u32();
        let err = device
            .enum_frame_size(&mut entry)
            .expect_err("injected failure");
        assert_eq!(err, IoctlError::new("VIDIOC_ENUM_FRAMESIZES", libc::EIO));
    }

    #[test]
    fn test_mock_opener() {
        let opener = MockOpener::new().with_device(MockDevice::new().with_path("/dev/video9"));
        assert!(opener.open("/dev/video9").is_ok());
        assert!(matches!(
            opener.open("/dev/video0"),
            Err(Error::DeviceOpen { .. })
        ));
    }

    #[test]
    fn test_fill_c_str_pads_and_truncates() {
        let short: [u8; 8] = fill_c_str("uvc");
        assert_eq!(&short, b"uvc\0\0\0\0\0");

        let long: [u8; 4] = fill_c_str("vivid");
        assert_eq!(&long, b"viv\0");
    }
}
