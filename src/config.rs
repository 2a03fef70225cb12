//! Explicit configuration passed into the snapshot service.
//!
//! The library holds no process-wide state: the target format, the timeout
//! and the list of known devices all travel as plain values.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::engine::CaptureSettings;
use crate::resolver::{ResolutionPolicy, DEFAULT_FRAME_SIZE};
use crate::traits::{FourCC, FrameSize};

/// Default upper bound on the wait for a filled buffer.
pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every call on a [`crate::SnapshotService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Pixel format used for enumeration and capture.
    pub pixel_format: FourCC,
    /// Resolution captured when the request names no dimension.
    pub default_size: FrameSize,
    /// Bound on the dequeue wait. `None` blocks until the driver answers.
    pub dequeue_timeout: Option<Duration>,
    /// Confirm `pixel_format` is advertised before setting it.
    pub verify_pixel_format: bool,
    /// How a request naming both dimensions is matched.
    pub policy: ResolutionPolicy,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            pixel_format: FourCC::MJPG,
            default_size: DEFAULT_FRAME_SIZE,
            dequeue_timeout: Some(DEFAULT_DEQUEUE_TIMEOUT),
            verify_pixel_format: true,
            policy: ResolutionPolicy::WidthFirst,
        }
    }
}

impl SnapshotConfig {
    /// Use `pixel_format` instead of MJPG.
    #[must_use]
    pub const fn with_pixel_format(mut self, pixel_format: FourCC) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Replace the dequeue bound.
    #[must_use]
    pub const fn with_dequeue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Settings for one capture cycle at `size`.
    pub const fn capture_settings(&self, size: FrameSize) -> CaptureSettings {
        CaptureSettings {
            fourcc: self.pixel_format,
            size,
            dequeue_timeout: self.dequeue_timeout,
        }
    }
}

/// A named device node, written `name=path` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    /// Name callers use to refer to the device.
    pub name: String,
    /// Device node path, e.g. `/dev/video0`.
    pub path: String,
}

/// Error parsing a [`DeviceEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected name=path, got {0:?}")]
pub struct ParseDeviceEntryError(String);

impl FromStr for DeviceEntry {
    type Err = ParseDeviceEntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| ParseDeviceEntryError(s.to_owned()))?;
        let (name, path) = (name.trim(), path.trim());
        if name.is_empty() || path.is_empty() {
            return Err(ParseDeviceEntryError(s.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            path: path.to_owned(),
        })
    }
}

/// Ordered set of configured devices. The first entry wins on duplicate names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    entries: Vec<DeviceEntry>,
}

impl DeviceTable {
    /// Table over `entries` in the given order.
    pub const fn new(entries: Vec<DeviceEntry>) -> Self {
        Self { entries }
    }

    /// Entry named `name`.
    pub fn find(&self, name: &str) -> Option<&DeviceEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// All entries in configuration order.
    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    /// Number of configured devices.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no device is configured.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<DeviceEntry> for DeviceTable {
    fn from_iter<I: IntoIterator<Item = DeviceEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
