//! Snapshot service: the narrow entry point for callers.
//!
//! Each call opens its own handle, does its work and closes the handle on
//! every exit path. Calls share no state beyond the immutable configuration,
//! so different device paths can be served from different threads at once.

use log::{debug, info, warn};

use crate::capability::{query_capability, require_capture_streaming};
use crate::config::SnapshotConfig;
use crate::engine::CaptureEngine;
use crate::error::{Error, Result};
use crate::formats::{discrete_frame_sizes, supports_format};
use crate::resolver::{needs_candidates, resolve, NoCandidates};
use crate::sys;
use crate::traits::{
    Capability, DeviceDescription, DeviceOpener, RawDevice, ResolutionRequest, Snapshot,
};

/// Describes devices and captures single frames from them.
#[derive(Debug, Clone)]
pub struct SnapshotService<O: DeviceOpener> {
    opener: O,
    config: SnapshotConfig,
}

impl<O: DeviceOpener> SnapshotService<O> {
    /// Service opening devices through `opener`.
    pub const fn new(opener: O, config: SnapshotConfig) -> Self {
        Self { opener, config }
    }

    /// The configuration every call uses.
    pub const fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Read the capability of the device at `path` without gating on it.
    pub fn capability(&self, path: &str) -> Result<Capability> {
        self.with_device(path, query_capability)
    }

    /// Capability and discrete resolutions for the configured pixel format.
    ///
    /// Fails with [`Error::UnsupportedDevice`] before any buffer call when the
    /// device cannot capture or stream.
    pub fn describe(&self, path: &str) -> Result<DeviceDescription> {
        self.with_device(path, |device| {
            let capability = query_capability(device)?;
            require_capture_streaming(device.path(), &capability)?;
            let resolutions = discrete_frame_sizes(device, self.config.pixel_format)?;
            debug!(
                "{}: {} advertises {} discrete sizes for {}",
                device.path(),
                capability.name(),
                resolutions.len(),
                self.config.pixel_format
            );
            Ok(DeviceDescription {
                capability,
                resolutions,
            })
        })
    }

    /// Capture one frame at the resolution resolved from `request`.
    ///
    /// Frame sizes are only enumerated when `request` names a dimension.
    pub fn capture(&self, path: &str, request: &ResolutionRequest) -> Result<Snapshot> {
        self.with_device(path, |device| {
            let capability = query_capability(device)?;
            require_capture_streaming(device.path(), &capability)?;

            let fourcc = self.config.pixel_format;
            if self.config.verify_pixel_format
                && !supports_format(device, sys::V4L2_BUF_TYPE_VIDEO_CAPTURE, fourcc)?
            {
                return Err(Error::FormatNotAdvertised {
                    path: device.path().to_owned(),
                    fourcc,
                });
            }

            let candidates = if needs_candidates(request) {
                discrete_frame_sizes(device, fourcc)?
            } else {
                Vec::new()
            };
            let size = resolve(
                &candidates,
                request,
                self.config.default_size,
                self.config.policy,
            )
            .map_err(|NoCandidates| Error::NoCandidates {
                path: device.path().to_owned(),
            })?;
            info!(
                "{}: capturing {size} {fourcc} from {}",
                device.path(),
                capability.name()
            );

            CaptureEngine::new(device).capture(&self.config.capture_settings(size))
        })
    }

    /// Open `path`, run `f` on the handle and close it whatever `f` returned.
    ///
    /// A close failure is only reported when `f` succeeded and is then logged
    /// rather than returned, so a captured frame is never discarded for it.
    fn with_device<T, F>(&self, path: &str, f: F) -> Result<T>
    where
        F: FnOnce(&O::Device) -> Result<T>,
    {
        let device = self.opener.open(path)?;
        let result = f(&device);
        if let Err(err) = device.close() {
            match &result {
                Ok(_) => warn!("{err}"),
                Err(first) => debug!("{path}: close after {} failure: {err}", first.stage()),
            }
        }
        result
    }
}
