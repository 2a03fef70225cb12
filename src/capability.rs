//! Capability negotiation: `VIDIOC_QUERYCAP` and the capture/streaming gate.

use log::debug;

use crate::error::{Error, MissingCapability, Result};
use crate::sys;
use crate::traits::{Capability, RawDevice};

/// Decode a NUL-padded fixed-size string field.
pub(crate) fn c_str_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(bytes.get(..end).unwrap_or_default()).into_owned()
}

impl From<&sys::v4l2_capability> for Capability {
    fn from(raw: &sys::v4l2_capability) -> Self {
        Self {
            driver: c_str_field(&raw.driver),
            card: c_str_field(&raw.card),
            bus_info: c_str_field(&raw.bus_info),
            version: raw.version,
            capabilities: raw.capabilities,
        }
    }
}

/// Read the device's capability. Must be the first call on a fresh handle.
pub fn query_capability<D: RawDevice>(device: &D) -> Result<Capability> {
    let raw = device
        .query_capability()
        .map_err(|source| Error::CapabilityQuery {
            path: device.path().to_owned(),
            source,
        })?;
    let capability = Capability::from(&raw);
    debug!(
        "{}: driver={} card={} bus={} caps={:#010x}",
        device.path(),
        capability.driver,
        capability.card,
        capability.bus_info,
        capability.capabilities
    );
    Ok(capability)
}

/// Fail unless the device supports both video capture and streaming I/O.
pub fn require_capture_streaming(path: &str, capability: &Capability) -> Result<()> {
    let missing = if !capability.can_capture() {
        Some(MissingCapability::VideoCapture)
    } else if !capability.can_stream() {
        Some(MissingCapability::Streaming)
    } else {
        None
    };

    missing.map_or(Ok(()), |missing| {
        Err(Error::UnsupportedDevice {
            path: path.to_owned(),
            card: capability.card.clone(),
            missing,
        })
    })
}
