//! V4L2-Snapshot: still-frame capture from V4L2 devices.
//!
//! This library speaks to video devices through raw `ioctl(2)` and `mmap(2)`
//! behind the [`RawDevice`] trait, enabling both production use with real
//! hardware and testing with mock devices. [`SnapshotService`] is the entry
//! point: it describes a device or captures one frame from it.

pub mod capability;
pub mod codec;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod formats;
pub mod resolver;
pub mod snapshot;
pub mod sys;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use config::{DeviceEntry, DeviceTable, SnapshotConfig};
pub use device::{KernelOpener, V4L2Device};
pub use engine::{CaptureEngine, CaptureSettings, CaptureState};
pub use error::{Error, IoctlError, MissingCapability, Result};
pub use resolver::{ResolutionPolicy, DEFAULT_FRAME_SIZE};
pub use snapshot::SnapshotService;
pub use traits::{
    Capability, DeviceDescription, DeviceOpener, FourCC, FrameSize, PixelFormatDescriptor,
    RawDevice, ResolutionRequest, Snapshot,
};
