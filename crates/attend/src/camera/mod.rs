//! Camera acquisition for the scanner
//!
//! - [`MediaDevices`]: the platform camera API, implemented per platform
//! - [`DeviceCatalog`]: observed cameras split into rear, front and
//!   unclassified, with a round-robin cursor
//! - [`CameraManager`]: keeps one stream open and switches cameras on demand

mod catalog;
mod manager;
mod platform;

pub use catalog::{DeviceCatalog, Facing};
pub use manager::{
    CameraError, CameraManager, CameraState, DEFAULT_RETRIES, IDEAL_HEIGHT, IDEAL_WIDTH,
    RETRY_BACKOFF, SETTLE_DELAY,
};
pub use platform::{
    Capabilities, Constraint, DeviceInfo, DeviceKind, FacingMode, MediaDevices, MediaError,
    MediaErrorKind, MediaStream, TrackSettings, VideoConstraints,
};
