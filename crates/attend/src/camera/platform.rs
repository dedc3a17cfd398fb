//! Platform camera API seam
//!
//! Mirrors the small slice of a browser-style media API the acquisition
//! manager needs: request a stream under constraints, enumerate devices, and
//! read back what a stream actually opened. Each platform binding (or a test
//! fake) implements [`MediaDevices`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Camera orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacingMode {
    /// Rear camera
    Environment,
    /// Front camera
    User,
    Left,
    Right,
}

/// A constraint that must hold, or one the platform should try to honor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint<T> {
    Exact(T),
    Ideal(T),
}

/// Video constraints for a stream request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub device_id: Option<Constraint<String>>,
    pub facing_mode: Option<Constraint<FacingMode>>,
    pub width: Option<Constraint<u32>>,
    pub height: Option<Constraint<u32>>,
}

impl VideoConstraints {
    /// Any camera, preferably a rear one
    pub fn prefer_environment() -> Self {
        Self {
            facing_mode: Some(Constraint::Ideal(FacingMode::Environment)),
            ..Default::default()
        }
    }

    /// Exactly this device
    pub fn device(device_id: &str) -> Self {
        Self {
            device_id: Some(Constraint::Exact(device_id.to_string())),
            ..Default::default()
        }
    }

    /// Exactly this device, and only if it is a rear camera
    pub fn environment_device(device_id: &str) -> Self {
        Self {
            facing_mode: Some(Constraint::Exact(FacingMode::Environment)),
            ..Self::device(device_id)
        }
    }
}

/// Kind of media device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Capabilities a device reports before it is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Empty when the platform does not report orientation
    pub facing_mode: Vec<FacingMode>,
}

/// One enumerated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub kind: DeviceKind,
    /// `None` when the platform offers no capability introspection
    pub capabilities: Option<Capabilities>,
}

impl DeviceInfo {
    /// Rear-facing according to capabilities: `Some(true)` / `Some(false)`,
    /// or `None` when orientation is not reported.
    pub fn reported_back_facing(&self) -> Option<bool> {
        let caps = self.capabilities.as_ref()?;
        if caps.facing_mode.is_empty() {
            return None;
        }
        Some(caps.facing_mode.contains(&FacingMode::Environment))
    }
}

/// What an open track actually settled on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub device_id: Option<String>,
    pub facing_mode: Option<FacingMode>,
}

/// Error classes reported by the platform's camera API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaErrorKind {
    /// Transient: the device refused a rapid re-open
    Abort,
    /// The user or policy denied camera access
    NotAllowed,
    /// No device matches
    NotFound,
    /// The device cannot satisfy an exact constraint
    Overconstrained,
    /// Legacy name for `Overconstrained`
    ConstraintNotSatisfied,
    Other(String),
}

/// A platform camera error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub message: String,
}

impl MediaError {
    pub fn new(kind: MediaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The device exists but cannot satisfy the requested constraints.
    pub fn is_overconstrained(&self) -> bool {
        matches!(
            self.kind,
            MediaErrorKind::Overconstrained | MediaErrorKind::ConstraintNotSatisfied
        )
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MediaErrorKind::Other(name) => write!(f, "{}: {}", name, self.message),
            kind => write!(f, "{:?}: {}", kind, self.message),
        }
    }
}

impl std::error::Error for MediaError {}

/// An open camera stream.
pub trait MediaStream: Send {
    /// Settings of the stream's video track
    fn settings(&self) -> TrackSettings;

    /// Stop every track, releasing the device.
    fn stop_tracks(&mut self);
}

/// The platform camera API.
pub trait MediaDevices: Send + Sync {
    type Stream: MediaStream;

    /// Whether stream requests and enumeration are available at all.
    fn is_supported(&self) -> bool;

    fn get_user_media(
        &self,
        constraints: &VideoConstraints,
    ) -> impl Future<Output = Result<Self::Stream, MediaError>> + Send;

    fn enumerate_devices(&self) -> impl Future<Output = Result<Vec<DeviceInfo>, MediaError>> + Send;
}
