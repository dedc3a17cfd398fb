//! Camera acquisition and rotation
//!
//! Opens one camera stream at a time and switches between devices on every
//! `open_next()` call:
//!
//! 1. The first call asks for any camera, preferring a rear one. This is the
//!    call that triggers the permission prompt, so its errors are reported
//!    as-is (permission denied, no camera).
//! 2. Later calls enumerate devices, try the ones whose orientation is
//!    unknown by requesting them as rear cameras, and otherwise walk the
//!    catalog round-robin, rear cameras first. A device that fails is
//!    demoted and the next one is tried.
//!
//! Streams are always released with a settle delay first: on some phones the
//! browser hangs if a stream is stopped right after a camera switch.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::catalog::DeviceCatalog;
use super::platform::{
    Constraint, DeviceKind, FacingMode, MediaDevices, MediaError, MediaErrorKind, MediaStream,
    VideoConstraints,
};

/// Wait before stopping a stream's tracks. Required on affected devices; do
/// not shorten.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Wait between attempts after the platform reports an abort
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Abort retries per stream request
pub const DEFAULT_RETRIES: u32 = 10;

/// Resolution requested from every camera
pub const IDEAL_WIDTH: u32 = 1920;
pub const IDEAL_HEIGHT: u32 = 1080;

/// Errors surfaced to the scanner UI
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera API not supported")]
    NotSupported,
    #[error("no camera: {0}")]
    NoCamera(#[source] MediaError),
    #[error("camera permission denied: {0}")]
    PermissionDenied(#[source] MediaError),
    #[error("all cameras failed to open")]
    AllDevicesFailed,
    #[error("camera error: {0}")]
    Other(#[source] MediaError),
}

impl CameraError {
    fn from_first_open(err: MediaError) -> Self {
        match err.kind {
            MediaErrorKind::NotAllowed => CameraError::PermissionDenied(err),
            MediaErrorKind::NotFound => CameraError::NoCamera(err),
            _ => CameraError::Other(err),
        }
    }
}

/// Lifecycle of a [`CameraManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// `open_next` has not succeeded yet
    Unopened,
    /// The first acquisition is in flight
    FirstOpening,
    /// Past the first acquisition; calls rotate between devices
    Rotating,
    /// `close` was called and no stream is held
    Closed,
}

/// Holds at most one open camera stream and rotates between devices.
///
/// Calls must be serialized by the caller; `open_next` takes `&mut self`.
pub struct CameraManager<P: MediaDevices> {
    platform: P,
    catalog: DeviceCatalog,
    stream: Option<P::Stream>,
    /// Device behind `stream`, kept after release
    current: Option<String>,
    first_open: bool,
    state: CameraState,
}

impl<P: MediaDevices> CameraManager<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            catalog: DeviceCatalog::new(),
            stream: None,
            current: None,
            first_open: true,
            state: CameraState::Unopened,
        }
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    /// Devices seen so far, classified or not.
    pub fn number_of_devices(&self) -> usize {
        self.catalog.len()
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    /// The currently open stream, if any.
    pub fn stream(&self) -> Option<&P::Stream> {
        self.stream.as_ref()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Release the current stream, if any.
    pub async fn close(&mut self) {
        self.release().await;
        self.state = CameraState::Closed;
    }

    /// Release the current stream and open the next camera.
    pub async fn open_next(&mut self) -> Result<&P::Stream, CameraError> {
        self.release().await;

        if !self.platform.is_supported() {
            return Err(CameraError::NotSupported);
        }

        if self.first_open {
            return self.open_first().await;
        }

        self.state = CameraState::Rotating;
        self.discover().await?;

        // Try unclassified devices as rear cameras
        while let Some(device_id) = self.catalog.get_unknown() {
            match self
                .get_user_media(VideoConstraints::environment_device(&device_id), DEFAULT_RETRIES)
                .await
            {
                Ok(stream) => {
                    self.catalog.push(&device_id, true);
                    info!("Opened rear camera {}", device_id);
                    return Ok(self.hold(stream, device_id));
                }
                Err(e) if e.is_overconstrained() => {
                    debug!("Camera {} is not rear facing", device_id);
                    self.catalog.push(&device_id, false);
                }
                Err(e) => {
                    warn!(
                        "Error while opening rear camera {}: {}. Trying next camera",
                        device_id, e
                    );
                    self.catalog.push(&device_id, true);
                }
            }
        }

        // Round-robin; the device that was open when we were called goes last
        let mut deferred = None;
        for _ in 0..self.catalog.rotation_len() {
            let Some(device_id) = self.catalog.get_next() else {
                break;
            };
            if deferred.is_none()
                && self.catalog.rotation_len() > 1
                && self.current.as_deref() == Some(device_id.as_str())
            {
                deferred = Some(device_id);
                continue;
            }
            if let Some(stream) = self.try_device(&device_id).await {
                return Ok(self.hold(stream, device_id));
            }
        }
        if let Some(device_id) = deferred {
            if let Some(stream) = self.try_device(&device_id).await {
                return Ok(self.hold(stream, device_id));
            }
        }

        warn!("All {} cameras failed to open", self.catalog.len());
        Err(CameraError::AllDevicesFailed)
    }

    /// Request a stream, retrying while the platform reports `Abort`.
    ///
    /// Some Android stacks reject a device that is reopened too quickly, so
    /// aborts get up to `retries` more attempts spaced by [`RETRY_BACKOFF`].
    /// Any other error is returned at once.
    pub async fn get_user_media(
        &self,
        mut constraints: VideoConstraints,
        retries: u32,
    ) -> Result<P::Stream, MediaError> {
        constraints.width = Some(Constraint::Ideal(IDEAL_WIDTH));
        constraints.height = Some(Constraint::Ideal(IDEAL_HEIGHT));

        let mut attempt = 0;
        loop {
            match self.platform.get_user_media(&constraints).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind == MediaErrorKind::Abort && attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Camera request aborted. Waiting {:?} before retry {}/{}",
                        RETRY_BACKOFF, attempt, retries
                    );
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// First acquisition: any camera, rear preferred, no retries.
    async fn open_first(&mut self) -> Result<&P::Stream, CameraError> {
        self.state = CameraState::FirstOpening;

        let stream = match self
            .get_user_media(VideoConstraints::prefer_environment(), 0)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.state = CameraState::Unopened;
                return Err(CameraError::from_first_open(e));
            }
        };

        let settings = stream.settings();
        let Some(device_id) = settings.device_id else {
            // Hold it so it is released with the settle delay like any other
            self.stream = Some(stream);
            self.release().await;
            self.state = CameraState::Unopened;
            return Err(CameraError::Other(MediaError::new(
                MediaErrorKind::Other("TypeError".to_string()),
                "deviceId is undefined",
            )));
        };

        let is_back = settings.facing_mode == Some(FacingMode::Environment);
        self.catalog.push(&device_id, is_back);
        self.first_open = false;
        self.state = CameraState::Rotating;
        info!(
            "Opened camera {} ({})",
            device_id,
            if is_back { "rear" } else { "front" }
        );
        Ok(self.hold(stream, device_id))
    }

    /// Add every video input to the catalog, classified when the platform
    /// reports its orientation.
    async fn discover(&mut self) -> Result<(), CameraError> {
        let devices = self
            .platform
            .enumerate_devices()
            .await
            .map_err(CameraError::Other)?;

        for device in devices.iter().filter(|d| d.kind == DeviceKind::VideoInput) {
            match device.reported_back_facing() {
                Some(is_back) => self.catalog.push(&device.device_id, is_back),
                None => self.catalog.push_unknown(&device.device_id),
            }
        }
        debug!(
            "Discovered {} cameras ({} classified)",
            self.catalog.len(),
            self.catalog.rotation_len()
        );
        Ok(())
    }

    /// Open one catalogued device, reclassifying it from the outcome.
    async fn try_device(&mut self, device_id: &str) -> Option<P::Stream> {
        match self
            .get_user_media(VideoConstraints::device(device_id), DEFAULT_RETRIES)
            .await
        {
            Ok(stream) => {
                let is_back = stream.settings().facing_mode == Some(FacingMode::Environment);
                self.catalog.push(device_id, is_back);
                info!("Opened camera {}", device_id);
                Some(stream)
            }
            Err(e) => {
                warn!(
                    "Error while opening camera {}: {}. Trying next camera",
                    device_id, e
                );
                self.catalog.push(device_id, false);
                None
            }
        }
    }

    fn hold(&mut self, stream: P::Stream, device_id: String) -> &P::Stream {
        self.current = Some(device_id);
        self.stream.insert(stream)
    }

    /// Settle, then stop the held stream. The stream stays held during the
    /// delay so an abandoned call cannot leak it.
    async fn release(&mut self) {
        if self.stream.is_none() {
            return;
        }
        tokio::time::sleep(SETTLE_DELAY).await;
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            debug!("Camera stream released");
        }
    }
}
