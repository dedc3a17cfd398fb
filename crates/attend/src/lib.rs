//! Attend - rotating check-in codes for attendance sessions
//!
//! A presenter shows a QR code that changes every epoch; attendees scan it
//! and the server checks that the code is authentic and fresh. Feature flags
//! control which modules are compiled:
//!
//! - **Core** (always available): code encoding/verification, session config
//! - **`rotation`**: phase-locked timer and the presenter-side code rotation
//! - **`camera`**: device catalog and camera acquisition for the scanner

// Core modules (always compiled)
pub mod code;
pub mod config;

pub use code::{encode, parse, CodeError, CodeVerifier, ParsedCode, Secret, VerifyError};
pub use config::{RedactedString, RotationConfig, VerifierConfig};

// Rotation: phase-locked timer, code rotation orchestrator
#[cfg(feature = "rotation")]
pub mod rotation;

#[cfg(feature = "rotation")]
pub use rotation::{CodeRotation, IssuedCode, PhaseLockedTimer};

// Camera: device catalog, acquisition manager
#[cfg(feature = "camera")]
pub mod camera;

#[cfg(feature = "camera")]
pub use camera::{CameraError, CameraManager, DeviceCatalog};
