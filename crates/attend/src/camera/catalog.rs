//! Ordered catalog of observed cameras
//!
//! Devices live in one of three buckets: `unknown` (not yet classified),
//! `back` and `front`. Rotation walks a virtual list `[back..., front...]`
//! with a cursor, so rear cameras are always tried first:
//!
//! ```text
//!   index:   0      1      2      3
//!          ┌──────┬──────┬──────┬──────┐
//!          │ B0   │ B1   │ F0   │ F1   │   unknown: [U0, U1]
//!          └──────┴──────┴──────┴──────┘
//!                   ^ next_id
//! ```
//!
//! Reclassifying a device (e.g. unknown → back once opened) keeps the cursor
//! on the device it pointed at, so a live rotation does not jump.

use serde::{Deserialize, Serialize};

/// Where a device currently sits in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Back,
    Front,
    Unknown,
}

/// Catalog of camera device ids with a round-robin cursor.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    unknown: Vec<String>,
    back: Vec<String>,
    front: Vec<String>,
    /// Index into `[back..., front...]`
    next_id: usize,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of devices, classified or not.
    pub fn len(&self) -> usize {
        self.unknown.len() + self.back.len() + self.front.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of devices the rotation cursor walks over.
    pub fn rotation_len(&self) -> usize {
        self.back.len() + self.front.len()
    }

    /// Current bucket of `device_id`, if known.
    pub fn facing(&self, device_id: &str) -> Option<Facing> {
        if self.back.iter().any(|d| d == device_id) {
            Some(Facing::Back)
        } else if self.front.iter().any(|d| d == device_id) {
            Some(Facing::Front)
        } else if self.unknown.iter().any(|d| d == device_id) {
            Some(Facing::Unknown)
        } else {
            None
        }
    }

    /// Record a device whose orientation is not known yet.
    ///
    /// Ignored if the device is already in any bucket.
    pub fn push_unknown(&mut self, device_id: &str) {
        if self.facing(device_id).is_some() {
            return;
        }
        self.unknown.push(device_id.to_string());
    }

    /// Classify a device as rear (`is_back`) or front facing.
    ///
    /// No-op if it is already in the right bucket. Otherwise the device moves
    /// there, and the cursor keeps pointing at the same device as before.
    pub fn push(&mut self, device_id: &str, is_back: bool) {
        let target = if is_back { Facing::Back } else { Facing::Front };
        if self.facing(device_id) == Some(target) {
            return;
        }

        self.remove(device_id);

        if is_back {
            let i = self.back.len().min(self.next_id);
            self.back.insert(i, device_id.to_string());
            // Inserted at or before the cursor
            self.next_id += 1;
        } else if self.next_id < self.back.len() {
            // Cursor is in the back region; append after everything
            self.front.push(device_id.to_string());
        } else {
            let i = self.next_id - self.back.len();
            self.front.insert(i, device_id.to_string());
            self.next_id += 1;
        }

        self.normalize();
    }

    /// Whether any device still awaits classification.
    pub fn has_unknown(&self) -> bool {
        !self.unknown.is_empty()
    }

    /// Take the most recently discovered unclassified device.
    pub fn get_unknown(&mut self) -> Option<String> {
        self.unknown.pop()
    }

    /// Device under the cursor; advances the cursor round-robin.
    pub fn get_next(&mut self) -> Option<String> {
        let total = self.rotation_len();
        if total == 0 {
            return None;
        }

        let device = if self.next_id < self.back.len() {
            self.back[self.next_id].clone()
        } else {
            self.front[self.next_id - self.back.len()].clone()
        };
        self.next_id = (self.next_id + 1) % total;
        Some(device)
    }

    /// Remove `device_id` from its bucket, pulling the cursor back if the
    /// removed slot was before it.
    fn remove(&mut self, device_id: &str) {
        if let Some(i) = self.unknown.iter().position(|d| d == device_id) {
            self.unknown.remove(i);
        }
        if let Some(i) = self.back.iter().position(|d| d == device_id) {
            self.back.remove(i);
            if self.next_id > i {
                self.next_id -= 1;
            }
        }
        if let Some(i) = self.front.iter().position(|d| d == device_id) {
            self.front.remove(i);
            if self.next_id > self.back.len() + i {
                self.next_id -= 1;
            }
        }
    }

    fn normalize(&mut self) {
        let total = self.rotation_len();
        self.next_id = if total == 0 { 0 } else { self.next_id % total };
    }
}
