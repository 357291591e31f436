//! Type-safe wrappers for track and timing units
//!
//! Newtypes around f64 so pixel distances, race times and normalized
//! progress are never mixed up across the animation and leaderboard code.

use serde::{Deserialize, Serialize};

/// Round f64 to 2 decimal places for serialized race times
fn round2<S: serde::Serializer>(val: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_to_hundredths(*val))
}

pub(crate) fn round_to_hundredths(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}

/// Distance along a track, in pixels
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Pixels(pub f64);

impl Pixels {
    pub fn is_usable_length(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

/// Seconds (race times)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(#[serde(serialize_with = "round2")] pub f64);

impl Seconds {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self(duration.as_secs_f64())
    }

    /// Race time as stored in a winner record
    pub fn rounded(&self) -> f64 {
        round_to_hundredths(self.0)
    }
}

/// Normalized progress along a track (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Progress(pub f64);

impl Progress {
    /// Create a new progress value, clamping to [0.0, 1.0]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Progress of `position` along a track of `length`
    pub fn along(position: Pixels, length: Pixels) -> Self {
        if !length.is_usable_length() {
            return Self(0.0);
        }
        Self::new(position.0 / length.0)
    }

    pub fn at(&self, length: Pixels) -> Pixels {
        Pixels(self.0 * length.0)
    }
}
