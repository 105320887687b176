//! Output timeline maths.
//!
//! Output frame times are derived from the frame index with rational
//! arithmetic, so slot `i` always lands on `round(i * 1e6 / fps)` microseconds
//! with no accumulated floating-point drift.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// A point on the output timeline in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Zero time constant.
    pub const ZERO: Self = Self(0);

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Create a timestamp from (possibly fractional) milliseconds, rounded.
    #[inline]
    pub fn from_millis_f64(millis: f64) -> Self {
        Self((millis * 1000.0).round() as i64)
    }

    #[inline]
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    #[inline]
    pub fn as_seconds_f64(self) -> f64 {
        self.0 as f64 / MICROS_PER_SECOND as f64
    }
}

impl Add for Timestamp {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Timestamp {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_seconds_f64())
    }
}

/// Frame rate as a rational number (e.g., 30000/1001 for 29.97 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 30000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// A zero numerator or denominator is not a usable rate.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Duration of a single frame in milliseconds.
    #[inline]
    pub fn frame_interval_ms(self) -> f64 {
        1000.0 * self.denominator as f64 / self.numerator as f64
    }

    /// Presentation time of output frame `index`, rounded to the microsecond.
    pub fn frame_time(self, index: u64) -> Timestamp {
        let exact = Rational64::new(
            index as i64 * self.denominator as i64 * MICROS_PER_SECOND,
            self.numerator as i64,
        );
        Timestamp(exact.round().to_integer())
    }

    /// Number of whole-or-partial frames needed to cover `duration_ms`.
    pub fn frames_covering(self, duration_ms: f64) -> u64 {
        if duration_ms <= 0.0 {
            return 0;
        }
        (duration_ms / self.frame_interval_ms()).ceil() as u64
    }

    /// Common frame rates
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
