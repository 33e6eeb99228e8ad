//! # Fixed-Point Scores
//!
//! Confidence, legal-validity and compatibility values all live in `[0, 1]`.
//! They are stored as basis points (`0..=10000`) so that records containing
//! them can be canonicalized and hashed, and so that threshold comparisons
//! are exact.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A value in `[0, 1]` with four decimal places of precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Score(u16);

impl Score {
    /// Basis points per unit.
    pub const SCALE: u16 = 10_000;
    /// `0.0`
    pub const ZERO: Score = Score(0);
    /// `1.0`
    pub const ONE: Score = Score(Self::SCALE);

    /// Convert from a float, clamping to `[0, 1]` and rounding to the nearest
    /// basis point. `NaN` maps to zero.
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        let clamped = value.clamp(0.0, 1.0);
        Self((clamped * f64::from(Self::SCALE)).round() as u16)
    }

    /// Construct from raw basis points.
    pub fn from_basis_points(bp: u16) -> Result<Self, ValidationError> {
        if bp > Self::SCALE {
            return Err(ValidationError::ScoreOutOfRange {
                basis_points: u32::from(bp),
            });
        }
        Ok(Self(bp))
    }

    /// Compile-time constructor; values above the scale saturate at `1.0`.
    pub const fn saturating_from_basis_points(bp: u16) -> Self {
        if bp > Self::SCALE {
            Self(Self::SCALE)
        } else {
            Self(bp)
        }
    }

    /// Raw basis points.
    pub fn basis_points(self) -> u16 {
        self.0
    }

    /// The value as a float in `[0, 1]`.
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / f64::from(Self::SCALE)
    }

    /// Arithmetic mean of a set of scores, or `None` for an empty set.
    pub fn mean(scores: impl IntoIterator<Item = Score>) -> Option<Score> {
        let (sum, n) = scores
            .into_iter()
            .fold((0u64, 0u64), |(s, n), x| (s + u64::from(x.0), n + 1));
        if n == 0 {
            return None;
        }
        Some(Self(((sum + n / 2) / n) as u16))
    }
}

impl TryFrom<u16> for Score {
    type Error = ValidationError;
    fn try_from(bp: u16) -> Result<Self, Self::Error> {
        Self::from_basis_points(bp)
    }
}

impl From<Score> for u16 {
    fn from(s: Score) -> Self {
        s.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.as_f64())
    }
}
