//! Scaling tables
//!
//! A scaling table maps a small integer code read from the payload (for
//! example an M-Bus value information field) to a transform of a raw reading.
//! Plugins supply their own tables; the core only fixes the lookup contract:
//! an unknown code yields [`Scaled::Unscaled`] so that a dimensionless fallback
//! stays distinguishable from a value that was scaled by one.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Outcome of a scaling lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scaled {
    /// The code was known and its transform was applied
    Applied(f64),
    /// The code was unknown; the raw value passes through untouched
    Unscaled(f64),
}

impl Scaled {
    /// The resulting value, scaled or not
    pub fn value(self) -> f64 {
        match self {
            Scaled::Applied(v) | Scaled::Unscaled(v) => v,
        }
    }

    pub fn is_applied(self) -> bool {
        matches!(self, Scaled::Applied(_))
    }

    /// The value only when scaling was applied
    pub fn applied(self) -> Option<f64> {
        match self {
            Scaled::Applied(v) => Some(v),
            Scaled::Unscaled(_) => None,
        }
    }
}

/// Lookup contract for code-driven scaling
pub trait ScalingTable {
    /// Scale `raw` according to `code`
    fn scale(&self, code: u32, raw: f64) -> Scaled;

    /// True if the table knows `code`
    fn knows(&self, code: u32) -> bool {
        self.scale(code, 0.0).is_applied()
    }
}

/// Plugin-supplied closures are scaling tables too
impl<F> ScalingTable for F
where
    F: Fn(u32, f64) -> Option<f64>,
{
    fn scale(&self, code: u32, raw: f64) -> Scaled {
        match self(code, raw) {
            Some(v) => Scaled::Applied(v),
            None => Scaled::Unscaled(raw),
        }
    }
}

/// Decimal exponent table: `raw / 10^k`, with `k` falling as the code rises
///
/// The M-Bus volume VIF range 0x10..=0x15 uses 16 ↦ 10^6, 17 ↦ 10^5 … 21 ↦ 10^1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimalExponentTable {
    /// Codes covered by the table
    pub codes: RangeInclusive<u32>,
    /// Divisor exponent for the first code of the range
    pub first_exponent: u32,
}

impl DecimalExponentTable {
    pub const fn new(codes: RangeInclusive<u32>, first_exponent: u32) -> Self {
        Self {
            codes,
            first_exponent,
        }
    }

    /// Volume VIF codes 16..=21 (m³ with 10^-6 .. 10^-1 resolution)
    pub const fn volume_vif() -> Self {
        Self::new(16..=21, 6)
    }

    /// Divisor exponent for a code, if the table covers it
    pub fn exponent(&self, code: u32) -> Option<u32> {
        if !self.codes.contains(&code) {
            return None;
        }
        self.first_exponent.checked_sub(code - self.codes.start())
    }
}

impl ScalingTable for DecimalExponentTable {
    fn scale(&self, code: u32, raw: f64) -> Scaled {
        match self.exponent(code) {
            Some(k) => Scaled::Applied(raw / 10f64.powi(k as i32)),
            None => {
                log::warn!("Unknown scaling code {}, leaving value {} unscaled", code, raw);
                Scaled::Unscaled(raw)
            }
        }
    }

    fn knows(&self, code: u32) -> bool {
        self.exponent(code).is_some()
    }
}

/// Linear transform `factor * raw + offset`
///
/// Sensor conversions such as pressure and temperature use this shape instead
/// of a code lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTransform {
    pub factor: f64,
    pub offset: f64,
}

impl LinearTransform {
    pub const IDENTITY: LinearTransform = LinearTransform::new(1.0, 0.0);

    pub const fn new(factor: f64, offset: f64) -> Self {
        Self { factor, offset }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        self.offset + self.factor * raw
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 1.0 && self.offset == 0.0
    }
}

impl Default for LinearTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
