use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis points denominator (100% = 10_000 bps).
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Ownership-proportional voting weight, in the property's weight units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Weight(u64);

impl Weight {
    pub const ZERO: Weight = Weight(0);

    /// Largest weight the ledger can persist (SQLite INTEGER is signed 64-bit).
    pub const MAX_STORABLE: Weight = Weight(i64::MAX as u64);

    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    #[must_use]
    pub const fn units(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Weight) -> Option<Weight> {
        self.0.checked_add(other.0).map(Weight)
    }

    #[must_use]
    pub fn saturating_add(self, other: Weight) -> Weight {
        Weight(self.0.saturating_add(other.0))
    }

    /// `ceil(self * bps / 10_000)`.
    ///
    /// Rounds up so a fractional quorum never lets a proposal pass on less
    /// participation than configured.
    #[must_use]
    pub fn fraction_ceil(self, bps: BasisPoints) -> Weight {
        let numerator = u128::from(self.0) * u128::from(bps.value());
        let denominator = u128::from(BPS_DENOMINATOR);
        let quotient = numerator.div_ceil(denominator);
        // bps <= 10_000, so the quotient never exceeds self.
        Weight(quotient as u64)
    }
}

impl Add for Weight {
    type Output = Weight;

    fn add(self, rhs: Weight) -> Weight {
        self.saturating_add(rhs)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Weight {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

// ── Basis points ─────────────────────────────────────────────

/// A fraction expressed in basis points, validated to `1..=10_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct BasisPoints(u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("basis points must be within 1..=10000 (got {0})")]
pub struct BasisPointsError(pub u16);

impl BasisPoints {
    pub const FULL: BasisPoints = BasisPoints(BPS_DENOMINATOR);

    pub fn new(value: u16) -> Result<Self, BasisPointsError> {
        if value == 0 || value > BPS_DENOMINATOR {
            Err(BasisPointsError(value))
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for BasisPoints {
    type Error = BasisPointsError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BasisPoints> for u16 {
    fn from(value: BasisPoints) -> Self {
        value.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
