// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;
use std::ops::{Add, Sub};

/// Remaining compute units available to an `Instance`. Newtype so that gas
/// values don't get accidentally mixed up with byte counts or ordinates, the
/// way `fvm::gas::GasTracker` keeps gas separate from everything else it
/// tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Gas(u64);

impl Gas {
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Subtract `charge` from `self`, saturating at zero rather than
    /// underflowing (mirrors `GasTracker::charge_gas`'s "clamp to available"
    /// behaviour on overflow/underflow).
    pub fn saturating_sub(&self, charge: Gas) -> Gas {
        Gas(self.0.saturating_sub(charge.0))
    }
}

impl Add for Gas {
    type Output = Gas;
    fn add(self, rhs: Gas) -> Gas {
        Gas(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Gas {
    type Output = Gas;
    fn sub(self, rhs: Gas) -> Gas {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for Gas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Gas {
    fn from(v: u64) -> Self {
        Gas(v)
    }
}
