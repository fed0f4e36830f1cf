// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! A `UnixNanos` type for working with timestamps in nanoseconds since the UNIX epoch.
//!
//! Arithmetic operations panic on overflow/underflow rather than wrapping, and
//! negative timestamps are unrepresentable.

use std::{
    fmt::Display,
    ops::{Add, AddAssign, Deref, Sub, SubAssign},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a duration in nanoseconds.
pub type DurationNanos = u64;

/// Represents a timestamp in nanoseconds since the UNIX epoch.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UnixNanos(u64);

impl UnixNanos {
    /// Creates a new [`UnixNanos`] instance.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns `true` if the value of this instance is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the underlying value as `u64`.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the underlying value as `i64`.
    ///
    /// # Panics
    ///
    /// Panics if the value exceeds `i64::MAX` (approximately year 2262).
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        assert!(self.0 <= i64::MAX as u64, "UnixNanos value exceeds i64::MAX");
        self.0 as i64
    }

    /// Returns the underlying value as `f64`.
    #[must_use]
    pub const fn as_f64(&self) -> f64 {
        self.0 as f64
    }

    /// Converts the underlying value to a datetime (UTC).
    ///
    /// # Panics
    ///
    /// Panics if the value exceeds `i64::MAX`.
    #[must_use]
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.as_i64())
    }

    /// Returns the RFC 3339 representation of this timestamp.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime_utc().to_rfc3339()
    }

}

impl Deref for UnixNanos {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u64> for UnixNanos {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<UnixNanos> for u64 {
    fn from(value: UnixNanos) -> Self {
        value.0
    }
}

impl From<DateTime<Utc>> for UnixNanos {
    /// # Panics
    ///
    /// Panics if the datetime is before the UNIX epoch or past the
    /// nanosecond-representable range.
    fn from(value: DateTime<Utc>) -> Self {
        let nanos = value
            .timestamp_nanos_opt()
            .expect("datetime outside nanosecond-representable range");
        assert!(nanos >= 0, "datetime was before the UNIX epoch");
        Self(nanos as u64)
    }
}

impl FromStr for UnixNanos {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl PartialEq<u64> for UnixNanos {
    fn eq(&self, other: &u64) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<u64> for UnixNanos {
    fn partial_cmp(&self, other: &u64) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

impl Add<DurationNanos> for UnixNanos {
    type Output = Self;

    fn add(self, rhs: DurationNanos) -> Self::Output {
        Self(self.0.checked_add(rhs).expect("overflow adding to `UnixNanos`"))
    }
}

impl Sub<DurationNanos> for UnixNanos {
    type Output = Self;

    fn sub(self, rhs: DurationNanos) -> Self::Output {
        Self(
            self.0
                .checked_sub(rhs)
                .expect("underflow subtracting from `UnixNanos`"),
        )
    }
}

impl Add for UnixNanos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.checked_add(rhs.0).expect("overflow adding `UnixNanos`"))
    }
}

impl Sub for UnixNanos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.checked_sub(rhs.0).expect("underflow subtracting `UnixNanos`"))
    }
}

impl AddAssign<DurationNanos> for UnixNanos {
    fn add_assign(&mut self, rhs: DurationNanos) {
        *self = *self + rhs;
    }
}

impl SubAssign<DurationNanos> for UnixNanos {
    fn sub_assign(&mut self, rhs: DurationNanos) {
        *self = *self - rhs;
    }
}

impl Display for UnixNanos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_new_and_accessors() {
        let nanos = UnixNanos::new(123);
        assert_eq!(nanos.as_u64(), 123);
        assert_eq!(nanos.as_i64(), 123);
        assert!(!nanos.is_zero());
        assert!(UnixNanos::default().is_zero());
    }

    #[rstest]
    fn test_add_and_sub_duration() {
        let nanos = UnixNanos::from(1_000);
        assert_eq!(nanos + 500, UnixNanos::from(1_500));
        assert_eq!(nanos - 500, UnixNanos::from(500));
    }

    #[rstest]
    #[should_panic(expected = "underflow")]
    fn test_sub_underflow_panics() {
        let _ = UnixNanos::from(100) - 200;
    }

    #[rstest]
    fn test_datetime_round_trip() {
        let dt = DateTime::parse_from_rfc3339("2024-02-01T00:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let nanos = UnixNanos::from(dt);
        assert_eq!(nanos.to_datetime_utc(), dt);
    }

    #[rstest]
    fn test_comparison_with_u64() {
        let nanos = UnixNanos::from(1_000);
        assert_eq!(nanos, 1_000);
        assert!(nanos > 999);
        assert!(nanos < 1_001);
    }

    #[rstest]
    fn test_serde_round_trip() {
        let nanos = UnixNanos::from(123_456_789);
        let json = serde_json::to_string(&nanos).unwrap();
        let deserialized: UnixNanos = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, nanos);
    }
}
