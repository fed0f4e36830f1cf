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

//! A `Bar` aggregate structure, its `BarSpecification`, and the pure wall-clock
//! bucket-boundary functions used by time-based aggregation.

use std::{
    fmt::{Debug, Display, Formatter},
    num::NonZeroU64,
    str::FromStr,
};

use barkit_core::{
    correctness::{check_predicate_true, FAILED},
    DurationNanos, UnixNanos,
};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    enums::{BarResolution, PriceType},
    identifiers::Symbol,
    types::Price,
};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;

const SECONDS_PER_DAY: i64 = 86_400;

/// An error when parsing a [`BarSpecification`] from a string.
#[derive(Debug, Error)]
#[error("error parsing `BarSpecification` from '{input}': {reason}")]
pub struct BarSpecificationParseError {
    input: String,
    reason: String,
}

/// Defines how a bar is constructed: the quote side to sample, the aggregation
/// resolution, and the period as a count of the resolution unit.
///
/// Immutable value type with structural equality, usable as a map key.
#[repr(C)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BarSpecification {
    /// The step count of the resolution unit for each bar period.
    pub step: NonZeroU64,
    /// The aggregation resolution.
    pub resolution: BarResolution,
    /// The quote side sampled from each tick.
    pub price_type: PriceType,
}

impl BarSpecification {
    /// Creates a new [`BarSpecification`] instance with correctness checking.
    ///
    /// # Errors
    ///
    /// Returns an error if `step` is zero.
    pub fn new_checked(
        step: u64,
        resolution: BarResolution,
        price_type: PriceType,
    ) -> anyhow::Result<Self> {
        let step = NonZeroU64::new(step)
            .ok_or_else(|| anyhow::anyhow!("invalid `step` for bar specification, was zero"))?;
        Ok(Self {
            step,
            resolution,
            price_type,
        })
    }

    /// Creates a new [`BarSpecification`] instance.
    ///
    /// # Panics
    ///
    /// Panics if `step` is zero.
    pub fn new(step: u64, resolution: BarResolution, price_type: PriceType) -> Self {
        Self::new_checked(step, resolution, price_type).expect(FAILED)
    }

    /// Returns `true` if bars of this specification close on wall-clock boundaries.
    #[must_use]
    pub const fn is_time_based(&self) -> bool {
        self.resolution.is_time_based()
    }

    /// Returns the wall-clock duration of one bar period in nanoseconds, or
    /// `None` for tick resolution (tick bars have no natural duration).
    #[must_use]
    pub const fn duration_ns(&self) -> Option<DurationNanos> {
        let unit = match self.resolution {
            BarResolution::Tick => return None,
            BarResolution::Second => NANOS_PER_SECOND,
            BarResolution::Minute => NANOS_PER_MINUTE,
            BarResolution::Hour => NANOS_PER_HOUR,
            BarResolution::Day => NANOS_PER_DAY,
        };
        Some(self.step.get() * unit)
    }
}

impl Display for BarSpecification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.step, self.resolution, self.price_type)
    }
}

impl FromStr for BarSpecification {
    type Err = BarSpecificationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: &str| BarSpecificationParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = s.splitn(3, '-');
        let step = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(|| error("invalid step"))?;
        let resolution = parts
            .next()
            .and_then(|p| BarResolution::from_str(p).ok())
            .ok_or_else(|| error("invalid resolution"))?;
        let price_type = parts
            .next()
            .and_then(|p| PriceType::from_str(p).ok())
            .ok_or_else(|| error("invalid price type"))?;

        Self::new_checked(step, resolution, price_type).map_err(|e| error(&e.to_string()))
    }
}

impl From<&str> for BarSpecification {
    /// # Panics
    ///
    /// Panics if `value` is not a valid bar specification string.
    fn from(value: &str) -> Self {
        Self::from_str(value).expect(FAILED)
    }
}

/// Returns the wall-clock interval of one bar period in nanoseconds.
///
/// # Panics
///
/// Panics if `spec` has tick resolution, which has no wall-clock interval.
/// This is unreachable under correct subscription setup.
#[must_use]
pub fn bar_interval_ns(spec: &BarSpecification) -> DurationNanos {
    spec.duration_ns()
        .unwrap_or_else(|| panic!("no wall-clock interval for tick bar specification {spec}"))
}

/// Returns the UTC start of the bar period containing the given datetime.
///
/// Floors to the calendar grid at the specification's resolution using
/// `floor(component / step) * step` on the relevant component, zeroing all
/// finer-grained components. Day resolution floors whole days since the UNIX
/// epoch to the step grid. Pure function of `(now, spec)`.
///
/// # Panics
///
/// Panics if `spec` has tick resolution.
#[must_use]
pub fn time_bar_start(now: DateTime<Utc>, spec: &BarSpecification) -> DateTime<Utc> {
    let step = spec.step.get();

    match spec.resolution {
        BarResolution::Tick => {
            panic!("no wall-clock boundary for tick bar specification {spec}")
        }
        BarResolution::Second => {
            let second = u64::from(now.second()) / step * step;
            now.with_second(second as u32)
                .expect(FAILED)
                .with_nanosecond(0)
                .expect(FAILED)
        }
        BarResolution::Minute => {
            let minute = u64::from(now.minute()) / step * step;
            now.with_minute(minute as u32)
                .expect(FAILED)
                .with_second(0)
                .expect(FAILED)
                .with_nanosecond(0)
                .expect(FAILED)
        }
        BarResolution::Hour => {
            let hour = u64::from(now.hour()) / step * step;
            now.with_hour(hour as u32)
                .expect(FAILED)
                .with_minute(0)
                .expect(FAILED)
                .with_second(0)
                .expect(FAILED)
                .with_nanosecond(0)
                .expect(FAILED)
        }
        BarResolution::Day => {
            let days = now.timestamp().div_euclid(SECONDS_PER_DAY) as u64;
            let floored = days / step * step;
            DateTime::from_timestamp(floored as i64 * SECONDS_PER_DAY, 0).expect(FAILED)
        }
    }
}

/// Returns the close timestamp of the bar period containing `ts`: the floored
/// period start plus one interval.
///
/// A tick with timestamp greater than or equal to this boundary belongs to a
/// subsequent period.
///
/// # Panics
///
/// Panics if `spec` has tick resolution.
#[must_use]
pub fn next_bar_close_ns(ts: UnixNanos, spec: &BarSpecification) -> UnixNanos {
    UnixNanos::from(time_bar_start(ts.to_datetime_utc(), spec)) + bar_interval_ns(spec)
}

/// Represents an aggregated OHLCV bar, closed at a specific timestamp.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bar {
    /// The instrument symbol.
    pub symbol: Symbol,
    /// The specification the bar was aggregated under.
    pub spec: BarSpecification,
    /// The bars open price.
    pub open: Price,
    /// The bars high price.
    pub high: Price,
    /// The bars low price.
    pub low: Price,
    /// The bars close price.
    pub close: Price,
    /// The number of ticks aggregated into the bar.
    pub volume: u64,
    /// UNIX timestamp (nanoseconds) when the bar closed.
    pub ts_close: UnixNanos,
}

impl Bar {
    /// Creates a new [`Bar`] instance with correctness checking.
    ///
    /// # Errors
    ///
    /// Returns an error if the OHLC values are inconsistent
    /// (`high` must be the maximum and `low` the minimum of the four prices).
    #[allow(clippy::too_many_arguments)]
    pub fn new_checked(
        symbol: Symbol,
        spec: BarSpecification,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: u64,
        ts_close: UnixNanos,
    ) -> anyhow::Result<Self> {
        check_predicate_true(high >= open, "high >= open")?;
        check_predicate_true(high >= close, "high >= close")?;
        check_predicate_true(low <= open, "low <= open")?;
        check_predicate_true(low <= close, "low <= close")?;
        check_predicate_true(high >= low, "high >= low")?;
        Ok(Self {
            symbol,
            spec,
            open,
            high,
            low,
            close,
            volume,
            ts_close,
        })
    }

    /// Creates a new [`Bar`] instance.
    ///
    /// # Panics
    ///
    /// Panics if the OHLC values are inconsistent.
    /// See [`Bar::new_checked`] for more details.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        spec: BarSpecification,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: u64,
        ts_close: UnixNanos,
    ) -> Self {
        Self::new_checked(symbol, spec, open, high, low, close, volume, ts_close).expect(FAILED)
    }
}

impl Display for Bar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{},{},{},{},{},{},{}",
            self.symbol,
            self.spec,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.ts_close
        )
    }
}
