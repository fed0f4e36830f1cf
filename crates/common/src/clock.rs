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

//! Real-time and static test `Clock` implementations.

use std::fmt::Debug;

use barkit_core::UnixNanos;
use chrono::{DateTime, Utc};

/// Represents a type of clock.
pub trait Clock: Debug {
    /// Returns the current UNIX timestamp in nanoseconds (ns).
    fn timestamp_ns(&self) -> UnixNanos;

    /// Returns the current date and time as a timezone-aware `DateTime<Utc>`.
    fn utc_now(&self) -> DateTime<Utc> {
        self.timestamp_ns().to_datetime_utc()
    }
}

/// A static test clock.
///
/// Stores the current timestamp internally which can be advanced for
/// deterministic testing.
#[derive(Debug, Default)]
pub struct TestClock {
    time: UnixNanos,
}

impl TestClock {
    /// Creates a new [`TestClock`] instance at the UNIX epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock to the given time.
    pub fn set_time(&mut self, to_time_ns: UnixNanos) {
        self.time = to_time_ns;
    }

    /// Advances the clock to the given time.
    ///
    /// # Panics
    ///
    /// Panics if `to_time_ns` is before the current clock time.
    pub fn advance_time(&mut self, to_time_ns: UnixNanos) {
        assert!(
            to_time_ns >= self.time,
            "`to_time_ns` {to_time_ns} was < `self.time` {}",
            self.time
        );
        self.time = to_time_ns;
    }
}

impl Clock for TestClock {
    fn timestamp_ns(&self) -> UnixNanos {
        self.time
    }
}

/// A real-time clock which uses system time.
///
/// Timestamps are guaranteed to be unique and monotonically increasing.
#[derive(Debug, Default)]
pub struct LiveClock {
    last: std::cell::Cell<u64>,
}

impl LiveClock {
    /// Creates a new [`LiveClock`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for LiveClock {
    fn timestamp_ns(&self) -> UnixNanos {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .expect("system time outside nanosecond-representable range") as u64;
        let unique = now.max(self.last.get() + 1);
        self.last.set(unique);
        UnixNanos::from(unique)
    }
}
