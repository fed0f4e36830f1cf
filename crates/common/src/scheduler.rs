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

//! The seam to the external trigger scheduler.
//!
//! The scheduler itself (cron-like trigger creation and firing) lives outside
//! this system; components register and remove triggers through the
//! [`TriggerScheduler`] trait and receive firings back as
//! [`TimeEvent`](crate::timer::TimeEvent) messages.

use std::fmt::{Debug, Display};

use barkit_core::{DurationNanos, UnixNanos};
use chrono::Weekday;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ustr::Ustr;

/// Identifies a registered trigger. Value type with structural equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey(Ustr);

impl TriggerKey {
    /// Creates a new [`TriggerKey`] instance.
    #[must_use]
    pub fn new<T: AsRef<str>>(value: T) -> Self {
        Self(Ustr::from(value.as_ref()))
    }

    /// Returns the inner key value.
    #[must_use]
    pub const fn inner(&self) -> Ustr {
        self.0
    }
}

impl Display for TriggerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TriggerKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// When a trigger should fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerSchedule {
    /// Fires every `interval_ns`, first at `start_ns`.
    Every {
        /// The firing interval in nanoseconds.
        interval_ns: DurationNanos,
        /// The first firing time.
        start_ns: UnixNanos,
    },
    /// Fires once a week at the given UTC day and time.
    Weekly {
        /// The ISO weekday.
        weekday: Weekday,
        /// The UTC hour [0, 23].
        hour: u32,
        /// The UTC minute [0, 59].
        minute: u32,
    },
}

/// A handle to the external job scheduler.
///
/// Both operations report failure via `Err`; callers decide whether a failure
/// is fatal (for the aggregation controller it is logged and absorbed).
pub trait TriggerScheduler: Debug {
    /// Registers a trigger under `key` firing per `schedule`.
    ///
    /// # Errors
    ///
    /// Returns an error if the external scheduler rejects the registration.
    fn create_trigger(&mut self, key: TriggerKey, schedule: TriggerSchedule) -> anyhow::Result<()>;

    /// Removes the trigger registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the external scheduler rejects the removal.
    fn remove_trigger(&mut self, key: &TriggerKey) -> anyhow::Result<()>;
}

/// A recording [`TriggerScheduler`] for deterministic tests.
///
/// Holds the set of currently registered triggers and can be configured to
/// fail creation or removal, for exercising failure paths.
#[derive(Debug, Default)]
pub struct TestScheduler {
    /// The currently registered triggers.
    pub triggers: IndexMap<TriggerKey, TriggerSchedule>,
    /// When `true`, `create_trigger` fails.
    pub fail_create: bool,
    /// When `true`, `remove_trigger` fails.
    pub fail_remove: bool,
}

impl TestScheduler {
    /// Creates a new [`TestScheduler`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a trigger is registered under `key`.
    #[must_use]
    pub fn has_trigger(&self, key: &TriggerKey) -> bool {
        self.triggers.contains_key(key)
    }
}

impl TriggerScheduler for TestScheduler {
    fn create_trigger(&mut self, key: TriggerKey, schedule: TriggerSchedule) -> anyhow::Result<()> {
        if self.fail_create {
            anyhow::bail!("scheduler rejected trigger creation for {key}");
        }
        self.triggers.insert(key, schedule);
        Ok(())
    }

    fn remove_trigger(&mut self, key: &TriggerKey) -> anyhow::Result<()> {
        if self.fail_remove {
            anyhow::bail!("scheduler rejected trigger removal for {key}");
        }
        if self.triggers.shift_remove(key).is_none() {
            anyhow::bail!("no trigger registered for {key}");
        }
        Ok(())
    }
}
