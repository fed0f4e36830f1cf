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

//! The `TimeEvent` delivered when a scheduled trigger fires.

use std::fmt::Display;

use barkit_core::UnixNanos;
use serde::{Deserialize, Serialize};
use ustr::Ustr;

/// Represents a time event occurring at the event timestamp.
///
/// Delivered back into the system by the external scheduler as an ordinary
/// message, subject to the same sequential per-component processing as ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeEvent {
    /// The event name, identifying the trigger that fired.
    pub name: Ustr,
    /// UNIX timestamp (nanoseconds) when the event occurred (the scheduled firing time).
    pub ts_event: UnixNanos,
    /// UNIX timestamp (nanoseconds) when the event object was created.
    pub ts_init: UnixNanos,
}

impl TimeEvent {
    /// Creates a new [`TimeEvent`] instance.
    #[must_use]
    pub fn new(name: Ustr, ts_event: UnixNanos, ts_init: UnixNanos) -> Self {
        Self {
            name,
            ts_event,
            ts_init,
        }
    }
}

impl Display for TimeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TimeEvent(name={}, ts_event={}, ts_init={})",
            self.name, self.ts_event, self.ts_init
        )
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
    fn test_new_and_display() {
        let event = TimeEvent::new(Ustr::from("BAR-300000000000"), 100.into(), 100.into());
        assert_eq!(
            event.to_string(),
            "TimeEvent(name=BAR-300000000000, ts_event=100, ts_init=100)"
        );
    }
}
