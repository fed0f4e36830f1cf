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

//! Events emitted by the aggregation machinery.
//!
//! Delivery and transport are the hosting runtime's concern; these are plain
//! serializable value types posted to registered handlers.

use std::fmt::Display;

use barkit_core::UnixNanos;
use barkit_model::{Bar, BarSpecification, QuoteTick, Symbol};
use serde::{Deserialize, Serialize};

/// Emitted when an aggregator closes a bar.
///
/// Consumed downstream by signal models, risk, and persistence subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarClosed {
    /// The closed bar.
    pub bar: Bar,
    /// The last tick incorporated before the close.
    pub last_tick: QuoteTick,
    /// The average bid/ask spread over the closed period.
    pub average_spread: f64,
}

impl BarClosed {
    /// Returns the instrument symbol for the closed bar.
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.bar.symbol
    }

    /// Returns the specification the bar was aggregated under.
    #[must_use]
    pub const fn spec(&self) -> BarSpecification {
        self.bar.spec
    }
}

impl Display for BarClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BarClosed({}, average_spread={})",
            self.bar, self.average_spread
        )
    }
}

/// Broadcast to all aggregators when the market session opens or closes.
///
/// Advisory: aggregators record the flag but are not required to gate on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketStatus {
    /// Whether the market is open.
    pub is_open: bool,
    /// UNIX timestamp (nanoseconds) when the status changed.
    pub ts_event: UnixNanos,
}

impl Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MarketStatus(is_open={}, ts_event={})",
            self.is_open, self.ts_event
        )
    }
}
