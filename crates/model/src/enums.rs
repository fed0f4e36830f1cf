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

//! Defines enumerations for the market domain model.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, FromRepr};

/// The quote side used when extracting a price from a quote tick.
#[repr(C)]
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    AsRefStr,
    FromRepr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    /// A quoted order price where a buyer is willing to buy a quantity of an instrument.
    Bid = 1,
    /// A quoted order price where a seller is willing to sell a quantity of an instrument.
    Ask = 2,
    /// The midpoint between the bid and ask prices.
    Mid = 3,
}

/// The resolution at which bars are aggregated from ticks.
#[repr(C)]
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    AsRefStr,
    FromRepr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BarResolution {
    /// Based on a number of ticks (no natural wall-clock boundary).
    Tick = 1,
    /// Based on time intervals with second granularity.
    Second = 2,
    /// Based on time intervals with minute granularity.
    Minute = 3,
    /// Based on time intervals with hour granularity.
    Hour = 4,
    /// Based on time intervals with day granularity.
    Day = 5,
}

impl BarResolution {
    /// Returns `true` if bars at this resolution close on wall-clock boundaries.
    #[must_use]
    pub const fn is_time_based(&self) -> bool {
        !matches!(self, Self::Tick)
    }
}
