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

//! Market domain model for the barkit aggregation engine.
//!
//! Defines the value types flowing through the tick-to-bar pipeline: quote ticks,
//! bars and bar specifications, fixed-point prices, and the pure wall-clock
//! bucket-boundary functions used by time-based aggregation.

pub mod data;
pub mod enums;
pub mod identifiers;
pub mod types;

pub use data::{
    bar::{bar_interval_ns, next_bar_close_ns, time_bar_start, Bar, BarSpecification},
    quote::QuoteTick,
};
pub use enums::{BarResolution, PriceType};
pub use identifiers::Symbol;
pub use types::price::Price;
