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

//! Tick-to-bar aggregation machinery for the barkit engine.
//!
//! Ingests a stream of bid/ask quote ticks and deterministically produces OHLCV
//! bars at configurable tick-count or wall-clock resolutions, while tracking
//! bid/ask spread statistics per aggregation period.
//!
//! Each per-symbol aggregator is a single-threaded, message-driven component:
//! all state mutation happens strictly sequentially in the order ticks and
//! control commands are delivered to it. Aggregators for different symbols
//! share no mutable state and may run on independent execution contexts.

pub mod aggregation;
pub mod controller;
pub mod events;

pub use aggregation::{BarBuilder, SpreadAnalyzer, SpreadFloor, SymbolBarAggregator};
pub use controller::{BarAggregationController, MarketSchedule, WeeklyTime};
pub use events::{BarClosed, MarketStatus};
