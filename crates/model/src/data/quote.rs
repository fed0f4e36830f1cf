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

//! A `QuoteTick` data type representing a top-of-book bid/ask update.

use std::fmt::Display;

use barkit_core::{
    correctness::{check_equal_u8, FAILED},
    UnixNanos,
};
use serde::{Deserialize, Serialize};

use crate::{enums::PriceType, identifiers::Symbol, types::Price};

/// Represents a single bid/ask quote update for an instrument at a point in time.
///
/// Ticks are assumed to arrive in non-decreasing `ts_event` order per symbol;
/// the model does not re-sort them.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteTick {
    /// The instrument symbol.
    pub symbol: Symbol,
    /// The top-of-book bid price.
    pub bid: Price,
    /// The top-of-book ask price.
    pub ask: Price,
    /// UNIX timestamp (nanoseconds) when the quote event occurred.
    pub ts_event: UnixNanos,
}

impl QuoteTick {
    /// Creates a new [`QuoteTick`] instance with correctness checking.
    ///
    /// # Errors
    ///
    /// Returns an error if `bid.precision` does not equal `ask.precision`.
    pub fn new_checked(
        symbol: Symbol,
        bid: Price,
        ask: Price,
        ts_event: UnixNanos,
    ) -> anyhow::Result<Self> {
        check_equal_u8(bid.precision, ask.precision, "bid.precision", "ask.precision")?;
        Ok(Self {
            symbol,
            bid,
            ask,
            ts_event,
        })
    }

    /// Creates a new [`QuoteTick`] instance.
    ///
    /// # Panics
    ///
    /// Panics if `bid.precision` does not equal `ask.precision`.
    pub fn new(symbol: Symbol, bid: Price, ask: Price, ts_event: UnixNanos) -> Self {
        Self::new_checked(symbol, bid, ask, ts_event).expect(FAILED)
    }

    /// Returns the [`Price`] for this quote depending on the given `price_type`.
    ///
    /// The mid price is the arithmetic mean of bid and ask, rounded at the
    /// instrument's decimal precision.
    #[must_use]
    pub fn extract_price(&self, price_type: PriceType) -> Price {
        match price_type {
            PriceType::Bid => self.bid,
            PriceType::Ask => self.ask,
            PriceType::Mid => Price::new(
                (self.bid.as_f64() + self.ask.as_f64()) / 2.0,
                self.bid.precision,
            ),
        }
    }

    /// Returns the bid/ask spread for this quote (`ask - bid`).
    ///
    /// Negative for a crossed market.
    #[must_use]
    pub fn spread(&self) -> Price {
        self.ask - self.bid
    }
}

impl Display for QuoteTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.symbol, self.bid, self.ask, self.ts_event)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn audusd_quote() -> QuoteTick {
        QuoteTick::new(
            Symbol::from("AUD/USD"),
            Price::from("0.80000"),
            Price::from("0.80005"),
            UnixNanos::from(1_000),
        )
    }

    #[rstest]
    fn test_new_checked_rejects_mismatched_precision() {
        let result = QuoteTick::new_checked(
            Symbol::from("AUD/USD"),
            Price::from("0.80000"),
            Price::from("0.801"),
            UnixNanos::default(),
        );
        assert!(result.is_err());
    }

    #[rstest]
    #[case(PriceType::Bid, "0.80000")]
    #[case(PriceType::Ask, "0.80005")]
    #[case(PriceType::Mid, "0.80003")]
    fn test_extract_price(#[case] price_type: PriceType, #[case] expected: &str) {
        let quote = audusd_quote();
        assert_eq!(quote.extract_price(price_type), Price::from(expected));
    }

    #[rstest]
    fn test_spread() {
        assert_eq!(audusd_quote().spread(), Price::from("0.00005"));
    }

    #[rstest]
    fn test_crossed_market_spread_is_negative() {
        let quote = QuoteTick::new(
            Symbol::from("AUD/USD"),
            Price::from("0.80005"),
            Price::from("0.80000"),
            UnixNanos::default(),
        );
        assert!(!quote.spread().is_positive());
    }

    #[rstest]
    fn test_display() {
        assert_eq!(audusd_quote().to_string(), "AUD/USD,0.80000,0.80005,1000");
    }
}
