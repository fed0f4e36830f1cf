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

//! Bar aggregation machinery.
//!
//! Defines the `BarBuilder` and `SpreadAnalyzer` accumulators and the
//! per-symbol `SymbolBarAggregator` which routes incoming quote ticks to all
//! subscribed bar specifications and emits closed-bar events.

use std::fmt::Debug;

use barkit_core::{
    correctness::{check_positive_f64, FAILED},
    DurationNanos, UnixNanos,
};
use barkit_model::{
    data::bar::next_bar_close_ns, Bar, BarSpecification, Price, QuoteTick, Symbol,
};
use indexmap::IndexMap;

use crate::events::{BarClosed, MarketStatus};

/// Provides a generic bar builder for aggregation.
///
/// Accumulates OHLCV state for a single open bar; a replacement period begins
/// when the builder is reset on build.
#[derive(Debug)]
pub struct BarBuilder {
    symbol: Symbol,
    spec: BarSpecification,
    initialized: bool,
    ts_last: UnixNanos,
    count: u64,
    open: Option<Price>,
    high: Option<Price>,
    low: Option<Price>,
    close: Option<Price>,
}

impl BarBuilder {
    /// Creates a new [`BarBuilder`] instance in the uninitialized state.
    #[must_use]
    pub fn new(symbol: Symbol, spec: BarSpecification) -> Self {
        Self {
            symbol,
            spec,
            initialized: false,
            ts_last: UnixNanos::default(),
            count: 0,
            open: None,
            high: None,
            low: None,
            close: None,
        }
    }

    /// Returns `true` if at least one price has been applied.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns the number of updates applied to the current bar.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Updates the builder state with the given price and timestamp.
    ///
    /// Updates with a timestamp earlier than the last applied update are
    /// ignored (ticks are assumed non-decreasing per symbol).
    pub fn update(&mut self, price: Price, ts_event: UnixNanos) {
        if ts_event < self.ts_last {
            return; // Not applicable
        }

        match self.open {
            None => {
                self.open = Some(price);
                self.high = Some(price);
                self.low = Some(price);
                self.initialized = true;
            }
            Some(_) => {
                if Some(price) > self.high {
                    self.high = Some(price);
                }
                if Some(price) < self.low {
                    self.low = Some(price);
                }
            }
        }

        self.close = Some(price);
        self.count += 1;
        self.ts_last = ts_event;
    }

    /// Returns the aggregated bar closed at the given timestamp, then resets
    /// the builder for the next period.
    ///
    /// The close timestamp is caller-supplied because it is
    /// aggregation-strategy-specific: the triggering tick's timestamp for
    /// tick-count close, or the aligned wall-clock boundary for time close.
    ///
    /// # Panics
    ///
    /// Panics if no price has been applied. Callers must guard on
    /// [`BarBuilder::is_initialized`]; building with no updates is a
    /// programmer error.
    pub fn build(&mut self, ts_close: UnixNanos) -> Bar {
        let open = self.open.expect("no `open` price: builder was not initialized");
        let high = self.high.expect("no `high` price: builder was not initialized");
        let low = self.low.expect("no `low` price: builder was not initialized");
        let close = self.close.expect("no `close` price: builder was not initialized");

        let bar = Bar::new(
            self.symbol,
            self.spec,
            open,
            high,
            low,
            close,
            self.count,
            ts_close,
        );

        self.reset();
        bar
    }

    /// Resets all stateful fields to their initial value.
    fn reset(&mut self) {
        self.initialized = false;
        self.count = 0;
        self.open = None;
        self.high = None;
        self.low = None;
        self.close = None;
    }
}

/// The floor applied to a period's average spread on bar close.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpreadFloor {
    /// The average spread is clamped to be at least the instrument's tick size.
    #[default]
    TickSize,
    /// The average spread is clamped to be at least zero.
    Zero,
}

/// Tracks bid/ask spread statistics across bar periods for a single instrument.
///
/// Long-lived across many bar periods: extrema and the negative-spread log
/// cover the full history, while the sample buffer holds the current period.
#[derive(Debug)]
pub struct SpreadAnalyzer {
    tick_size: Price,
    floor: SpreadFloor,
    bid: Option<Price>,
    ask: Option<Price>,
    spreads: Vec<f64>,
    average_spread: f64,
    max_spread: Option<(UnixNanos, f64)>,
    min_spread: Option<(UnixNanos, f64)>,
    negative_spreads: Vec<(UnixNanos, f64)>,
    average_history: Vec<(UnixNanos, f64)>,
}

impl SpreadAnalyzer {
    /// Creates a new [`SpreadAnalyzer`] instance with correctness checking.
    ///
    /// # Errors
    ///
    /// Returns an error if `tick_size` is not positive.
    pub fn new_checked(tick_size: Price, floor: SpreadFloor) -> anyhow::Result<Self> {
        check_positive_f64(tick_size.as_f64(), "tick_size")?;
        Ok(Self {
            tick_size,
            floor,
            bid: None,
            ask: None,
            spreads: Vec::new(),
            average_spread: 0.0,
            max_spread: None,
            min_spread: None,
            negative_spreads: Vec::new(),
            average_history: Vec::new(),
        })
    }

    /// Creates a new [`SpreadAnalyzer`] instance.
    ///
    /// # Panics
    ///
    /// Panics if `tick_size` is not positive.
    pub fn new(tick_size: Price, floor: SpreadFloor) -> Self {
        Self::new_checked(tick_size, floor).expect(FAILED)
    }

    /// Returns the current spread (`ask - bid`), or `None` before any quote.
    #[must_use]
    pub fn current_spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((ask - bid).as_f64()),
            _ => None,
        }
    }

    /// Returns the most recently computed average spread.
    ///
    /// Before the first bar close this is the running average of the
    /// in-progress period; afterwards it is the last closed period's average.
    #[must_use]
    pub const fn average_spread(&self) -> f64 {
        self.average_spread
    }

    /// Returns the maximum spread ever observed, with its timestamp.
    #[must_use]
    pub const fn max_spread(&self) -> Option<(UnixNanos, f64)> {
        self.max_spread
    }

    /// Returns the minimum spread ever observed, with its timestamp.
    #[must_use]
    pub const fn min_spread(&self) -> Option<(UnixNanos, f64)> {
        self.min_spread
    }

    /// Returns the timestamped log of negative (crossed-market) spreads.
    #[must_use]
    pub fn negative_spreads(&self) -> &[(UnixNanos, f64)] {
        &self.negative_spreads
    }

    /// Returns the timestamped history of per-period average spreads.
    #[must_use]
    pub fn average_history(&self) -> &[(UnixNanos, f64)] {
        &self.average_history
    }

    /// Updates the analyzer with a quote.
    ///
    /// Appends the spread sample for the current period, updates the running
    /// extrema, and records crossed markets into the negative-spread log
    /// rather than rejecting them.
    pub fn on_quote(&mut self, bid: Price, ask: Price, ts_event: UnixNanos) {
        let spread = (ask - bid).as_f64();

        self.bid = Some(bid);
        self.ask = Some(ask);
        self.spreads.push(spread);

        if self.max_spread.is_none_or(|(_, max)| spread > max) {
            self.max_spread = Some((ts_event, spread));
        }
        if self.min_spread.is_none_or(|(_, min)| spread < min) {
            self.min_spread = Some((ts_event, spread));
        }

        if spread < 0.0 {
            log::warn!(
                "Crossed market: negative spread {spread} at {ts_event} (bid={bid}, ask={ask})"
            );
            self.negative_spreads.push((ts_event, spread));
        }

        // Keep an in-progress average until the first period closes so that
        // early queries are meaningful.
        if self.average_history.is_empty() {
            self.average_spread = self.calculate_average();
        }
    }

    /// Finalizes the average spread for the closing period, records it into
    /// history, and clears the sample buffer for the next period.
    pub fn on_bar_update(&mut self, ts_event: UnixNanos) {
        self.average_spread = self.calculate_average();
        self.average_history.push((ts_event, self.average_spread));
        self.spreads.clear();
    }

    fn calculate_average(&self) -> f64 {
        let count = self.spreads.len().max(1);
        let mean = self.spreads.iter().sum::<f64>() / count as f64;

        let scalar = 10_f64.powi(i32::from(self.tick_size.precision));
        let rounded = (mean * scalar).round() / scalar;

        match self.floor {
            SpreadFloor::TickSize => rounded.max(self.tick_size.as_f64()),
            SpreadFloor::Zero => rounded.max(0.0),
        }
    }
}

/// Per-specification aggregation state.
#[derive(Debug)]
struct SpecState {
    builder: BarBuilder,
    last_tick: Option<QuoteTick>,
    // Zero when unset: tick-count specifications, or time specifications
    // which have not yet observed a tick.
    next_close_ns: UnixNanos,
}

impl SpecState {
    fn new(symbol: Symbol, spec: BarSpecification) -> Self {
        Self {
            builder: BarBuilder::new(symbol, spec),
            last_tick: None,
            next_close_ns: UnixNanos::default(),
        }
    }
}

/// Aggregates quote ticks into bars for a single symbol.
///
/// Owns one [`BarBuilder`] per subscribed [`BarSpecification`] and a shared
/// [`SpreadAnalyzer`], routes each incoming tick to all active builders, and
/// posts a [`BarClosed`] event to the registered handler on every close.
///
/// All state mutation is strictly sequential in the order ticks and control
/// commands are delivered; run one instance per symbol on its own execution
/// context.
pub struct SymbolBarAggregator<H>
where
    H: FnMut(BarClosed),
{
    symbol: Symbol,
    analyzer: SpreadAnalyzer,
    states: IndexMap<BarSpecification, SpecState>,
    handler: H,
    // The close timestamp of the last analyzer snapshot, so closes batched at
    // the same timestamp share one period average.
    last_snapshot_ns: Option<UnixNanos>,
    market_open: bool,
}

impl<H: FnMut(BarClosed)> Debug for SymbolBarAggregator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(SymbolBarAggregator))
            .field("symbol", &self.symbol)
            .field("specs", &self.states.keys().collect::<Vec<_>>())
            .field("market_open", &self.market_open)
            .finish()
    }
}

impl<H> SymbolBarAggregator<H>
where
    H: FnMut(BarClosed),
{
    /// Creates a new [`SymbolBarAggregator`] instance with correctness checking.
    ///
    /// # Errors
    ///
    /// Returns an error if `tick_size` is not positive.
    pub fn new_checked(
        symbol: Symbol,
        tick_size: Price,
        spread_floor: SpreadFloor,
        handler: H,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            symbol,
            analyzer: SpreadAnalyzer::new_checked(tick_size, spread_floor)?,
            states: IndexMap::new(),
            handler,
            last_snapshot_ns: None,
            market_open: false,
        })
    }

    /// Creates a new [`SymbolBarAggregator`] instance.
    ///
    /// # Panics
    ///
    /// Panics if `tick_size` is not positive.
    pub fn new(symbol: Symbol, tick_size: Price, spread_floor: SpreadFloor, handler: H) -> Self {
        Self::new_checked(symbol, tick_size, spread_floor, handler).expect(FAILED)
    }

    /// Returns the aggregator's symbol.
    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    /// Returns the spread analyzer for the symbol.
    #[must_use]
    pub const fn spread_analyzer(&self) -> &SpreadAnalyzer {
        &self.analyzer
    }

    /// Returns `true` if the market session is currently flagged open.
    #[must_use]
    pub const fn is_market_open(&self) -> bool {
        self.market_open
    }

    /// Returns `true` if the given specification is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, spec: &BarSpecification) -> bool {
        self.states.contains_key(spec)
    }

    /// Returns the currently subscribed specifications.
    pub fn specs(&self) -> impl Iterator<Item = &BarSpecification> {
        self.states.keys()
    }

    /// Adds the given specification, creating its builder and tracking entry.
    ///
    /// Idempotent: subscribing an already-subscribed specification keeps the
    /// existing builder. Returns `true` if the subscription was newly added.
    pub fn subscribe(&mut self, spec: BarSpecification) -> bool {
        if self.states.contains_key(&spec) {
            log::debug!("Already subscribed to {spec} bars for {}", self.symbol);
            return false;
        }

        self.states.insert(spec, SpecState::new(self.symbol, spec));
        log::debug!("Subscribed to {spec} bars for {}", self.symbol);
        true
    }

    /// Removes the given specification and discards its builder.
    ///
    /// No partial bar is emitted. Removing an absent specification is a safe
    /// no-op. Returns `true` if a subscription was removed.
    pub fn unsubscribe(&mut self, spec: &BarSpecification) -> bool {
        if self.states.shift_remove(spec).is_none() {
            log::debug!("No {spec} bar subscription for {} to remove", self.symbol);
            return false;
        }

        log::debug!("Unsubscribed from {spec} bars for {}", self.symbol);
        true
    }

    /// Updates all subscribed builders with the given tick.
    ///
    /// A tick at or past a time specification's boundary first closes the
    /// prior period at the boundary timestamp, then seeds the next period
    /// with itself. Tick-count specifications close with the triggering
    /// tick's timestamp once the count reaches the specification step.
    pub fn handle_quote(&mut self, tick: QuoteTick) {
        debug_assert_eq!(tick.symbol, self.symbol);

        for (spec, state) in &mut self.states {
            if state.next_close_ns.is_zero() || tick.ts_event < state.next_close_ns {
                continue;
            }
            let ts_close = state.next_close_ns;
            if state.builder.is_initialized() {
                Self::build_and_send(
                    &mut self.analyzer,
                    &mut self.handler,
                    state,
                    ts_close,
                    &mut self.last_snapshot_ns,
                );
            }
            state.next_close_ns = next_bar_close_ns(tick.ts_event, spec);
        }

        self.analyzer.on_quote(tick.bid, tick.ask, tick.ts_event);

        for (spec, state) in &mut self.states {
            state.builder.update(tick.extract_price(spec.price_type), tick.ts_event);
            state.last_tick = Some(tick);

            if spec.is_time_based() {
                if state.next_close_ns.is_zero() {
                    state.next_close_ns = next_bar_close_ns(tick.ts_event, spec);
                }
            } else if state.builder.count() >= spec.step.get() {
                Self::build_and_send(
                    &mut self.analyzer,
                    &mut self.handler,
                    state,
                    tick.ts_event,
                    &mut self.last_snapshot_ns,
                );
            }
        }
    }

    /// Closes every initialized time-based builder whose specification
    /// duration matches, using the given close timestamp (the scheduled
    /// boundary).
    ///
    /// Uninitialized builders are skipped (no ticks arrived in the period, so
    /// no bar is emitted); specifications this aggregator does not hold are
    /// naturally a no-op.
    pub fn close_time_bars(&mut self, duration_ns: DurationNanos, ts_close: UnixNanos) {
        for (spec, state) in &mut self.states {
            if spec.duration_ns() != Some(duration_ns) {
                continue;
            }
            if state.builder.is_initialized() {
                Self::build_and_send(
                    &mut self.analyzer,
                    &mut self.handler,
                    state,
                    ts_close,
                    &mut self.last_snapshot_ns,
                );
            }
            state.next_close_ns = ts_close + duration_ns;
        }
    }

    /// Records the market session status.
    pub fn on_market_status(&mut self, status: MarketStatus) {
        log::info!("Market for {} now {}", self.symbol, if status.is_open { "open" } else { "closed" });
        self.market_open = status.is_open;
    }

    fn build_and_send(
        analyzer: &mut SpreadAnalyzer,
        handler: &mut H,
        state: &mut SpecState,
        ts_close: UnixNanos,
        last_snapshot_ns: &mut Option<UnixNanos>,
    ) {
        let bar = state.builder.build(ts_close);

        // Snapshot the period average once per distinct close timestamp;
        // further specifications closing at the same timestamp reuse it.
        if *last_snapshot_ns != Some(ts_close) {
            analyzer.on_bar_update(ts_close);
            *last_snapshot_ns = Some(ts_close);
        }

        let last_tick = state
            .last_tick
            .expect("an initialized builder implies at least one tick was applied");

        (handler)(BarClosed {
            bar,
            last_tick,
            average_spread: analyzer.average_spread(),
        });
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use chrono::{DateTime, Utc};
    use rstest::{fixture, rstest};

    use super::*;

    fn utc_ns(s: &str) -> UnixNanos {
        UnixNanos::from(
            DateTime::parse_from_rfc3339(s)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    fn quote(bid: &str, ask: &str, ts: UnixNanos) -> QuoteTick {
        QuoteTick::new(Symbol::from("AUD/USD"), Price::from(bid), Price::from(ask), ts)
    }

    #[fixture]
    fn tick_size() -> Price {
        Price::from("0.00001")
    }

    type Emitted = Rc<RefCell<Vec<BarClosed>>>;

    fn aggregator(tick_size: Price) -> (SymbolBarAggregator<impl FnMut(BarClosed)>, Emitted) {
        let emitted: Emitted = Rc::new(RefCell::new(Vec::new()));
        let sink = emitted.clone();
        let aggregator = SymbolBarAggregator::new(
            Symbol::from("AUD/USD"),
            tick_size,
            SpreadFloor::Zero,
            move |event| sink.borrow_mut().push(event),
        );
        (aggregator, emitted)
    }

    #[rstest]
    fn test_builder_starts_uninitialized() {
        let builder = BarBuilder::new(Symbol::from("AUD/USD"), BarSpecification::from("5-TICK-BID"));
        assert!(!builder.is_initialized());
        assert_eq!(builder.count(), 0);
    }

    #[rstest]
    fn test_builder_maintains_ohlc_invariants() {
        let mut builder =
            BarBuilder::new(Symbol::from("AUD/USD"), BarSpecification::from("5-TICK-BID"));
        let prices = ["1.00000", "0.99990", "1.00020", "1.00005"];
        for (i, price) in prices.iter().enumerate() {
            builder.update(Price::from(*price), UnixNanos::from(i as u64 * 1_000));
        }

        let bar = builder.build(UnixNanos::from(4_000));
        assert_eq!(bar.open, Price::from("1.00000"));
        assert_eq!(bar.high, Price::from("1.00020"));
        assert_eq!(bar.low, Price::from("0.99990"));
        assert_eq!(bar.close, Price::from("1.00005"));
        assert_eq!(bar.volume, 4);
        assert_eq!(bar.ts_close, UnixNanos::from(4_000));
    }

    #[rstest]
    fn test_builder_ignores_earlier_timestamps() {
        let mut builder =
            BarBuilder::new(Symbol::from("AUD/USD"), BarSpecification::from("5-TICK-BID"));
        builder.update(Price::from("1.00000"), UnixNanos::from(1_000));
        builder.update(Price::from("1.00001"), UnixNanos::from(500));

        assert_eq!(builder.count(), 1);
    }

    #[rstest]
    #[should_panic(expected = "builder was not initialized")]
    fn test_builder_build_with_no_updates_panics() {
        let mut builder =
            BarBuilder::new(Symbol::from("AUD/USD"), BarSpecification::from("5-TICK-BID"));
        let _ = builder.build(UnixNanos::default());
    }

    #[rstest]
    fn test_builder_build_resets_for_next_period() {
        let mut builder =
            BarBuilder::new(Symbol::from("AUD/USD"), BarSpecification::from("5-TICK-BID"));
        builder.update(Price::from("1.00000"), UnixNanos::from(1_000));
        let _ = builder.build(UnixNanos::from(1_000));

        assert!(!builder.is_initialized());
        assert_eq!(builder.count(), 0);
    }

    #[rstest]
    fn test_analyzer_rejects_non_positive_tick_size() {
        assert!(SpreadAnalyzer::new_checked(Price::zero(5), SpreadFloor::Zero).is_err());
    }

    #[rstest]
    fn test_aggregator_new_checked_rejects_non_positive_tick_size() {
        let result = SymbolBarAggregator::new_checked(
            Symbol::from("AUD/USD"),
            Price::zero(5),
            SpreadFloor::Zero,
            |_| {},
        );
        assert!(result.is_err());
    }

    #[rstest]
    fn test_analyzer_single_quote_average_round_trip(tick_size: Price) {
        let mut analyzer = SpreadAnalyzer::new(tick_size, SpreadFloor::Zero);
        analyzer.on_quote(
            Price::from("0.80000"),
            Price::from("0.80005"),
            UnixNanos::from(1_000),
        );
        analyzer.on_bar_update(UnixNanos::from(1_000));

        assert!((analyzer.average_spread() - 0.00005).abs() < 1e-12);
        assert_eq!(analyzer.average_history().len(), 1);
    }

    #[rstest]
    fn test_analyzer_running_average_before_first_close(tick_size: Price) {
        let mut analyzer = SpreadAnalyzer::new(tick_size, SpreadFloor::Zero);
        analyzer.on_quote(
            Price::from("0.80000"),
            Price::from("0.80004"),
            UnixNanos::from(1_000),
        );
        analyzer.on_quote(
            Price::from("0.80000"),
            Price::from("0.80006"),
            UnixNanos::from(2_000),
        );

        // Mean of 0.00004 and 0.00006 while the first period is still open
        assert!((analyzer.average_spread() - 0.00005).abs() < 1e-12);
    }

    #[rstest]
    fn test_analyzer_tick_size_floor_clamps_average(tick_size: Price) {
        let mut analyzer = SpreadAnalyzer::new(tick_size, SpreadFloor::TickSize);
        analyzer.on_quote(
            Price::from("0.80000"),
            Price::from("0.80000"),
            UnixNanos::from(1_000),
        );
        analyzer.on_bar_update(UnixNanos::from(1_000));

        // Zero average clamps up to the tick size
        assert!((analyzer.average_spread() - 0.00001).abs() < 1e-12);
    }

    #[rstest]
    fn test_analyzer_negative_spread_recorded_not_rejected(tick_size: Price) {
        let mut analyzer = SpreadAnalyzer::new(tick_size, SpreadFloor::Zero);
        analyzer.on_quote(
            Price::from("0.80005"),
            Price::from("0.80000"), // crossed
            UnixNanos::from(1_000),
        );

        assert_eq!(analyzer.negative_spreads().len(), 1);
        let (ts, spread) = analyzer.min_spread().unwrap();
        assert_eq!(ts, UnixNanos::from(1_000));
        assert!((spread - (-0.00005)).abs() < 1e-12);
    }

    #[rstest]
    fn test_analyzer_clears_samples_per_period(tick_size: Price) {
        let mut analyzer = SpreadAnalyzer::new(tick_size, SpreadFloor::Zero);
        analyzer.on_quote(
            Price::from("0.80000"),
            Price::from("0.80010"),
            UnixNanos::from(1_000),
        );
        analyzer.on_bar_update(UnixNanos::from(1_000));

        analyzer.on_quote(
            Price::from("0.80000"),
            Price::from("0.80002"),
            UnixNanos::from(2_000),
        );
        analyzer.on_bar_update(UnixNanos::from(2_000));

        // Second period average reflects only the second period's sample
        let history = analyzer.average_history();
        assert_eq!(history.len(), 2);
        assert!((history[1].1 - 0.00002).abs() < 1e-12);
    }

    #[rstest]
    fn test_tick_count_close_emits_one_bar_per_step(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-TICK-BID"));

        for i in 0..5_u64 {
            aggregator.handle_quote(quote("1.00000", "1.00005", UnixNanos::from(i * 1_000)));
        }

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 1);
        let bar = bars[0].bar;
        assert_eq!(bar.volume, 5);
        assert_eq!(bar.ts_close, UnixNanos::from(4_000));
        assert_eq!(bar.open, Price::from("1.00000"));
        assert_eq!(bar.close, Price::from("1.00000"));
        assert!((bars[0].average_spread - 0.00005).abs() < 1e-12);
    }

    #[rstest]
    fn test_tick_count_resets_for_next_bar(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-TICK-BID"));

        for i in 0..10_u64 {
            aggregator.handle_quote(quote("1.00000", "1.00005", UnixNanos::from(i * 1_000)));
        }

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].bar.volume, 5);
        assert_eq!(bars[1].bar.ts_close, UnixNanos::from(9_000));
    }

    #[rstest]
    fn test_subscribe_is_idempotent(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        let spec = BarSpecification::from("5-TICK-BID");

        assert!(aggregator.subscribe(spec));
        aggregator.handle_quote(quote("1.00000", "1.00005", UnixNanos::from(1_000)));
        assert!(!aggregator.subscribe(spec)); // keeps the existing builder

        for i in 2..6_u64 {
            aggregator.handle_quote(quote("1.00000", "1.00005", UnixNanos::from(i * 1_000)));
        }

        assert_eq!(emitted.borrow().len(), 1);
        assert_eq!(emitted.borrow()[0].bar.volume, 5);
    }

    #[rstest]
    fn test_unsubscribe_discards_without_emitting(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        let spec = BarSpecification::from("5-TICK-BID");
        aggregator.subscribe(spec);

        aggregator.handle_quote(quote("1.00000", "1.00005", UnixNanos::from(1_000)));
        assert!(aggregator.unsubscribe(&spec));
        assert!(!aggregator.unsubscribe(&spec)); // absent removal is a no-op

        assert!(emitted.borrow().is_empty());
    }

    #[rstest]
    fn test_wall_clock_close_at_boundary(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-MINUTE-BID"));

        aggregator.handle_quote(quote("1.00000", "1.00005", utc_ns("2024-02-01T10:02:30Z")));
        aggregator.handle_quote(quote("1.00010", "1.00015", utc_ns("2024-02-01T10:04:59Z")));
        assert!(emitted.borrow().is_empty());

        // A tick exactly at the boundary closes the prior period at the
        // boundary timestamp, not the tick timestamp.
        aggregator.handle_quote(quote("1.00020", "1.00025", utc_ns("2024-02-01T10:05:00Z")));

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 1);
        let bar = bars[0].bar;
        assert_eq!(bar.ts_close, utc_ns("2024-02-01T10:05:00Z"));
        assert_eq!(bar.open, Price::from("1.00000"));
        assert_eq!(bar.close, Price::from("1.00010"));
        assert_eq!(bar.volume, 2); // the boundary tick seeds the next bar
    }

    #[rstest]
    fn test_wall_clock_boundary_tick_seeds_next_bar(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-MINUTE-BID"));

        aggregator.handle_quote(quote("1.00000", "1.00005", utc_ns("2024-02-01T10:02:30Z")));
        aggregator.handle_quote(quote("1.00020", "1.00025", utc_ns("2024-02-01T10:05:00Z")));
        aggregator.handle_quote(quote("1.00030", "1.00035", utc_ns("2024-02-01T10:10:00Z")));

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 2);
        let second = bars[1].bar;
        assert_eq!(second.open, Price::from("1.00020"));
        assert_eq!(second.ts_close, utc_ns("2024-02-01T10:10:00Z"));
        assert_eq!(second.volume, 1);
    }

    #[rstest]
    fn test_mid_price_bars_use_rounded_mean(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("1-TICK-MID"));

        aggregator.handle_quote(quote("0.80000", "0.80005", UnixNanos::from(1_000)));

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].bar.close, Price::from("0.80003"));
    }

    #[rstest]
    fn test_close_time_bars_closes_matching_durations(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-MINUTE-BID"));
        aggregator.subscribe(BarSpecification::from("5-MINUTE-ASK"));
        aggregator.subscribe(BarSpecification::from("1-HOUR-BID"));

        aggregator.handle_quote(quote("1.00000", "1.00005", utc_ns("2024-02-01T10:02:30Z")));

        let duration = BarSpecification::from("5-MINUTE-BID").duration_ns().unwrap();
        aggregator.close_time_bars(duration, utc_ns("2024-02-01T10:05:00Z"));

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 2); // both 5-minute variants, not the hourly
        assert!(bars.iter().all(|b| b.bar.ts_close == utc_ns("2024-02-01T10:05:00Z")));
    }

    #[rstest]
    fn test_batch_close_shares_period_average(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-MINUTE-BID"));
        aggregator.subscribe(BarSpecification::from("5-MINUTE-ASK"));

        aggregator.handle_quote(quote("0.80000", "0.80005", utc_ns("2024-02-01T10:02:30Z")));

        let duration = BarSpecification::from("5-MINUTE-BID").duration_ns().unwrap();
        aggregator.close_time_bars(duration, utc_ns("2024-02-01T10:05:00Z"));

        // Both closes at the same boundary carry the same period average
        let bars = emitted.borrow();
        assert_eq!(bars.len(), 2);
        assert!((bars[0].average_spread - 0.00005).abs() < 1e-12);
        assert!((bars[1].average_spread - 0.00005).abs() < 1e-12);
        assert_eq!(aggregator.spread_analyzer().average_history().len(), 1);
    }

    #[rstest]
    fn test_same_tick_closes_share_period_average(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("1-TICK-BID"));
        aggregator.subscribe(BarSpecification::from("1-TICK-ASK"));

        aggregator.handle_quote(quote("0.80000", "0.80005", UnixNanos::from(1_000)));

        let bars = emitted.borrow();
        assert_eq!(bars.len(), 2);
        assert!((bars[0].average_spread - 0.00005).abs() < 1e-12);
        assert!((bars[1].average_spread - 0.00005).abs() < 1e-12);
        assert_eq!(aggregator.spread_analyzer().average_history().len(), 1);
    }

    #[rstest]
    fn test_close_time_bars_skips_uninitialized_builders(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("5-MINUTE-BID"));

        let duration = BarSpecification::from("5-MINUTE-BID").duration_ns().unwrap();
        aggregator.close_time_bars(duration, utc_ns("2024-02-01T10:05:00Z"));

        assert!(emitted.borrow().is_empty());
    }

    #[rstest]
    fn test_market_status_flag_is_advisory(tick_size: Price) {
        let (mut aggregator, emitted) = aggregator(tick_size);
        aggregator.subscribe(BarSpecification::from("1-TICK-BID"));
        assert!(!aggregator.is_market_open());

        aggregator.on_market_status(MarketStatus {
            is_open: true,
            ts_event: UnixNanos::from(1_000),
        });
        assert!(aggregator.is_market_open());

        // Ticks are still processed while the market is flagged closed
        aggregator.on_market_status(MarketStatus {
            is_open: false,
            ts_event: UnixNanos::from(2_000),
        });
        aggregator.handle_quote(quote("1.00000", "1.00005", UnixNanos::from(3_000)));
        assert_eq!(emitted.borrow().len(), 1);
    }
}
